//! Call contract for noise-prediction networks

use burn::prelude::*;

/// A network that predicts the noise contained in a noisy sample
///
/// The diffusion core never looks inside the model; any architecture
/// works as long as the output has the same shape as `sample`.
pub trait NoisePredictor<B: Backend> {
    /// Predict ε for `sample` `[batch, channels, height, width]` at
    /// per-example `timesteps` `[batch]`
    fn predict_noise(&self, sample: Tensor<B, 4>, timesteps: Tensor<B, 1, Int>) -> Tensor<B, 4>;
}
