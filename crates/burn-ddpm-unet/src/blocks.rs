//! UNet building blocks: timestep embedding, residual blocks, down/up sampling

use burn::nn::{
    conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

use crate::groupnorm::GroupNorm;

/// SiLU (Sigmoid Linear Unit) activation: x * sigmoid(x)
pub fn silu<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone() * sigmoid(x)
}

/// Frequencies for the sinusoidal timestep embedding
pub fn timestep_freqs<B: Backend>(dim: usize, device: &B::Device) -> Tensor<B, 1> {
    let half_dim = dim / 2;
    let max_period = 10000.0f64;

    let freqs: Vec<f32> = (0..half_dim)
        .map(|i| (-((i as f64) / half_dim as f64) * max_period.ln()).exp() as f32)
        .collect();

    Tensor::<B, 1>::from_data(TensorData::new(freqs, [half_dim]), device)
}

/// Sinusoidal embedding `[batch, 2 * (dim / 2)]` of integer timesteps
pub fn timestep_embedding<B: Backend>(timesteps: Tensor<B, 1, Int>, dim: usize) -> Tensor<B, 2> {
    let device = timesteps.device();
    let [batch] = timesteps.dims();
    let freqs = timestep_freqs::<B>(dim, &device);
    let [half_dim] = freqs.dims();

    let args = timesteps.float().reshape([batch, 1]) * freqs.reshape([1, half_dim]);
    Tensor::cat(vec![args.clone().sin(), args.cos()], 1)
}

/// Residual block conditioned on the timestep embedding
#[derive(Module, Debug)]
pub struct ResBlock<B: Backend> {
    pub norm1: GroupNorm<B>,
    pub conv1: Conv2d<B>,
    /// Projects the time embedding to a per-channel shift
    pub time_emb_proj: Linear<B>,
    pub norm2: GroupNorm<B>,
    pub conv2: Conv2d<B>,
    /// 1x1 projection of the residual when channel counts differ
    pub skip_conv: Option<Conv2d<B>>,
}

impl<B: Backend> ResBlock<B> {
    /// Creates a residual block
    ///
    /// # Arguments
    ///
    /// * `in_channels` - Channels of the incoming feature map
    /// * `out_channels` - Channels produced by the block
    /// * `time_emb_dim` - Width of the timestep embedding
    /// * `groups` - GroupNorm groups; must divide both channel counts
    /// * `device` - Device to create parameters on
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        time_emb_dim: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        let norm1 = GroupNorm::new(groups, in_channels, device);
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let time_emb_proj = LinearConfig::new(time_emb_dim, out_channels).init(device);

        let norm2 = GroupNorm::new(groups, out_channels, device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let skip_conv = (in_channels != out_channels)
            .then(|| Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device));

        Self {
            norm1,
            conv1,
            time_emb_proj,
            norm2,
            conv2,
            skip_conv,
        }
    }

    /// Forward pass through the residual block
    ///
    /// # Arguments
    ///
    /// * `x` - Feature map `[batch, in_channels, height, width]`
    /// * `time_emb` - Timestep embedding `[batch, time_emb_dim]`
    ///
    /// # Returns
    ///
    /// Feature map `[batch, out_channels, height, width]`
    pub fn forward(&self, x: Tensor<B, 4>, time_emb: Tensor<B, 2>) -> Tensor<B, 4> {
        let [b, _, _, _] = x.dims();

        let residual = match &self.skip_conv {
            Some(conv) => conv.forward(x.clone()),
            None => x.clone(),
        };

        let hidden = self.conv1.forward(silu(self.norm1.forward(x)));

        let time_emb = self.time_emb_proj.forward(silu(time_emb));
        let [_, emb_dim] = time_emb.dims();
        let hidden = hidden + time_emb.reshape([b, emb_dim, 1, 1]);

        let hidden = self.conv2.forward(silu(self.norm2.forward(hidden)));

        hidden + residual
    }
}

/// Halves spatial size with a strided 3x3 convolution
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
}

impl<B: Backend> Downsample<B> {
    pub fn new(channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([channels, channels], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        Self { conv }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(x)
    }
}

/// Doubles spatial size with a 4x4 stride-2 transposed convolution
#[derive(Module, Debug)]
pub struct Upsample<B: Backend> {
    pub conv: ConvTranspose2d<B>,
}

impl<B: Backend> Upsample<B> {
    pub fn new(channels: usize, device: &B::Device) -> Self {
        let conv = ConvTranspose2dConfig::new([channels, channels], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .init(device);
        Self { conv }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_timestep_embedding() {
        let device = Default::default();
        let t = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64, 10, 199], [3]), &device);

        let emb = timestep_embedding(t, 28);
        assert_eq!(emb.dims(), [3, 28]);

        // t = 0 gives sin = 0 and cos = 1
        let row = emb.slice([0..1, 0..28]).into_data().to_vec::<f32>().unwrap();
        assert!(row[..14].iter().all(|v| v.abs() < 1e-6));
        assert!(row[14..].iter().all(|v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_resblock_changes_channels() {
        let device = Default::default();
        let block = ResBlock::<TestBackend>::new(8, 16, 32, 4, &device);
        assert!(block.skip_conv.is_some());

        let x = Tensor::<TestBackend, 4>::zeros([2, 8, 7, 7], &device);
        let emb = Tensor::<TestBackend, 2>::zeros([2, 32], &device);
        assert_eq!(block.forward(x, emb).dims(), [2, 16, 7, 7]);
    }

    #[test]
    fn test_sampling_blocks_resize() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::zeros([1, 4, 14, 14], &device);

        let down = Downsample::<TestBackend>::new(4, &device).forward(x.clone());
        assert_eq!(down.dims(), [1, 4, 7, 7]);

        let up = Upsample::<TestBackend>::new(4, &device).forward(down);
        assert_eq!(up.dims(), [1, 4, 14, 14]);
    }
}
