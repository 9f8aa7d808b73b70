//! Small time-conditioned UNet noise predictor

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use burn_ddpm_diffusion::NoisePredictor;

use crate::blocks::{silu, timestep_embedding, Downsample, ResBlock, Upsample};

/// UNet configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiserConfig {
    /// Image channels in and out
    pub channels: usize,
    /// Base channel width
    pub dim: usize,
    /// Channel multipliers per resolution level
    pub dim_mults: Vec<usize>,
    /// GroupNorm groups; must divide every level's width
    pub groups: usize,
}

impl Default for DenoiserConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            dim: 28,
            dim_mults: vec![1, 2, 4],
            groups: 4,
        }
    }
}

impl DenoiserConfig {
    /// Defaults with a custom channel count
    pub fn with_channels(channels: usize) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }

    /// Channel width of each level
    pub fn level_dims(&self) -> Vec<usize> {
        self.dim_mults.iter().map(|m| self.dim * m).collect()
    }

    /// Width of the time embedding MLP
    pub fn time_emb_dim(&self) -> usize {
        self.dim * 4
    }

    /// Height and width must survive `levels - 1` halvings exactly
    pub fn supports_size(&self, height: usize, width: usize) -> bool {
        let factor = 1usize << self.dim_mults.len().saturating_sub(1);
        height > 0 && width > 0 && height % factor == 0 && width % factor == 0
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Denoiser<B> {
        Denoiser::new(self, device)
    }
}

/// One resolution level of the contracting path
#[derive(Module, Debug)]
pub struct DownLevel<B: Backend> {
    pub block: ResBlock<B>,
    pub downsample: Option<Downsample<B>>,
}

/// One resolution level of the expanding path
#[derive(Module, Debug)]
pub struct UpLevel<B: Backend> {
    /// Takes the concatenation of the running features and the skip
    pub block: ResBlock<B>,
    pub upsample: Option<Upsample<B>>,
}

/// Noise-prediction UNet
#[derive(Module, Debug)]
pub struct Denoiser<B: Backend> {
    pub time_embed_0: Linear<B>,
    pub time_embed_2: Linear<B>,
    pub conv_in: Conv2d<B>,
    pub down: Vec<DownLevel<B>>,
    pub mid_1: ResBlock<B>,
    pub mid_2: ResBlock<B>,
    pub up: Vec<UpLevel<B>>,
    pub conv_out: Conv2d<B>,
    pub dim: usize,
}

impl<B: Backend> Denoiser<B> {
    pub fn new(config: &DenoiserConfig, device: &B::Device) -> Self {
        let dim = config.dim;
        let time_dim = config.time_emb_dim();
        let groups = config.groups;

        let time_embed_0 = LinearConfig::new(dim, time_dim).init(device);
        let time_embed_2 = LinearConfig::new(time_dim, time_dim).init(device);

        let conv_in = Conv2dConfig::new([config.channels, dim], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let dims = config.level_dims();
        let mut in_out = Vec::with_capacity(dims.len());
        let mut prev = dim;
        for &d in &dims {
            in_out.push((prev, d));
            prev = d;
        }
        let levels = in_out.len();

        let down = in_out
            .iter()
            .enumerate()
            .map(|(i, &(ch_in, ch_out))| DownLevel {
                block: ResBlock::new(ch_in, ch_out, time_dim, groups, device),
                downsample: (i + 1 < levels).then(|| Downsample::new(ch_out, device)),
            })
            .collect();

        let mid = *dims.last().unwrap_or(&dim);
        let mid_1 = ResBlock::new(mid, mid, time_dim, groups, device);
        let mid_2 = ResBlock::new(mid, mid, time_dim, groups, device);

        let up = in_out
            .iter()
            .enumerate()
            .rev()
            .map(|(i, &(ch_in, ch_out))| UpLevel {
                block: ResBlock::new(ch_out * 2, ch_in, time_dim, groups, device),
                upsample: (i > 0).then(|| Upsample::new(ch_in, device)),
            })
            .collect();

        let conv_out = Conv2dConfig::new([dim, config.channels], [1, 1]).init(device);

        Self {
            time_embed_0,
            time_embed_2,
            conv_in,
            down,
            mid_1,
            mid_2,
            up,
            conv_out,
            dim,
        }
    }

    /// Predicts the noise present in `x`
    ///
    /// # Arguments
    ///
    /// * `x` - Noisy images `[batch, channels, height, width]`
    /// * `timesteps` - Diffusion step of each image, `[batch]`
    ///
    /// # Returns
    ///
    /// Predicted noise with the same shape as `x`
    pub fn forward(&self, x: Tensor<B, 4>, timesteps: Tensor<B, 1, Int>) -> Tensor<B, 4> {
        let t_emb = timestep_embedding(timesteps, self.dim);
        let t_emb = self.time_embed_0.forward(t_emb);
        let t_emb = silu(t_emb);
        let t_emb = self.time_embed_2.forward(t_emb);

        let mut h = self.conv_in.forward(x);

        let mut skips = Vec::with_capacity(self.down.len());
        for level in &self.down {
            h = level.block.forward(h, t_emb.clone());
            skips.push(h.clone());
            if let Some(down) = &level.downsample {
                h = down.forward(h);
            }
        }

        h = self.mid_1.forward(h, t_emb.clone());
        h = self.mid_2.forward(h, t_emb.clone());

        for level in &self.up {
            if let Some(skip) = skips.pop() {
                h = Tensor::cat(vec![h, skip], 1);
            }
            h = level.block.forward(h, t_emb.clone());
            if let Some(up) = &level.upsample {
                h = up.forward(h);
            }
        }

        self.conv_out.forward(h)
    }
}

impl<B: Backend> NoisePredictor<B> for Denoiser<B> {
    fn predict_noise(&self, sample: Tensor<B, 4>, timesteps: Tensor<B, 1, Int>) -> Tensor<B, 4> {
        self.forward(sample, timesteps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn small_config(channels: usize) -> DenoiserConfig {
        DenoiserConfig {
            channels,
            dim: 8,
            dim_mults: vec![1, 2],
            groups: 4,
        }
    }

    #[test]
    fn test_default_config() {
        let config = DenoiserConfig::default();
        assert_eq!(config.level_dims(), vec![28, 56, 112]);
        assert!(config.supports_size(28, 28));
        assert!(!config.supports_size(30, 30));
        assert!(!config.supports_size(0, 28));
    }

    #[test]
    fn test_default_denoiser_output_shape() {
        let device = Default::default();
        let model = DenoiserConfig::default().init::<TestBackend>(&device);
        assert_eq!(model.down.len(), 3);
        assert_eq!(model.up.len(), 3);

        let x = Tensor::<TestBackend, 4>::random(
            [2, 1, 28, 28],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let t = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64, 199], [2]), &device);

        assert_eq!(model.predict_noise(x, t).dims(), [2, 1, 28, 28]);
    }

    #[test]
    fn test_rgb_denoiser_output_shape() {
        let device = Default::default();
        let model = small_config(3).init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::zeros([1, 3, 16, 12], &device);
        let t = Tensor::<TestBackend, 1, Int>::full([1], 5, &device);

        assert_eq!(model.forward(x, t).dims(), [1, 3, 16, 12]);
    }

    #[test]
    fn test_config_from_json() {
        let config: DenoiserConfig = serde_json::from_str(r#"{ "channels": 3 }"#).unwrap();
        assert_eq!(config, DenoiserConfig::with_channels(3));
    }
}
