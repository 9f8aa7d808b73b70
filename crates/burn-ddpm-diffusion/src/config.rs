//! Construction-time configuration for diffusion, training and sampling

use serde::{Deserialize, Serialize};

use crate::loss::LossType;

/// Noise schedule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffusionConfig {
    /// Total number of diffusion steps (T)
    pub timesteps: usize,
    /// First beta of the linear schedule
    pub beta_start: f64,
    /// Last beta of the linear schedule
    pub beta_end: f64,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            timesteps: 200,
            beta_start: 1e-4,
            beta_end: 0.02,
        }
    }
}

impl DiffusionConfig {
    /// Default schedule bounds with a custom step count
    pub fn with_timesteps(timesteps: usize) -> Self {
        Self {
            timesteps,
            ..Self::default()
        }
    }
}

/// Training loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Passes over the data source
    pub epochs: usize,
    /// Objective between true and predicted noise
    pub loss_type: LossType,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Report the loss every `log_every` batches
    pub log_every: usize,
    /// Seed for timestep and noise draws (random when unset)
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            loss_type: LossType::Huber,
            learning_rate: 1e-3,
            log_every: 100,
            seed: None,
        }
    }
}

/// Inference configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    /// Height and width of generated images
    pub image_size: usize,
    /// Number of images generated in parallel
    pub batch_size: usize,
    /// Image channels (1 = grayscale, 3 = RGB)
    pub channels: usize,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            image_size: 28,
            batch_size: 64,
            channels: 1,
        }
    }
}

impl SampleConfig {
    /// Output shape `[batch, channels, height, width]`
    pub fn shape(&self) -> [usize; 4] {
        [self.batch_size, self.channels, self.image_size, self.image_size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(DiffusionConfig::default().timesteps, 200);

        let train = TrainingConfig::default();
        assert_eq!(train.epochs, 1);
        assert_eq!(train.loss_type, LossType::Huber);

        assert_eq!(SampleConfig::default().shape(), [64, 1, 28, 28]);
    }

    #[test]
    fn test_training_config_from_json() {
        let config: TrainingConfig =
            serde_json::from_str(r#"{ "epochs": 5, "loss_type": "l2" }"#).unwrap();
        assert_eq!(config.epochs, 5);
        assert_eq!(config.loss_type, LossType::L2);
        // Unspecified fields keep their defaults
        assert_eq!(config.log_every, 100);
    }

    #[test]
    fn test_training_config_rejects_unknown_loss() {
        let err = serde_json::from_str::<TrainingConfig>(r#"{ "loss_type": "l3" }"#).unwrap_err();
        assert!(
            err.to_string().contains("unsupported loss type"),
            "unexpected error: {err}"
        );
    }
}
