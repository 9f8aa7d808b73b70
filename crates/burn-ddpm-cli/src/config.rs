//! Run configuration files and the metadata stored next to weights

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use burn_ddpm_diffusion::{DiffusionConfig, TrainingConfig};
use burn_ddpm_unet::DenoiserConfig;

/// Everything `train` needs, loadable from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub diffusion: DiffusionConfig,
    pub training: TrainingConfig,
    pub denoiser: DenoiserConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub image_size: usize,
    pub batch_size: usize,
    pub num_workers: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            image_size: 28,
            batch_size: 128,
            num_workers: 1,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

/// Architecture and schedule saved beside trained weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCard {
    pub diffusion: DiffusionConfig,
    pub denoiser: DenoiserConfig,
    pub image_size: usize,
}

impl ModelCard {
    /// `<weights>.json`
    pub fn path_for(weights: &Path) -> PathBuf {
        let mut path = weights.as_os_str().to_owned();
        path.push(".json");
        PathBuf::from(path)
    }

    pub fn save(&self, weights: &Path) -> Result<()> {
        let path = Self::path_for(weights);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Load the card for `weights`, if one exists
    pub fn load(weights: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(weights);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let card = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(card))
    }
}
