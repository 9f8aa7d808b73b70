//! Reference noise-prediction network for burn-ddpm
//!
//! A small UNet with sinusoidal timestep conditioning, GroupNorm residual
//! blocks and skip connections between mirrored resolution levels.

pub mod blocks;
pub mod groupnorm;
pub mod unet;

pub use blocks::{silu, timestep_embedding, Downsample, ResBlock, Upsample};
pub use groupnorm::GroupNorm;
pub use unet::{Denoiser, DenoiserConfig};
