//! Errors raised by the diffusion core

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffusionError {
    #[error("number of timesteps must be positive, got {0}")]
    InvalidTimesteps(usize),

    #[error("invalid beta range: start {start}, end {end} (need 0 < start <= end < 1)")]
    InvalidBetaRange { start: f64, end: f64 },

    #[error("unsupported loss type: {0:?} (expected one of l1, l2, huber)")]
    UnsupportedLossType(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("timestep {timestep} out of range for a {num_timesteps}-step schedule")]
    TimestepOutOfRange { timestep: i64, num_timesteps: usize },

    #[error("timestep batch holds {timestep}, but the step index is {t_index}")]
    TimestepIndexMismatch { t_index: usize, timestep: i64 },
}

pub type Result<T> = std::result::Result<T, DiffusionError>;
