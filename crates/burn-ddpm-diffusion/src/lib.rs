//! Denoising diffusion probabilistic models for Burn
//!
//! A fixed linear noise schedule, the closed-form forward process, the
//! noise-prediction objective, ancestral sampling and a small Adam training
//! loop. Networks plug in through [`NoisePredictor`]; data through
//! [`BatchSource`].

pub mod config;
pub mod ddpm;
pub mod error;
pub mod loss;
pub mod model;
pub mod noise;
pub mod schedule;
pub mod train;

pub use config::{DiffusionConfig, SampleConfig, TrainingConfig};
pub use ddpm::{DiffusionModel, StepInfo};
pub use error::{DiffusionError, Result};
pub use loss::LossType;
pub use model::NoisePredictor;
pub use noise::{BackendNoise, NoiseSource, SeededNoise};
pub use schedule::{NoiseSchedule, ScheduleCoefficients};
pub use train::{BatchSource, EpochSummary, PixelBatch, TrainEvent, TrainStep, Trainer};
