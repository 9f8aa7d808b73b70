//! Training loop for noise-prediction models

use std::sync::Arc;

use burn::data::dataloader::DataLoader;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::TrainingConfig;
use crate::ddpm::DiffusionModel;
use crate::error::Result;
use crate::model::NoisePredictor;
use crate::noise::{NoiseSource, SeededNoise};

// ============================================================================
// Data contract
// ============================================================================

/// A batch that carries clean images `[batch, channels, height, width]`
pub trait PixelBatch<B: Backend> {
    fn pixel_values(&self) -> Tensor<B, 4>;
}

impl<B: Backend> PixelBatch<B> for Tensor<B, 4> {
    fn pixel_values(&self) -> Tensor<B, 4> {
        self.clone()
    }
}

/// Finite, restartable sequence of batches
///
/// Each call to [`BatchSource::batches`] starts a fresh pass.
pub trait BatchSource<T> {
    fn batches(&self) -> Box<dyn Iterator<Item = T> + '_>;
}

impl<T: Clone> BatchSource<T> for [T] {
    fn batches(&self) -> Box<dyn Iterator<Item = T> + '_> {
        Box::new(self.iter().cloned())
    }
}

impl<T: Clone> BatchSource<T> for Vec<T> {
    fn batches(&self) -> Box<dyn Iterator<Item = T> + '_> {
        self.as_slice().batches()
    }
}

impl<B: Backend, T> BatchSource<T> for Arc<dyn DataLoader<B, T>> {
    fn batches(&self) -> Box<dyn Iterator<Item = T> + '_> {
        Box::new(self.iter())
    }
}

// ============================================================================
// Progress reporting
// ============================================================================

/// Loss of a single optimizer step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainStep {
    pub epoch: usize,
    /// Batch index within the epoch
    pub step: usize,
    pub loss: f64,
}

/// End-of-epoch statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub batches: usize,
    /// Mean loss over the epoch's batches, `None` for an empty source
    pub mean_loss: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrainEvent {
    Step(TrainStep),
    EpochEnd(EpochSummary),
}

// ============================================================================
// Trainer
// ============================================================================

/// Fits a noise-prediction model with Adam
pub struct Trainer<B: AutodiffBackend> {
    diffusion: DiffusionModel<B>,
    config: TrainingConfig,
    rng: ChaCha8Rng,
    noise: SeededNoise,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(diffusion: DiffusionModel<B>, config: TrainingConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let noise = SeededNoise::new(rng.random());

        Self {
            diffusion,
            config,
            rng,
            noise,
        }
    }

    pub fn diffusion(&self) -> &DiffusionModel<B> {
        &self.diffusion
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Run `config.epochs` passes over `source` and return the updated model
    ///
    /// `callback` receives a [`TrainEvent::Step`] every `log_every` batches
    /// (never when `log_every` is 0) and a [`TrainEvent::EpochEnd`] after
    /// each pass. The first failing batch aborts training.
    pub fn train<M, S, T, F>(&mut self, mut model: M, source: &S, mut callback: F) -> Result<M>
    where
        M: AutodiffModule<B> + NoisePredictor<B>,
        S: BatchSource<T> + ?Sized,
        T: PixelBatch<B>,
        F: FnMut(TrainEvent),
    {
        let mut optimizer = AdamConfig::new().init::<B, M>();
        let log_every = self.config.log_every;

        for epoch in 0..self.config.epochs {
            let mut total_loss = 0.0;
            let mut batches = 0;

            for (step, batch) in source.batches().enumerate() {
                let loss = self.loss_for_batch(&model, batch.pixel_values())?;
                let loss_value = loss.clone().into_scalar().elem::<f64>();

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optimizer.step(self.config.learning_rate, model, grads);

                total_loss += loss_value;
                batches += 1;

                if log_every > 0 && step % log_every == 0 {
                    callback(TrainEvent::Step(TrainStep {
                        epoch,
                        step,
                        loss: loss_value,
                    }));
                }
            }

            callback(TrainEvent::EpochEnd(EpochSummary {
                epoch,
                batches,
                mean_loss: (batches > 0).then(|| total_loss / batches as f64),
            }));
        }

        Ok(model)
    }

    /// Objective for one batch at uniformly drawn timesteps
    pub fn loss_for_batch<M: NoisePredictor<B>>(
        &mut self,
        model: &M,
        pixel_values: Tensor<B, 4>,
    ) -> Result<Tensor<B, 1>> {
        let dims = pixel_values.dims();
        let device = pixel_values.device();

        let t = self.random_timesteps(dims[0], &device);
        let noise = NoiseSource::<B>::standard_normal(&mut self.noise, dims, &device);

        self.diffusion
            .p_losses(model, pixel_values, t, Some(noise), self.config.loss_type)
    }

    /// `batch` timesteps drawn uniformly from `[0, T)`
    pub fn random_timesteps(&mut self, batch: usize, device: &B::Device) -> Tensor<B, 1, Int> {
        let num_timesteps = self.diffusion.num_timesteps();
        let t: Vec<i64> = (0..batch)
            .map(|_| self.rng.random_range(0..num_timesteps) as i64)
            .collect();
        Tensor::from_data(TensorData::new(t, [batch]), device)
    }
}
