//! DDPM (Denoising Diffusion Probabilistic Models)
//!
//! Closed-form forward noising q(xₜ | x₀), the noise-prediction training
//! objective, and ancestral sampling of the learned reverse process
//! (Ho et al., 2020, Algorithms 1 and 2).

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use crate::config::{DiffusionConfig, SampleConfig};
use crate::error::{DiffusionError, Result};
use crate::loss::LossType;
use crate::model::NoisePredictor;
use crate::noise::NoiseSource;
use crate::schedule::{NoiseSchedule, ScheduleCoefficients};

/// Progress of the sampling loop, reported after every reverse step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInfo {
    /// Current step (0-indexed)
    pub step: usize,
    /// Total number of steps
    pub total_steps: usize,
    /// Timestep that was just denoised
    pub timestep: usize,
}

/// A DDPM bound to one schedule and one device
#[derive(Debug, Clone)]
pub struct DiffusionModel<B: Backend> {
    config: DiffusionConfig,
    schedule: NoiseSchedule<B>,
    device: B::Device,
}

impl<B: Backend> DiffusionModel<B> {
    /// Build the schedule for `config` on `device`
    pub fn new(config: DiffusionConfig, device: &B::Device) -> Result<Self> {
        let coefficients =
            ScheduleCoefficients::linear(config.timesteps, config.beta_start, config.beta_end)?;

        Ok(Self {
            config,
            schedule: NoiseSchedule::new(coefficients, device),
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &DiffusionConfig {
        &self.config
    }

    pub fn schedule(&self) -> &NoiseSchedule<B> {
        &self.schedule
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Total number of diffusion steps (T)
    pub fn num_timesteps(&self) -> usize {
        self.schedule.num_timesteps()
    }

    /// Sample xₜ ~ q(xₜ | x₀) in closed form
    ///
    /// xₜ = sqrt(ᾱₜ) x₀ + sqrt(1 - ᾱₜ) ε
    ///
    /// `noise` defaults to a fresh standard-normal draw shaped like `x_start`.
    pub fn q_sample<const D: usize>(
        &self,
        x_start: Tensor<B, D>,
        t: Tensor<B, 1, Int>,
        noise: Option<Tensor<B, D>>,
    ) -> Result<Tensor<B, D>> {
        let dims = x_start.dims();
        let noise = match noise {
            Some(noise) => {
                check_shape(&dims, &noise.dims())?;
                noise
            }
            None => Tensor::random_like(&x_start, burn::tensor::Distribution::Normal(0.0, 1.0)),
        };

        let s = &self.schedule;
        let sqrt_alphas_cumprod_t = s.extract(&s.sqrt_alphas_cumprod, &t, dims)?;
        let sqrt_one_minus_alphas_cumprod_t =
            s.extract(&s.sqrt_one_minus_alphas_cumprod, &t, dims)?;

        Ok(sqrt_alphas_cumprod_t * x_start + sqrt_one_minus_alphas_cumprod_t * noise)
    }

    /// Noise a batch of clean images to a single `timestep`
    pub fn noisy_image(&self, x_start: Tensor<B, 4>, timestep: usize) -> Result<Tensor<B, 4>> {
        let [batch, ..] = x_start.dims();
        let t = self.timestep_batch(batch, timestep)?;
        self.q_sample(x_start, t, None)
    }

    /// Training objective: loss between ε and the model's prediction of ε
    /// from q(xₜ | x₀)
    pub fn p_losses<M: NoisePredictor<B>>(
        &self,
        model: &M,
        x_start: Tensor<B, 4>,
        t: Tensor<B, 1, Int>,
        noise: Option<Tensor<B, 4>>,
        loss_type: LossType,
    ) -> Result<Tensor<B, 1>> {
        let noise = match noise {
            Some(noise) => noise,
            None => Tensor::random_like(&x_start, burn::tensor::Distribution::Normal(0.0, 1.0)),
        };

        let x_noisy = self.q_sample(x_start, t.clone(), Some(noise.clone()))?;
        let predicted_noise = predict(model, x_noisy, t)?;

        Ok(loss_type.compute(noise, predicted_noise))
    }

    /// One ancestral step: sample xₜ₋₁ ~ p(xₜ₋₁ | xₜ)
    ///
    /// mean = sqrt(1/αₜ) (xₜ - βₜ ε_θ(xₜ, t) / sqrt(1 - ᾱₜ))
    ///
    /// At `t_index == 0` the mean is returned as is; otherwise
    /// sqrt(β̃ₜ) z with z ~ N(0, 1) is added. The result is detached from
    /// any autodiff graph.
    ///
    /// Every entry of `t` must equal `t_index`.
    pub fn p_sample<M, N>(
        &self,
        model: &M,
        x: Tensor<B, 4>,
        t: Tensor<B, 1, Int>,
        t_index: usize,
        noise: &mut N,
    ) -> Result<Tensor<B, 4>>
    where
        M: NoisePredictor<B>,
        N: NoiseSource<B>,
    {
        if t_index >= self.num_timesteps() {
            return Err(DiffusionError::TimestepOutOfRange {
                timestep: t_index as i64,
                num_timesteps: self.num_timesteps(),
            });
        }
        check_index(&t, t_index)?;

        let dims = x.dims();
        let s = &self.schedule;
        let betas_t = s.extract(&s.betas, &t, dims)?;
        let sqrt_one_minus_alphas_cumprod_t =
            s.extract(&s.sqrt_one_minus_alphas_cumprod, &t, dims)?;
        let sqrt_recip_alphas_t = s.extract(&s.sqrt_recip_alphas, &t, dims)?;

        let predicted_noise = predict(model, x.clone(), t.clone())?;
        let model_mean = sqrt_recip_alphas_t
            * (x.clone() - betas_t * predicted_noise / sqrt_one_minus_alphas_cumprod_t);

        if t_index == 0 {
            return Ok(model_mean.detach());
        }

        let posterior_variance_t = s.extract(&s.posterior_variance, &t, dims)?;
        let z = noise.standard_normal(dims, &x.device());

        Ok((model_mean + posterior_variance_t.sqrt() * z).detach())
    }

    /// Run the reverse process from pure noise down to t = 0
    ///
    /// Returns every intermediate sample in execution order; the last
    /// element is the final denoised batch. `callback` is invoked after
    /// each step.
    pub fn p_sample_loop<M, N, F>(
        &self,
        model: &M,
        shape: [usize; 4],
        noise: &mut N,
        mut callback: F,
    ) -> Result<Vec<Tensor<B, 4>>>
    where
        M: NoisePredictor<B>,
        N: NoiseSource<B>,
        F: FnMut(StepInfo),
    {
        if shape.contains(&0) {
            return Err(DiffusionError::ShapeMismatch {
                expected: vec![1, 1, 1, 1],
                actual: shape.to_vec(),
            });
        }

        let batch = shape[0];
        let total_steps = self.num_timesteps();

        // Start from pure noise for each example in the batch
        let mut img = noise.standard_normal(shape, &self.device);
        let mut imgs = Vec::with_capacity(total_steps);

        for (step, i) in (0..total_steps).rev().enumerate() {
            let t = Tensor::<B, 1, Int>::full([batch], i as i64, &self.device);
            img = self.p_sample(model, img, t, i, noise)?;
            imgs.push(img.clone());

            callback(StepInfo {
                step,
                total_steps,
                timestep: i,
            });
        }

        Ok(imgs)
    }

    /// Generate `config.batch_size` images, returning the whole trajectory
    pub fn sample<M, N>(
        &self,
        model: &M,
        config: &SampleConfig,
        noise: &mut N,
    ) -> Result<Vec<Tensor<B, 4>>>
    where
        M: NoisePredictor<B>,
        N: NoiseSource<B>,
    {
        self.p_sample_loop(model, config.shape(), noise, |_| {})
    }

    /// Constant timestep batch, validated against the schedule
    pub fn timestep_batch(&self, batch: usize, timestep: usize) -> Result<Tensor<B, 1, Int>> {
        if timestep >= self.num_timesteps() {
            return Err(DiffusionError::TimestepOutOfRange {
                timestep: timestep as i64,
                num_timesteps: self.num_timesteps(),
            });
        }
        Ok(Tensor::full([batch], timestep as i64, &self.device))
    }
}

impl<B: AutodiffBackend> DiffusionModel<B> {
    /// The same model on the inner backend, for gradient-free inference
    pub fn valid(&self) -> DiffusionModel<B::InnerBackend> {
        DiffusionModel {
            config: self.config.clone(),
            schedule: self.schedule.valid(),
            device: self.device.clone(),
        }
    }
}

fn check_shape<const D: usize>(expected: &[usize; D], actual: &[usize; D]) -> Result<()> {
    if expected != actual {
        return Err(DiffusionError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// `t` must hold `t_index` in every position
fn check_index<B: Backend>(t: &Tensor<B, 1, Int>, t_index: usize) -> Result<()> {
    let min = t.clone().min().into_scalar().elem::<i64>();
    let max = t.clone().max().into_scalar().elem::<i64>();

    for timestep in [min, max] {
        if timestep != t_index as i64 {
            return Err(DiffusionError::TimestepIndexMismatch { t_index, timestep });
        }
    }
    Ok(())
}

fn predict<B: Backend, M: NoisePredictor<B>>(
    model: &M,
    x: Tensor<B, 4>,
    t: Tensor<B, 1, Int>,
) -> Result<Tensor<B, 4>> {
    let dims = x.dims();
    let predicted = model.predict_noise(x, t);
    check_shape(&dims, &predicted.dims())?;
    Ok(predicted)
}
