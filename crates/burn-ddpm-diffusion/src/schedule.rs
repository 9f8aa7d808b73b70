//! Noise schedule for DDPM
//!
//! Coefficients are derived once on the host in f64 and uploaded to the
//! device once. Both representations are immutable after construction.

use burn::prelude::*;
use burn::tensor::ElementConversion;

use crate::error::{DiffusionError, Result};

// ============================================================================
// Host coefficients
// ============================================================================

/// Per-timestep schedule coefficients, all of length T
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleCoefficients {
    /// Noise variance added at each forward step: βₜ
    pub betas: Vec<f64>,
    /// αₜ = 1 - βₜ
    pub alphas: Vec<f64>,
    /// Cumulative product of alphas: ᾱₜ
    pub alphas_cumprod: Vec<f64>,
    /// ᾱₜ₋₁, with ᾱ₋₁ = 1
    pub alphas_cumprod_prev: Vec<f64>,
    /// sqrt(1 / αₜ)
    pub sqrt_recip_alphas: Vec<f64>,
    /// sqrt(ᾱₜ)
    pub sqrt_alphas_cumprod: Vec<f64>,
    /// sqrt(1 - ᾱₜ)
    pub sqrt_one_minus_alphas_cumprod: Vec<f64>,
    /// Variance of q(xₜ₋₁ | xₜ, x₀): βₜ (1 - ᾱₜ₋₁) / (1 - ᾱₜ)
    pub posterior_variance: Vec<f64>,
}

impl ScheduleCoefficients {
    /// Linear beta schedule from `beta_start` to `beta_end` over `num_timesteps`
    pub fn linear(num_timesteps: usize, beta_start: f64, beta_end: f64) -> Result<Self> {
        if num_timesteps == 0 {
            return Err(DiffusionError::InvalidTimesteps(num_timesteps));
        }
        if !(beta_start > 0.0 && beta_start <= beta_end && beta_end < 1.0) {
            return Err(DiffusionError::InvalidBetaRange {
                start: beta_start,
                end: beta_end,
            });
        }

        let betas: Vec<f64> = (0..num_timesteps)
            .map(|i| {
                let t = if num_timesteps > 1 {
                    i as f64 / (num_timesteps - 1) as f64
                } else {
                    0.0
                };
                beta_start + t * (beta_end - beta_start)
            })
            .collect();

        Ok(Self::from_betas(betas))
    }

    fn from_betas(betas: Vec<f64>) -> Self {
        let alphas: Vec<f64> = betas.iter().map(|b| 1.0 - b).collect();

        // Cumulative product
        let mut alphas_cumprod = Vec::with_capacity(alphas.len());
        let mut cumprod = 1.0f64;
        for alpha in &alphas {
            cumprod *= alpha;
            alphas_cumprod.push(cumprod);
        }

        let mut alphas_cumprod_prev = Vec::with_capacity(alphas.len());
        alphas_cumprod_prev.push(1.0);
        alphas_cumprod_prev.extend_from_slice(&alphas_cumprod[..alphas_cumprod.len() - 1]);

        let sqrt_recip_alphas = alphas.iter().map(|a| (1.0 / a).sqrt()).collect();
        let sqrt_alphas_cumprod = alphas_cumprod.iter().map(|a| a.sqrt()).collect();
        let sqrt_one_minus_alphas_cumprod =
            alphas_cumprod.iter().map(|a| (1.0 - a).sqrt()).collect();

        let posterior_variance = betas
            .iter()
            .zip(&alphas_cumprod)
            .zip(&alphas_cumprod_prev)
            .map(|((beta, cumprod), prev)| beta * (1.0 - prev) / (1.0 - cumprod))
            .collect();

        Self {
            betas,
            alphas,
            alphas_cumprod,
            alphas_cumprod_prev,
            sqrt_recip_alphas,
            sqrt_alphas_cumprod,
            sqrt_one_minus_alphas_cumprod,
            posterior_variance,
        }
    }

    /// Number of timesteps (T)
    pub fn len(&self) -> usize {
        self.betas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.betas.is_empty()
    }

    /// Signal-to-noise ratio ᾱₜ / (1 - ᾱₜ) at each timestep
    pub fn snr(&self) -> Vec<f64> {
        self.alphas_cumprod.iter().map(|a| a / (1.0 - a)).collect()
    }
}

// ============================================================================
// Device schedule
// ============================================================================

/// Schedule coefficients resident on a device
#[derive(Debug, Clone)]
pub struct NoiseSchedule<B: Backend> {
    coefficients: ScheduleCoefficients,
    pub betas: Tensor<B, 1>,
    pub alphas: Tensor<B, 1>,
    pub alphas_cumprod: Tensor<B, 1>,
    pub alphas_cumprod_prev: Tensor<B, 1>,
    pub sqrt_recip_alphas: Tensor<B, 1>,
    pub sqrt_alphas_cumprod: Tensor<B, 1>,
    pub sqrt_one_minus_alphas_cumprod: Tensor<B, 1>,
    pub posterior_variance: Tensor<B, 1>,
}

fn upload<B: Backend>(values: &[f64], device: &B::Device) -> Tensor<B, 1> {
    let data: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    Tensor::from_data(TensorData::new(data, [values.len()]), device)
}

impl<B: Backend> NoiseSchedule<B> {
    /// Upload host coefficients to `device`
    pub fn new(coefficients: ScheduleCoefficients, device: &B::Device) -> Self {
        Self {
            betas: upload(&coefficients.betas, device),
            alphas: upload(&coefficients.alphas, device),
            alphas_cumprod: upload(&coefficients.alphas_cumprod, device),
            alphas_cumprod_prev: upload(&coefficients.alphas_cumprod_prev, device),
            sqrt_recip_alphas: upload(&coefficients.sqrt_recip_alphas, device),
            sqrt_alphas_cumprod: upload(&coefficients.sqrt_alphas_cumprod, device),
            sqrt_one_minus_alphas_cumprod: upload(
                &coefficients.sqrt_one_minus_alphas_cumprod,
                device,
            ),
            posterior_variance: upload(&coefficients.posterior_variance, device),
            coefficients,
        }
    }

    /// Linear schedule on `device`
    pub fn linear(
        num_timesteps: usize,
        beta_start: f64,
        beta_end: f64,
        device: &B::Device,
    ) -> Result<Self> {
        let coefficients = ScheduleCoefficients::linear(num_timesteps, beta_start, beta_end)?;
        Ok(Self::new(coefficients, device))
    }

    /// Number of timesteps (T)
    pub fn num_timesteps(&self) -> usize {
        self.coefficients.len()
    }

    /// Host copy of the coefficients
    pub fn coefficients(&self) -> &ScheduleCoefficients {
        &self.coefficients
    }

    /// Gather one coefficient per batch element
    ///
    /// Picks `coefficients[timesteps[i]]` for each example and reshapes to
    /// `[batch, 1, .., 1]` with the rank of `target_dims`, so the result
    /// broadcasts against a tensor of that shape.
    ///
    /// Fails when the timestep batch does not match `target_dims[0]` or
    /// when any timestep lies outside `[0, T)`.
    pub fn extract<const D: usize>(
        &self,
        coefficients: &Tensor<B, 1>,
        timesteps: &Tensor<B, 1, Int>,
        target_dims: [usize; D],
    ) -> Result<Tensor<B, D>> {
        let [batch] = timesteps.dims();
        if batch == 0 || batch != target_dims[0] {
            return Err(DiffusionError::ShapeMismatch {
                expected: vec![target_dims[0]],
                actual: vec![batch],
            });
        }
        self.check_range(timesteps)?;

        let mut shape = [1usize; D];
        shape[0] = batch;

        Ok(coefficients.clone().select(0, timesteps.clone()).reshape(shape))
    }

    fn check_range(&self, timesteps: &Tensor<B, 1, Int>) -> Result<()> {
        let num_timesteps = self.num_timesteps();
        let min = timesteps.clone().min().into_scalar().elem::<i64>();
        let max = timesteps.clone().max().into_scalar().elem::<i64>();

        if min < 0 {
            return Err(DiffusionError::TimestepOutOfRange {
                timestep: min,
                num_timesteps,
            });
        }
        if max >= num_timesteps as i64 {
            return Err(DiffusionError::TimestepOutOfRange {
                timestep: max,
                num_timesteps,
            });
        }
        Ok(())
    }
}

impl<B: burn::tensor::backend::AutodiffBackend> NoiseSchedule<B> {
    /// The same schedule on the inner (non-autodiff) backend
    pub fn valid(&self) -> NoiseSchedule<B::InnerBackend> {
        NoiseSchedule {
            coefficients: self.coefficients.clone(),
            betas: self.betas.clone().inner(),
            alphas: self.alphas.clone().inner(),
            alphas_cumprod: self.alphas_cumprod.clone().inner(),
            alphas_cumprod_prev: self.alphas_cumprod_prev.clone().inner(),
            sqrt_recip_alphas: self.sqrt_recip_alphas.clone().inner(),
            sqrt_alphas_cumprod: self.sqrt_alphas_cumprod.clone().inner(),
            sqrt_one_minus_alphas_cumprod: self.sqrt_one_minus_alphas_cumprod.clone().inner(),
            posterior_variance: self.posterior_variance.clone().inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn default_coefficients() -> ScheduleCoefficients {
        ScheduleCoefficients::linear(200, 1e-4, 0.02).unwrap()
    }

    #[test]
    fn test_sequences_share_length() {
        let c = default_coefficients();
        assert_eq!(c.len(), 200);
        for seq in [
            &c.betas,
            &c.alphas,
            &c.alphas_cumprod,
            &c.alphas_cumprod_prev,
            &c.sqrt_recip_alphas,
            &c.sqrt_alphas_cumprod,
            &c.sqrt_one_minus_alphas_cumprod,
            &c.posterior_variance,
        ] {
            assert_eq!(seq.len(), 200);
        }
    }

    #[test]
    fn test_linear_betas_hit_bounds() {
        let c = default_coefficients();
        assert_eq!(c.betas[0], 1e-4);
        assert!((c.betas[199] - 0.02).abs() < 1e-12);
        assert!(c.betas.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_alphas_cumprod_strictly_decreasing() {
        let c = default_coefficients();
        assert!(c.alphas_cumprod.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(c.alphas_cumprod_prev[0], 1.0);
        assert_eq!(&c.alphas_cumprod_prev[1..], &c.alphas_cumprod[..199]);
    }

    #[test]
    fn test_first_step_closed_form() {
        let c = default_coefficients();
        // ᾱ₀ = 1 - β₀, so sqrt(1 - ᾱ₀) = sqrt(β₀)
        assert!((c.sqrt_one_minus_alphas_cumprod[0] - c.betas[0].sqrt()).abs() < 1e-12);
        // No posterior noise before the first step
        assert_eq!(c.posterior_variance[0], 0.0);
        assert!(c.posterior_variance[1..].iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_snr_decreases() {
        let snr = default_coefficients().snr();
        assert!(snr[0] > snr[100]);
        assert!(snr[100] > snr[199]);
    }

    #[test]
    fn test_single_step_schedule() {
        let c = ScheduleCoefficients::linear(1, 1e-4, 0.02).unwrap();
        assert_eq!(c.betas, vec![1e-4]);
        assert_eq!(c.alphas_cumprod_prev, vec![1.0]);
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert_eq!(
            ScheduleCoefficients::linear(0, 1e-4, 0.02),
            Err(DiffusionError::InvalidTimesteps(0))
        );
        assert!(matches!(
            ScheduleCoefficients::linear(10, 0.02, 1e-4),
            Err(DiffusionError::InvalidBetaRange { .. })
        ));
        assert!(matches!(
            ScheduleCoefficients::linear(10, 0.0, 0.02),
            Err(DiffusionError::InvalidBetaRange { .. })
        ));
        assert!(matches!(
            ScheduleCoefficients::linear(10, 1e-4, 1.0),
            Err(DiffusionError::InvalidBetaRange { .. })
        ));
    }

    #[test]
    fn test_extract_broadcast_shape() {
        let device = Default::default();
        let schedule = NoiseSchedule::<TestBackend>::linear(200, 1e-4, 0.02, &device).unwrap();
        let t = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![5i64, 5, 100], [3]),
            &device,
        );

        let out = schedule
            .extract(&schedule.betas, &t, [3, 1, 28, 28])
            .unwrap();
        assert_eq!(out.dims(), [3, 1, 1, 1]);

        let values = out.into_data().to_vec::<f32>().unwrap();
        let betas = &schedule.coefficients().betas;
        assert_eq!(values[0], betas[5] as f32);
        assert_eq!(values[1], betas[5] as f32);
        assert_eq!(values[2], betas[100] as f32);
    }

    #[test]
    fn test_extract_follows_target_rank() {
        let device = Default::default();
        let schedule = NoiseSchedule::<TestBackend>::linear(10, 1e-4, 0.02, &device).unwrap();
        let t = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![1i64, 9], [2]), &device);

        let out = schedule.extract(&schedule.alphas, &t, [2, 16]).unwrap();
        assert_eq!(out.dims(), [2, 1]);
    }

    #[test]
    fn test_extract_rejects_batch_mismatch() {
        let device = Default::default();
        let schedule = NoiseSchedule::<TestBackend>::linear(200, 1e-4, 0.02, &device).unwrap();
        let t = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![5i64, 5], [2]), &device);

        let err = schedule
            .extract(&schedule.betas, &t, [3, 1, 28, 28])
            .unwrap_err();
        assert_eq!(
            err,
            DiffusionError::ShapeMismatch {
                expected: vec![3],
                actual: vec![2]
            }
        );
    }

    #[test]
    fn test_extract_rejects_out_of_range() {
        let device = Default::default();
        let schedule = NoiseSchedule::<TestBackend>::linear(200, 1e-4, 0.02, &device).unwrap();
        let t = Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64, 200], [2]), &device);

        let err = schedule
            .extract(&schedule.betas, &t, [2, 1, 4, 4])
            .unwrap_err();
        assert_eq!(
            err,
            DiffusionError::TimestepOutOfRange {
                timestep: 200,
                num_timesteps: 200
            }
        );
    }
}
