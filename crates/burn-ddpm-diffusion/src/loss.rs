//! Reconstruction losses between true and predicted noise

use std::fmt;
use std::str::FromStr;

use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::DiffusionError;

/// Loss kind used by the training objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum LossType {
    /// Mean absolute error
    L1,
    /// Mean squared error
    L2,
    /// Smooth L1 with delta = 1
    #[default]
    Huber,
}

impl LossType {
    /// Reduce `noise` against `predicted` to a single-element tensor
    pub fn compute<B: Backend, const D: usize>(
        &self,
        noise: Tensor<B, D>,
        predicted: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        match self {
            LossType::L1 => (noise - predicted).abs().mean(),
            LossType::L2 => MseLoss::new().forward(predicted, noise, Reduction::Mean),
            LossType::Huber => smooth_l1(noise, predicted),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LossType::L1 => "l1",
            LossType::L2 => "l2",
            LossType::Huber => "huber",
        }
    }
}

impl FromStr for LossType {
    type Err = DiffusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l1" => Ok(LossType::L1),
            "l2" => Ok(LossType::L2),
            "huber" => Ok(LossType::Huber),
            other => Err(DiffusionError::UnsupportedLossType(other.to_string())),
        }
    }
}

impl TryFrom<String> for LossType {
    type Error = DiffusionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for LossType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Smooth L1: 0.5 * d² where |d| < 1, |d| - 0.5 elsewhere
fn smooth_l1<B: Backend, const D: usize>(a: Tensor<B, D>, b: Tensor<B, D>) -> Tensor<B, 1> {
    let diff = (a - b).abs();
    let quadratic = diff.clone().powf_scalar(2.0) * 0.5;
    let linear = diff.clone() - 0.5;
    linear.mask_where(diff.lower_elem(1.0), quadratic).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    fn pair() -> (Tensor<TestBackend, 2>, Tensor<TestBackend, 2>) {
        let device = Default::default();
        let noise = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0], [2.0, -1.0]], &device);
        let predicted = Tensor::<TestBackend, 2>::from_floats([[0.5, 1.0], [0.0, 1.0]], &device);
        (noise, predicted)
    }

    #[test]
    fn test_parse_loss_type() {
        assert_eq!("l1".parse::<LossType>().unwrap(), LossType::L1);
        assert_eq!("l2".parse::<LossType>().unwrap(), LossType::L2);
        assert_eq!("huber".parse::<LossType>().unwrap(), LossType::Huber);
        assert_eq!(
            "l3".parse::<LossType>(),
            Err(DiffusionError::UnsupportedLossType("l3".to_string()))
        );
        assert_eq!(LossType::Huber.to_string(), "huber");
    }

    #[test]
    fn test_l1_is_mean_absolute_difference() {
        let (noise, predicted) = pair();
        // |−0.5| + 0 + 2 + 2 = 4.5, over 4 elements
        let loss = scalar(LossType::L1.compute(noise, predicted));
        assert!((loss - 1.125).abs() < 1e-6);
    }

    #[test]
    fn test_l2_is_mean_squared_difference() {
        let (noise, predicted) = pair();
        // 0.25 + 0 + 4 + 4 = 8.25, over 4 elements
        let loss = scalar(LossType::L2.compute(noise, predicted));
        assert!((loss - 2.0625).abs() < 1e-6);
    }

    #[test]
    fn test_huber_switches_to_linear_above_one() {
        let (noise, predicted) = pair();
        // 0.125 + 0 + 1.5 + 1.5 = 3.125, over 4 elements
        let loss = scalar(LossType::Huber.compute(noise, predicted));
        assert!((loss - 0.78125).abs() < 1e-6);
    }

    #[test]
    fn test_zero_error_is_zero_loss() {
        let (noise, _) = pair();
        for kind in [LossType::L1, LossType::L2, LossType::Huber] {
            assert_eq!(scalar(kind.compute(noise.clone(), noise.clone())), 0.0);
        }
    }
}
