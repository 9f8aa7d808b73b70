//! Group normalization with learnable affine parameters

use burn::module::Param;
use burn::prelude::*;

/// Group normalization module
///
/// Divides channels into groups and normalizes each group independently,
/// which stays stable at the small batch sizes diffusion training uses.
///
/// ```text
/// y = (x - mean(x_group)) / sqrt(var(x_group) + eps) * weight + bias
/// ```
///
/// "Group Normalization" - Wu & He, 2018
#[derive(Module, Debug)]
pub struct GroupNorm<B: Backend> {
    /// Number of groups to divide channels into
    pub num_groups: usize,
    /// Scale (gamma), shape `[num_channels]`
    pub weight: Param<Tensor<B, 1>>,
    /// Shift (beta), shape `[num_channels]`
    pub bias: Param<Tensor<B, 1>>,
    pub eps: f64,
}

impl<B: Backend> GroupNorm<B> {
    /// Creates a group norm with unit scale and zero shift
    ///
    /// # Arguments
    ///
    /// * `num_groups` - Number of channel groups
    /// * `num_channels` - Input channels, divisible by `num_groups`
    /// * `device` - Device for the affine parameters
    pub fn new(num_groups: usize, num_channels: usize, device: &B::Device) -> Self {
        Self {
            num_groups,
            weight: Param::from_tensor(Tensor::ones([num_channels], device)),
            bias: Param::from_tensor(Tensor::zeros([num_channels], device)),
            eps: 1e-5,
        }
    }

    /// Applies group normalization
    ///
    /// # Arguments
    ///
    /// * `x` - Input of shape `[batch, channels, height, width]`
    ///
    /// # Returns
    ///
    /// Normalized tensor of the same shape
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();
        let group_size = channels / self.num_groups;

        let x = x.reshape([batch, self.num_groups, group_size * height * width]);

        let mean = x.clone().mean_dim(2);
        let diff = x - mean;
        let var = diff.clone().powf_scalar(2.0).mean_dim(2);
        let x = diff / (var + self.eps).sqrt();

        let x = x.reshape([batch, channels, height, width]);

        let weight = self.weight.val().reshape([1, channels, 1, 1]);
        let bias = self.bias.val().reshape([1, channels, 1, 1]);

        x * weight + bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_groupnorm_normalizes_each_group() {
        let device = Default::default();
        let norm = GroupNorm::<TestBackend>::new(2, 4, &device);

        let values: Vec<f32> = (0..2 * 4 * 3 * 3).map(|i| (i as f32).sin() * 5.0 + 2.0).collect();
        let x = Tensor::<TestBackend, 4>::from_data(TensorData::new(values, [2, 4, 3, 3]), &device);

        let out = norm.forward(x);
        assert_eq!(out.dims(), [2, 4, 3, 3]);

        // Each group of 2 channels has mean 0 and unit variance
        let groups = out.reshape([4, 18]).into_data().to_vec::<f32>().unwrap();
        for group in groups.chunks(18) {
            let mean = group.iter().sum::<f32>() / 18.0;
            let var = group.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 18.0;
            assert!(mean.abs() < 1e-4, "mean {mean}");
            assert!((var - 1.0).abs() < 1e-3, "variance {var}");
        }
    }
}
