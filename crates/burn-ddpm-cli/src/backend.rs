//! Compile-time backend selection
//!
//! - `ndarray` (default): CPU backend, no GPU required
//! - `wgpu`: WebGPU (Vulkan/Metal/DX12); build with `--no-default-features --features wgpu`
//!
//! When both are enabled ndarray wins.

use burn::prelude::*;
use burn_autodiff::Autodiff;

#[cfg(not(any(feature = "ndarray", feature = "wgpu")))]
compile_error!("Enable one of the `ndarray` or `wgpu` features");

/// Backend used for sampling and noising
#[cfg(feature = "ndarray")]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

/// Backend used for sampling and noising
#[cfg(all(feature = "wgpu", not(feature = "ndarray")))]
pub type InferenceBackend = burn_wgpu::Wgpu;

/// Backend used for training
pub type TrainBackend = Autodiff<InferenceBackend>;

pub type Device = <InferenceBackend as Backend>::Device;

pub fn default_device() -> Device {
    Device::default()
}

pub fn backend_name() -> &'static str {
    #[cfg(feature = "ndarray")]
    {
        "ndarray (CPU)"
    }
    #[cfg(all(feature = "wgpu", not(feature = "ndarray")))]
    {
        "wgpu"
    }
}
