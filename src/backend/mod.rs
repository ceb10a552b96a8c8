pub use burn::{
    backend::wgpu::{WgpuDevice, WgpuRuntime},
    tensor::backend::{AutodiffBackend, Backend},
};

use burn::backend::{autodiff, wgpu};

pub type Autodiff<B> = autodiff::Autodiff<B>;
pub type Wgpu = wgpu::Wgpu<f32, i32>;
