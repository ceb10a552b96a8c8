pub mod config;
pub mod mutation;
pub mod property;

pub use crate::{backend, error::Error};
pub use burn::{
    module::{Module, Param},
    tensor::{backend::Backend, Int, Tensor, TensorData},
};
pub use config::*;
pub use mutation::*;

use std::fmt;

/// A scene of 3D Gaussian points.
///
/// All parameters are inner values and share the leading dimension `P`.
#[derive(Module)]
pub struct Gaussian3dScene<B: Backend> {
    /// `[P, 3]`
    pub colors_sh_dc: Param<Tensor<B, 2>>,
    /// `[P, 45] <- [P, 15, 3]`
    pub colors_sh_rest: Param<Tensor<B, 2>>,
    /// `[P, 1]`
    pub opacities: Param<Tensor<B, 2>>,
    /// `[P, 3]`
    pub positions: Param<Tensor<B, 2>>,
    /// `[P, 4]`
    pub rotations: Param<Tensor<B, 2>>,
    /// `[P, 3]`
    pub scalings: Param<Tensor<B, 2>>,
}

impl<B: Backend> fmt::Debug for Gaussian3dScene<B> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("Gaussian3dScene")
            .field("devices", &self.devices())
            .field("colors_sh_dc.dims()", &self.colors_sh_dc.dims())
            .field("colors_sh_rest.dims()", &self.colors_sh_rest.dims())
            .field("opacities.dims()", &self.opacities.dims())
            .field("positions.dims()", &self.positions.dims())
            .field("rotations.dims()", &self.rotations.dims())
            .field("scalings.dims()", &self.scalings.dims())
            .finish()
    }
}

impl<B: Backend> Default for Gaussian3dScene<B> {
    fn default() -> Self {
        Gaussian3dSceneConfig::default().into()
    }
}
