//! Rendering a 3DGS scene from a camera.

pub mod project;
pub mod rasterize;

pub use crate::{
    backend::{self, Autodiff},
    error::Error,
    render::camera::Camera,
    scene::gaussian_3d::Gaussian3dScene,
};
pub use burn::{
    config::Config,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Int, Tensor, TensorData,
    },
};
pub use project::{ProjectInput, ProjectOutput};
pub use rasterize::{RasterizeInput, TILE_SIZE_X, TILE_SIZE_Y};

use crate::{
    function::TensorFloatExtension,
    render::camera::{matmul, projection_transform, Z_FAR, Z_NEAR},
    spherical_harmonics::{self, SH_DEGREE_MAX},
};
use burn::tensor::ElementConversion;
use std::fmt;

/// The stages of rendering.
///
/// All stages should be differentiable on an autodiff backend.
pub trait Gaussian3dKernels<B: Backend>: fmt::Debug {
    /// Projecting the points onto the screen.
    fn project(
        &self,
        input: ProjectInput<B>,
    ) -> ProjectOutput<B>;

    /// Evaluating view-dependent colors.
    ///
    /// ## Returns
    ///
    /// `[P, 3]`
    fn evaluate_colors_sh(
        &self,
        degree: u32,
        directions: Tensor<B, 2>,
        colors_sh: Tensor<B, 3>,
    ) -> Tensor<B, 2>;

    /// Compositing the colored points into the image.
    ///
    /// ## Returns
    ///
    /// `[I_y, I_x, 3]`
    fn rasterize(
        &self,
        input: RasterizeInput<B>,
    ) -> Tensor<B, 3>;
}

/// The stages written in tensor operations.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TensorKernels;

impl<B: Backend> Gaussian3dKernels<B> for TensorKernels {
    #[inline]
    fn project(
        &self,
        input: ProjectInput<B>,
    ) -> ProjectOutput<B> {
        project::project(input)
    }

    #[inline]
    fn evaluate_colors_sh(
        &self,
        degree: u32,
        directions: Tensor<B, 2>,
        colors_sh: Tensor<B, 3>,
    ) -> Tensor<B, 2> {
        spherical_harmonics::evaluate(degree, directions, colors_sh)
    }

    #[inline]
    fn rasterize(
        &self,
        input: RasterizeInput<B>,
    ) -> Tensor<B, 3> {
        rasterize::rasterize(input)
    }
}

#[derive(Config, Debug, PartialEq)]
pub struct Gaussian3dRenderOptions {
    /// Normalized RGB.
    #[config(default = "[0.0, 0.0, 0.0]")]
    pub background: [f32; 3],

    /// It should be no more than [`SH_DEGREE_MAX`].
    #[config(default = "SH_DEGREE_MAX")]
    pub colors_sh_degree_max: u32,

    /// The degree of SH increases by one every interval of steps.
    #[config(default = "1000")]
    pub colors_sh_degree_interval: u64,

    /// The image is downscaled by `2^downscale_count` at the start.
    #[config(default = "2")]
    pub downscale_count: u32,

    /// The downscale level decreases by one every schedule of steps.
    #[config(default = "3000")]
    pub resolution_schedule: u64,
}

pub struct Gaussian3dRenderOutput<B: Backend> {
    /// `[I_y, I_x, 3]`
    pub colors_rgb_2d: Tensor<B, 3>,

    /// The SH degree used for the colors.
    pub colors_sh_degree: u32,

    /// The projected height, possibly downscaled.
    pub image_height: u32,

    /// The projected width, possibly downscaled.
    pub image_width: u32,

    /// No point is visible and the image is the background.
    pub is_degenerate: bool,

    /// A zero leaf of shape `[P, 2]` added onto the 2D positions.
    ///
    /// Its gradient is the gradient of the 2D positions.
    ///
    /// ## Usage
    ///
    /// ```ignore
    /// let positions_2d_grad =
    ///     output.positions_2d_grad_ref.grad_remove(&mut grads);
    /// ```
    pub positions_2d_grad_ref: Tensor<B, 2>,

    /// `[P]`, `0` means the point is not visible.
    pub radii: Tensor<B, 1, Int>,
}

impl Gaussian3dRenderOptions {
    /// The downscale factor at the step.
    ///
    /// $$ 2^{\max(D - \lfloor s / S \rfloor, 0)} $$
    pub fn downscale_factor(
        &self,
        step: u64,
    ) -> f64 {
        let level = (self.downscale_count as u64).saturating_sub(
            step.checked_div(self.resolution_schedule).unwrap_or(u64::MAX),
        );
        2.0_f64.powi(level as i32)
    }

    /// The SH degree at the step.
    ///
    /// $$ \min(\lfloor s / S \rfloor, D_{\max}) $$
    pub fn colors_sh_degree(
        &self,
        step: u64,
    ) -> u32 {
        step.checked_div(self.colors_sh_degree_interval)
            .unwrap_or(u64::MAX)
            .min(self.colors_sh_degree_max as u64) as u32
    }

    pub fn validate(&self) -> Result<&Self, Error> {
        if self.colors_sh_degree_max > SH_DEGREE_MAX {
            return Err(Error::Validation(
                "colors_sh_degree_max".into(),
                format!("no more than {SH_DEGREE_MAX}"),
            ));
        }
        if self.downscale_count > 16 {
            return Err(Error::Validation(
                "downscale_count".into(),
                "no more than 16".into(),
            ));
        }
        if self.background.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(Error::Validation(
                "background".into(),
                "within [0.0, 1.0]".into(),
            ));
        }

        Ok(self)
    }
}

impl<B: Backend> fmt::Debug for Gaussian3dRenderOutput<B> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("Gaussian3dRenderOutput")
            .field("colors_rgb_2d.dims()", &self.colors_rgb_2d.dims())
            .field("colors_sh_degree", &self.colors_sh_degree)
            .field("image_height", &self.image_height)
            .field("image_width", &self.image_width)
            .field("is_degenerate", &self.is_degenerate)
            .field("radii.dims()", &self.radii.dims())
            .finish()
    }
}

impl<B: Backend> Gaussian3dScene<B> {
    /// Rendering the scene from the camera at the training step.
    ///
    /// The output resolution of `camera` is scaled during rendering
    /// and restored before returning.
    pub fn render<K: Gaussian3dKernels<B>>(
        &self,
        camera: &mut Camera,
        step: u64,
        options: &Gaussian3dRenderOptions,
        kernels: &K,
    ) -> Result<Gaussian3dRenderOutput<B>, Error> {
        options.validate()?;

        let device = self.device();
        // P
        let point_count = self.point_count();
        let colors_sh_degree = options.colors_sh_degree(step);
        // [3]
        let background = Tensor::<B, 1>::from_data(
            TensorData::new(options.background.to_vec(), [3]).convert::<B::FloatElem>(),
            &device,
        );
        // [P, 2]
        let positions_2d_grad_ref =
            Tensor::<B, 2>::zeros([point_count, 2], &device).require_grad();

        #[cfg(debug_assertions)]
        log::debug!(
            target: "gausplat::trainer::render",
            "Gaussian3dScene::render > step ({step}), point_count ({point_count})",
        );

        let (colors_rgb_2d, radii, image_height, image_width) = {
            let camera = camera.scale_output_resolution(options.downscale_factor(step).recip());
            let image_height = camera.image_height;
            let image_width = camera.image_width;

            // Specifying the transforms

            let view_transform = camera.view_transform();
            let view_projection_transform = matmul(
                &projection_transform(
                    Z_NEAR,
                    Z_FAR,
                    camera.field_of_view_x(),
                    camera.field_of_view_y(),
                ),
                &view_transform,
            );
            let tile_bounds = [
                image_width.div_ceil(TILE_SIZE_X),
                image_height.div_ceil(TILE_SIZE_Y),
                1,
            ];

            // [P, 3]
            let positions = self.get_positions();

            let projected = kernels.project(ProjectInput {
                focal_length_x: camera.focal_length_x,
                focal_length_y: camera.focal_length_y,
                image_height,
                image_width,
                positions: positions.to_owned(),
                principal_point_x: camera.principal_point_x,
                principal_point_y: camera.principal_point_y,
                rotations: self.get_rotations(),
                scaling_unit: 1.0,
                scalings: self.get_scalings(),
                tile_bounds,
                view_projection_transform: transform_to_tensor(
                    &view_projection_transform,
                    &device,
                ),
                view_transform: transform_to_tensor(&view_transform, &device),
            });

            let radius_sum = projected
                .radii
                .to_owned()
                .sum()
                .into_scalar()
                .elem::<i64>();

            if radius_sum == 0 {
                (None, projected.radii, image_height, image_width)
            } else {
                // [1, 3]
                let view_position = Tensor::<B, 2>::from_data(
                    TensorData::new(
                        camera.view_position().map(|v| v as f32).to_vec(),
                        [1, 3],
                    )
                    .convert::<B::FloatElem>(),
                    &device,
                );
                // [P, 3], the colors do not move the positions
                let directions = (positions.detach() - view_position).normalize_dim(1);
                // [P, 3]
                let colors_rgb_3d = kernels
                    .evaluate_colors_sh(colors_sh_degree, directions, self.get_colors_sh())
                    .add_scalar(0.5)
                    .clamp_min(0.0);

                let colors_rgb_2d = kernels
                    .rasterize(RasterizeInput {
                        background: background.to_owned(),
                        colors_rgb_3d,
                        conics: projected.conics,
                        depths: projected.depths,
                        image_height,
                        image_width,
                        opacities: self.get_opacities(),
                        positions_2d: projected.positions_2d + positions_2d_grad_ref.to_owned(),
                        radii: projected.radii.to_owned(),
                        tile_touched_counts: projected.tile_touched_counts,
                    })
                    .clamp_max(1.0);

                (Some(colors_rgb_2d), projected.radii, image_height, image_width)
            }
        };

        let is_degenerate = colors_rgb_2d.is_none();
        let colors_rgb_2d = colors_rgb_2d.unwrap_or_else(|| {
            #[cfg(debug_assertions)]
            log::debug!(
                target: "gausplat::trainer::render",
                "Gaussian3dScene::render > no visible point at step ({step})",
            );

            let image_height = camera.image_height as usize;
            let image_width = camera.image_width as usize;
            Tensor::<B, 3>::ones([image_height, image_width, 1], &device) * background.reshape([1, 1, 3])
        });

        Ok(Gaussian3dRenderOutput {
            colors_rgb_2d,
            colors_sh_degree,
            image_height,
            image_width,
            is_degenerate,
            positions_2d_grad_ref,
            radii,
        })
    }
}

/// `[4, 4]`
fn transform_to_tensor<B: Backend>(
    transform: &[[f64; 4]; 4],
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::from_data(
        TensorData::new(
            transform
                .iter()
                .flatten()
                .map(|&v| v as f32)
                .collect::<Vec<_>>(),
            [4, 4],
        )
        .convert::<B::FloatElem>(),
        device,
    )
}
