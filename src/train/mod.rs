//! 3DGS trainer.

pub use crate::{
    error::Error,
    metric::{self, Metric},
    optimize::{Gaussian3dOptimizer, Gaussian3dOptimizerConfig},
    refine::{
        Densifier, NoDensification, Refiner, RefinerAction, RefinerConfig, RefinerInput,
    },
    render::{
        camera::Camera,
        gaussian_3d::{Gaussian3dKernels, Gaussian3dRenderOptions, TensorKernels},
    },
    scene::gaussian_3d::{Gaussian3dMutation, Gaussian3dScene},
};
pub use burn::{
    config::Config,
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};

/// Trainer for 3DGS.
#[derive(Clone, Debug)]
pub struct Gaussian3dTrainer<AB: AutodiffBackend, K = TensorKernels, D = NoDensification> {
    /// Selection of points to mutate when the densification gate is open.
    pub densifier: D,
    /// Stages of rendering.
    pub kernels: K,
    /// Metric for optimization.
    pub metric_optimization: metric::MeanAbsoluteError,
    /// Optimizers of all parameter groups.
    pub optimizer: Gaussian3dOptimizer<AB>,
    /// Renderer options.
    pub options_renderer: Gaussian3dRenderOptions,
    /// Statistics of points.
    pub refiner: Refiner<AB::InnerBackend>,
    /// The step to train next, starting from zero.
    pub step: u64,
}

#[derive(Config, Debug)]
pub struct Gaussian3dTrainerConfig {
    #[config(default = "Gaussian3dOptimizerConfig::new()")]
    pub optimizer: Gaussian3dOptimizerConfig,

    #[config(default = "Gaussian3dRenderOptions::new()")]
    pub options_renderer: Gaussian3dRenderOptions,

    pub refiner: RefinerConfig,
}

/// Outputs of one training step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainOutput {
    /// The action taken by the refiner.
    pub action: RefinerAction,
    /// No point is visible.
    pub is_degenerate: bool,
    /// The optimization loss.
    pub loss: f64,
    /// The number of points after the step.
    pub point_count: usize,
    /// PSNR of the rendered image.
    pub psnr: f64,
    /// The trained step.
    pub step: u64,
}

impl Gaussian3dTrainerConfig {
    pub fn init<AB: AutodiffBackend, K: Gaussian3dKernels<AB>>(
        &self,
        kernels: K,
    ) -> Result<Gaussian3dTrainer<AB, K>, Error> {
        self.options_renderer.validate()?;
        self.refiner.validate()?;

        Ok(Gaussian3dTrainer {
            densifier: NoDensification,
            kernels,
            metric_optimization: Default::default(),
            optimizer: self.optimizer.init(),
            options_renderer: self.options_renderer.to_owned(),
            refiner: self.refiner.init(),
            step: 0,
        })
    }
}

impl<AB: AutodiffBackend, K: Gaussian3dKernels<AB>, D: Densifier<AB>> Gaussian3dTrainer<AB, K, D> {
    /// Replacing the densifier.
    pub fn with_densifier<D2: Densifier<AB>>(
        self,
        densifier: D2,
    ) -> Gaussian3dTrainer<AB, K, D2> {
        Gaussian3dTrainer {
            densifier,
            kernels: self.kernels,
            metric_optimization: self.metric_optimization,
            optimizer: self.optimizer,
            options_renderer: self.options_renderer,
            refiner: self.refiner,
            step: self.step,
        }
    }

    /// Training the scene for one step.
    ///
    /// `colors_rgb_2d_target` should have the rendered shape `[I_y, I_x, 3]`.
    pub fn train(
        &mut self,
        scene: &mut Gaussian3dScene<AB>,
        camera: &mut Camera,
        colors_rgb_2d_target: Tensor<AB, 3>,
    ) -> Result<TrainOutput, Error> {
        let step = self.step;

        #[cfg(all(debug_assertions, not(test)))]
        log::debug!(target: "gausplat::trainer::train", "step ({step})");

        self.optimizer.zero_grad();

        let output = scene.render(camera, step, &self.options_renderer, &self.kernels)?;

        let dims = output.colors_rgb_2d.dims();
        let dims_target = colors_rgb_2d_target.dims();
        if dims_target != dims {
            return Err(Error::MismatchedShape(dims_target.to_vec(), dims.to_vec()));
        }

        let colors_rgb_2d_target = colors_rgb_2d_target.set_require_grad(false);
        let loss = self
            .metric_optimization
            .evaluate(output.colors_rgb_2d.to_owned(), colors_rgb_2d_target.to_owned());
        let psnr = metric::PeakSignalToNoiseRatio
            .evaluate(output.colors_rgb_2d.to_owned().inner(), colors_rgb_2d_target.inner())
            .into_scalar()
            .elem::<f64>();

        // Optimizing the parameters

        let positions_2d_grad = if output.is_degenerate {
            None
        } else {
            let mut grads = loss.to_owned().backward();
            let positions_2d_grad = output.positions_2d_grad_ref.grad_remove(&mut grads);
            self.optimizer.accumulate(scene, &mut grads);
            positions_2d_grad
        };
        self.optimizer.step(scene)?;

        // Refining the points

        let device = scene.device();
        let radii = Tensor::<AB::InnerBackend, 1, Int>::from_data(
            output
                .radii
                .into_data()
                .convert::<<AB::InnerBackend as Backend>::IntElem>(),
            &device,
        );
        let action = self.refiner.refine(
            step,
            RefinerInput {
                image_height: output.image_height,
                image_width: output.image_width,
                positions_2d_grad,
                radii,
            },
        )?;

        if action == RefinerAction::Densify {
            if let Some(mutation) = self.densifier.densify(scene, &self.refiner) {
                self.commit(scene, &mutation)?;
            }
        }

        self.step += 1;

        Ok(TrainOutput {
            action,
            is_degenerate: output.is_degenerate,
            loss: loss.into_scalar().elem::<f64>(),
            point_count: scene.point_count(),
            psnr,
            step,
        })
    }

    /// Committing the mutation to the scene, optimizer and refiner at once.
    pub fn commit(
        &mut self,
        scene: &mut Gaussian3dScene<AB>,
        mutation: &Gaussian3dMutation<AB>,
    ) -> Result<&mut Self, Error> {
        let point_count = scene.point_count();
        scene.commit(mutation)?;

        let retained = mutation.retained_on::<AB::InnerBackend>(&scene.device());
        let appended_count = mutation.appended_count();
        self.optimizer.commit(retained.to_owned(), appended_count);
        self.refiner.commit(retained, appended_count);

        log::info!(
            target: "gausplat::trainer::train",
            "Gaussian3dTrainer::commit > point_count ({point_count} -> {}), size ({})",
            scene.point_count(),
            scene.size_readable(),
        );

        Ok(self)
    }
}
