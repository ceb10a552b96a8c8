//! Density control of the scene.
//!
//! The refiner accumulates per-point statistics from every training step
//! and opens a densification gate on a coarser schedule.

pub use crate::{
    error::Error,
    scene::gaussian_3d::{Gaussian3dMutation, Gaussian3dScene},
};
pub use burn::{
    config::Config,
    record::Record,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Int, Tensor,
    },
};

use crate::function::TensorFloatExtension;
use std::fmt;

/// The refiner of point statistics.
#[derive(Clone, Debug)]
pub struct Refiner<B: Backend> {
    pub config: RefinerConfig,
    pub record: RefinerRecord<B>,
}

#[derive(Config, Copy, Debug, PartialEq)]
pub struct RefinerConfig {
    /// The number of training cameras.
    pub camera_count: u64,

    #[config(default = "100")]
    pub refine_every: u64,

    /// In the unit of `refine_every` steps.
    #[config(default = "30")]
    pub reset_alpha_every: u64,

    #[config(default = "15000")]
    pub stop_split_at: u64,

    #[config(default = "500")]
    pub warmup_length: u64,
}

pub type RefinerRecord<B> = Option<RefinerState<B>>;

/// Running statistics of the points.
///
/// All tensors share the shape `[P]`.
#[derive(Clone, Debug, Record)]
pub struct RefinerState<B: Backend> {
    /// Accumulated norms of 2D position gradients over visible steps.
    pub positions_2d_grad_norms: Tensor<B, 1>,
    /// Maximum 2D radii normalized by the larger image side.
    pub sizes_2d_max: Tensor<B, 1>,
    /// Number of visible steps, starting from one.
    pub visible_counts: Tensor<B, 1>,
}

/// Inputs of [`Refiner::refine`] from one training step.
#[derive(Clone, Debug)]
pub struct RefinerInput<B: Backend> {
    /// The rendered height.
    pub image_height: u32,
    /// The rendered width.
    pub image_width: u32,
    /// `[P, 2]`, absent if no point is visible.
    pub positions_2d_grad: Option<Tensor<B, 2>>,
    /// `[P]`
    pub radii: Tensor<B, 1, Int>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RefinerPhase {
    /// No densification yet.
    Warmup,
    /// The statistics are updated and the gate is evaluated periodically.
    Accumulating,
    /// The point count is stable.
    Frozen,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RefinerAction {
    /// Nothing is updated.
    Frozen,
    /// The statistics are updated.
    Accumulated,
    /// The statistics are updated and the densification gate is open.
    Densify,
}

/// Selecting the points to split, clone and prune.
pub trait Densifier<AB: AutodiffBackend>: fmt::Debug {
    /// Returning the mutation to commit, or `None` to keep the points.
    fn densify(
        &mut self,
        scene: &Gaussian3dScene<AB>,
        refiner: &Refiner<AB::InnerBackend>,
    ) -> Option<Gaussian3dMutation<AB>>;
}

/// Never mutating the points.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NoDensification;

impl<AB: AutodiffBackend> Densifier<AB> for NoDensification {
    #[inline]
    fn densify(
        &mut self,
        _scene: &Gaussian3dScene<AB>,
        _refiner: &Refiner<AB::InnerBackend>,
    ) -> Option<Gaussian3dMutation<AB>> {
        None
    }
}

impl RefinerConfig {
    #[inline]
    pub fn init<B: Backend>(&self) -> Refiner<B> {
        Refiner {
            config: *self,
            record: None,
        }
    }

    pub fn validate(&self) -> Result<&Self, Error> {
        if self.refine_every == 0 {
            return Err(Error::Validation(
                "refine_every".into(),
                "greater than 0".into(),
            ));
        }
        if self.reset_alpha_every == 0 {
            return Err(Error::Validation(
                "reset_alpha_every".into(),
                "greater than 0".into(),
            ));
        }

        Ok(self)
    }
}

impl<B: Backend> Refiner<B> {
    /// The phase at the step.
    pub fn phase(
        &self,
        step: u64,
    ) -> RefinerPhase {
        if step >= self.config.stop_split_at {
            RefinerPhase::Frozen
        } else if step <= self.config.warmup_length {
            RefinerPhase::Warmup
        } else {
            RefinerPhase::Accumulating
        }
    }

    /// Whether the densification gate is open at the step.
    ///
    /// It opens every `refine_every` steps after warmup, except within
    /// `camera_count + refine_every` steps after each opacity reset.
    pub fn is_densifiable(
        &self,
        step: u64,
    ) -> bool {
        let RefinerConfig {
            camera_count,
            refine_every,
            reset_alpha_every,
            stop_split_at,
            warmup_length,
        } = self.config;

        step > warmup_length
            && step < stop_split_at
            && step.checked_rem(refine_every) == Some(0)
            && step
                .checked_rem(reset_alpha_every.saturating_mul(refine_every))
                .is_some_and(|remainder| {
                    remainder > camera_count.saturating_add(refine_every)
                })
    }

    /// Updating the statistics with the outputs of the training step.
    pub fn refine(
        &mut self,
        step: u64,
        input: RefinerInput<B>,
    ) -> Result<RefinerAction, Error> {
        if self.phase(step) == RefinerPhase::Frozen {
            return Ok(RefinerAction::Frozen);
        }

        // P
        let point_count = input.radii.dims()[0];
        let device = input.radii.device();

        if let Some(state) = &self.record {
            let dims = state.visible_counts.dims();
            if dims != [point_count] {
                return Err(Error::MismatchedShape(vec![point_count], dims.to_vec()));
            }
        }

        // [P]
        let positions_2d_grad_norms = match input.positions_2d_grad {
            Some(grad) => {
                let dims = grad.dims();
                if dims != [point_count, 2] {
                    return Err(Error::MismatchedShape(dims.to_vec(), vec![point_count, 2]));
                }
                grad.norm_l2_dim(1).reshape([point_count])
            },
            None => Tensor::zeros([point_count], &device),
        };
        // [P]
        let is_visible = input.radii.to_owned().greater_elem(0);
        // [P]
        let sizes_2d = input
            .radii
            .float()
            .div_scalar(input.image_height.max(input.image_width).max(1) as f64);

        match self.record.take() {
            None => {
                self.record = Some(RefinerState {
                    positions_2d_grad_norms,
                    sizes_2d_max: sizes_2d,
                    visible_counts: Tensor::ones([point_count], &device),
                });
            },
            Some(state) => {
                self.record = Some(RefinerState {
                    positions_2d_grad_norms: state.positions_2d_grad_norms.to_owned().mask_where(
                        is_visible.to_owned(),
                        state.positions_2d_grad_norms + positions_2d_grad_norms,
                    ),
                    sizes_2d_max: state.sizes_2d_max.to_owned().mask_where(
                        is_visible.to_owned(),
                        state.sizes_2d_max.max_pair(sizes_2d),
                    ),
                    visible_counts: state
                        .visible_counts
                        .to_owned()
                        .mask_where(is_visible, state.visible_counts.add_scalar(1.0)),
                });
            },
        }

        if !self.is_densifiable(step) {
            return Ok(RefinerAction::Accumulated);
        }

        log::info!(
            target: "gausplat::trainer::refine",
            "Refiner::refine > densifiable at step ({step}), point_count ({point_count})",
        );

        Ok(RefinerAction::Densify)
    }

    /// The means of 2D position gradient norms over visible steps.
    ///
    /// The shape is `[P]`.
    pub fn positions_2d_grad_norm_mean(&self) -> Option<Tensor<B, 1>> {
        self.record.as_ref().map(|state| {
            state
                .positions_2d_grad_norms
                .to_owned()
                .div(state.visible_counts.to_owned())
        })
    }

    /// Remapping the statistics to the retained points followed by
    /// `appended_count` new points.
    pub fn commit(
        &mut self,
        retained: Tensor<B, 1, Int>,
        appended_count: usize,
    ) -> &mut Self {
        if let Some(state) = self.record.take() {
            let device = state.visible_counts.device();
            let remap = |value: Tensor<B, 1>, appended: Tensor<B, 1>| {
                let value = value.select(0, retained.to_owned());
                if appended_count == 0 {
                    value
                } else {
                    Tensor::cat(vec![value, appended], 0)
                }
            };

            self.record = Some(RefinerState {
                positions_2d_grad_norms: remap(
                    state.positions_2d_grad_norms,
                    Tensor::zeros([appended_count], &device),
                ),
                sizes_2d_max: remap(state.sizes_2d_max, Tensor::zeros([appended_count], &device)),
                visible_counts: remap(state.visible_counts, Tensor::ones([appended_count], &device)),
            });
        }

        self
    }

    #[inline]
    pub fn load_record(
        &mut self,
        record: RefinerRecord<B>,
    ) -> &mut Self {
        self.record = record;
        self
    }

    #[inline]
    pub fn into_record(self) -> RefinerRecord<B> {
        self.record
    }
}
