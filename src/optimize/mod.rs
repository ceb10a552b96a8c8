//! Optimizing the scene parameters.

pub mod adam;
pub mod learning_rate;

pub use crate::{error::Error, scene::gaussian_3d::Gaussian3dScene};
pub use adam::*;
pub use burn::{
    config::Config,
    module::Param,
    record::Record,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Int, Tensor, TensorData,
    },
};
pub use learning_rate::*;

/// A group of parameters optimized independently.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ParamGroup {
    ColorsShDc,
    ColorsShRest,
    Opacities,
    Positions,
    Rotations,
    Scalings,
}

/// The optimizer of one parameter group.
#[derive(Clone, Debug)]
pub struct ParamGroupOptimizer<AB: AutodiffBackend> {
    pub group: ParamGroup,
    /// The gradient accumulated since the last zeroing.
    pub grad: Option<Tensor<AB::InnerBackend, 2>>,
    pub learning_rate: LearningRate,
    pub optimizer: Adam<AB::InnerBackend, 2>,
}

/// The optimizers of all parameter groups.
#[derive(Clone, Debug)]
pub struct Gaussian3dOptimizer<AB: AutodiffBackend> {
    pub groups: Vec<ParamGroupOptimizer<AB>>,
}

#[derive(Config, Copy, Debug, PartialEq)]
pub struct Gaussian3dOptimizerConfig {
    #[config(default = "AdamConfig::new()")]
    pub adam: AdamConfig,

    #[config(default = "LearningRateConfig::new(2.5e-3)")]
    pub learning_rate_colors_sh_dc: LearningRateConfig,

    #[config(default = "LearningRateConfig::new(1.25e-4)")]
    pub learning_rate_colors_sh_rest: LearningRateConfig,

    #[config(default = "LearningRateConfig::new(5e-2)")]
    pub learning_rate_opacities: LearningRateConfig,

    #[config(default = "LearningRateConfig::new(1.6e-4).with_end(Some(1.6e-6))")]
    pub learning_rate_positions: LearningRateConfig,

    #[config(default = "LearningRateConfig::new(1e-3)")]
    pub learning_rate_rotations: LearningRateConfig,

    #[config(default = "LearningRateConfig::new(5e-3)")]
    pub learning_rate_scalings: LearningRateConfig,
}

impl ParamGroup {
    pub const ALL: [Self; 6] = [
        Self::Positions,
        Self::Scalings,
        Self::Rotations,
        Self::ColorsShDc,
        Self::ColorsShRest,
        Self::Opacities,
    ];

    /// The parameter of the group in `scene`.
    #[inline]
    pub fn param<'s, B: Backend>(
        &self,
        scene: &'s Gaussian3dScene<B>,
    ) -> &'s Param<Tensor<B, 2>> {
        match self {
            Self::ColorsShDc => &scene.colors_sh_dc,
            Self::ColorsShRest => &scene.colors_sh_rest,
            Self::Opacities => &scene.opacities,
            Self::Positions => &scene.positions,
            Self::Rotations => &scene.rotations,
            Self::Scalings => &scene.scalings,
        }
    }

    /// Setting the inner value of the group in `scene`.
    #[inline]
    pub fn set_inner<'s, B: Backend>(
        &self,
        scene: &'s mut Gaussian3dScene<B>,
        value: Tensor<B, 2>,
    ) -> &'s mut Gaussian3dScene<B> {
        match self {
            Self::ColorsShDc => scene.set_inner_colors_sh_dc(value),
            Self::ColorsShRest => scene.set_inner_colors_sh_rest(value),
            Self::Opacities => scene.set_inner_opacities(value),
            Self::Positions => scene.set_inner_positions(value),
            Self::Rotations => scene.set_inner_rotations(value),
            Self::Scalings => scene.set_inner_scalings(value),
        }
    }
}

impl Gaussian3dOptimizerConfig {
    pub fn init<AB: AutodiffBackend>(&self) -> Gaussian3dOptimizer<AB> {
        let groups = ParamGroup::ALL
            .into_iter()
            .map(|group| ParamGroupOptimizer {
                group,
                grad: None,
                learning_rate: self.learning_rate(group).init(),
                optimizer: self.adam.init(),
            })
            .collect();

        Gaussian3dOptimizer { groups }
    }

    /// The learning rate config of the group.
    pub fn learning_rate(
        &self,
        group: ParamGroup,
    ) -> &LearningRateConfig {
        match group {
            ParamGroup::ColorsShDc => &self.learning_rate_colors_sh_dc,
            ParamGroup::ColorsShRest => &self.learning_rate_colors_sh_rest,
            ParamGroup::Opacities => &self.learning_rate_opacities,
            ParamGroup::Positions => &self.learning_rate_positions,
            ParamGroup::Rotations => &self.learning_rate_rotations,
            ParamGroup::Scalings => &self.learning_rate_scalings,
        }
    }
}

impl<AB: AutodiffBackend> Gaussian3dOptimizer<AB> {
    /// Clearing the accumulated gradients of all groups.
    pub fn zero_grad(&mut self) -> &mut Self {
        self.groups.iter_mut().for_each(|group| {
            group.grad = None;
        });
        self
    }

    /// Moving the gradients of all groups out of `grads`.
    pub fn accumulate(
        &mut self,
        scene: &Gaussian3dScene<AB>,
        grads: &mut AB::Gradients,
    ) -> &mut Self {
        self.groups.iter_mut().for_each(|group| {
            if let Some(grad) = group.group.param(scene).grad_remove(grads) {
                group.grad = Some(match group.grad.take() {
                    Some(grad_accumulated) => grad_accumulated.add(grad),
                    None => grad,
                });
            }
        });
        self
    }

    /// Updating all groups with their own gradients.
    ///
    /// A group without gradient keeps its values.
    pub fn step(
        &mut self,
        scene: &mut Gaussian3dScene<AB>,
    ) -> Result<&mut Self, Error> {
        #[cfg(debug_assertions)]
        log::debug!(target: "gausplat::trainer::optimize", "step");

        for group in self.groups.iter_mut() {
            if let Some(grad) = group.grad.take() {
                let value = group.group.param(scene).val().inner();
                let value = group.optimizer.update(*group.learning_rate, value, grad)?;
                group
                    .group
                    .set_inner(scene, Tensor::from_inner(value).require_grad());
            }
            group.learning_rate.update();
        }

        Ok(self)
    }

    /// Remapping the states of all groups to the mutated points.
    ///
    /// The accumulated gradients are cleared.
    pub fn commit(
        &mut self,
        retained: Tensor<AB::InnerBackend, 1, Int>,
        appended_count: usize,
    ) -> &mut Self {
        self.groups.iter_mut().for_each(|group| {
            group.grad = None;
            group.optimizer.commit(retained.to_owned(), appended_count);
        });
        self
    }

    /// The group optimizer of `group`.
    pub fn group(
        &self,
        group: ParamGroup,
    ) -> Option<&ParamGroupOptimizer<AB>> {
        self.groups.iter().find(|g| g.group == group)
    }
}

impl<AB: AutodiffBackend> Default for Gaussian3dOptimizer<AB> {
    #[inline]
    fn default() -> Self {
        Gaussian3dOptimizerConfig::default().init()
    }
}

impl Default for Gaussian3dOptimizerConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::gaussian_3d::Gaussian3dSceneConfig;
    use burn::backend::{Autodiff, NdArray};

    type AB = Autodiff<NdArray>;

    #[test]
    fn default_learning_rates() {
        let optimizer = Gaussian3dOptimizer::<AB>::default();
        assert_eq!(optimizer.groups.len(), 6);

        let rates = ParamGroup::ALL.map(|group| {
            *optimizer.group(group).unwrap().learning_rate
        });
        assert_eq!(rates, [1.6e-4, 5e-3, 1e-3, 2.5e-3, 1.25e-4, 5e-2]);
    }

    #[test]
    fn step_updates_each_group_independently() {
        let device = Default::default();
        let mut scene = Gaussian3dScene::<AB>::from(Gaussian3dSceneConfig::random(
            device, 4, 1.0, 0x3D,
        ));
        let mut optimizer = Gaussian3dOptimizer::<AB>::default();
        let positions = scene.positions.val().inner();
        let scalings = scene.scalings.val().inner();
        let opacities = scene.opacities.val().inner();

        // Only positions and scalings contribute to the loss.
        let loss = scene.positions.val().sum() + scene.scalings.val().sum().mul_scalar(-1.0);
        let mut grads = loss.backward();

        optimizer.zero_grad().accumulate(&scene, &mut grads).step(&mut scene).unwrap();

        // The first Adam step moves by the learning rate against the gradient sign.
        let target = positions.sub_scalar(1.6e-4);
        scene
            .positions
            .val()
            .inner()
            .into_data()
            .assert_approx_eq(&target.into_data(), 6);
        let target = scalings.add_scalar(5e-3);
        scene
            .scalings
            .val()
            .inner()
            .into_data()
            .assert_approx_eq(&target.into_data(), 6);
        scene
            .opacities
            .val()
            .inner()
            .into_data()
            .assert_approx_eq(&opacities.into_data(), 6);

        let group = optimizer.group(ParamGroup::Opacities).unwrap();
        assert!(group.optimizer.record.is_none());
        let group = optimizer.group(ParamGroup::Positions).unwrap();
        assert!(group.optimizer.record.is_some());
        assert!(*group.learning_rate < 1.6e-4);
    }

    #[test]
    fn zero_grad_clears_gradients() {
        let device = Default::default();
        let mut scene = Gaussian3dScene::<AB>::from(Gaussian3dSceneConfig::random(
            device, 2, 1.0, 0x3D,
        ));
        let mut optimizer = Gaussian3dOptimizer::<AB>::default();
        let positions = scene.positions.val().inner();

        let mut grads = scene.positions.val().sum().backward();
        optimizer.accumulate(&scene, &mut grads).zero_grad().step(&mut scene).unwrap();

        scene
            .positions
            .val()
            .inner()
            .into_data()
            .assert_approx_eq(&positions.into_data(), 6);
        assert!(optimizer.groups.iter().all(|group| group.grad.is_none()));
    }

    #[test]
    fn commit_remaps_all_groups() {
        let device = Default::default();
        let mut scene = Gaussian3dScene::<AB>::from(Gaussian3dSceneConfig::random(
            device, 3, 1.0, 0x3D,
        ));
        let mut optimizer = Gaussian3dOptimizer::<AB>::default();

        let loss = scene.positions.val().sum()
            + scene.scalings.val().sum()
            + scene.rotations.val().sum()
            + scene.opacities.val().sum()
            + scene.colors_sh_dc.val().sum()
            + scene.colors_sh_rest.val().sum();
        let mut grads = loss.backward();
        optimizer.accumulate(&scene, &mut grads).step(&mut scene).unwrap();

        optimizer.commit(Tensor::from_ints([1], &device), 2);

        optimizer.groups.iter().for_each(|group| {
            let record = group.optimizer.record.as_ref().unwrap();
            assert_eq!(record.moment_1.dims()[0], 3, "{:?}", group.group);
            assert_eq!(record.moment_2.dims()[0], 3, "{:?}", group.group);
        });
    }
}
