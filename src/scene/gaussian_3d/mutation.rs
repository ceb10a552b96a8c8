//! Structural mutation of the scene.
//!
//! Growing and shrinking the scene goes through a single [`Gaussian3dMutation`],
//! so every per-point array (parameters, optimizer moments and refinement
//! statistics) is remapped by the same retained indices and appended count.

pub use super::*;

use crate::spherical_harmonics::SH_COUNT_MAX;

/// Inner parameter values of some points.
#[derive(Clone, Debug)]
pub struct Gaussian3dPoints<B: Backend> {
    /// `[P, 3]`
    pub colors_sh_dc: Tensor<B, 2>,
    /// `[P, 45]`
    pub colors_sh_rest: Tensor<B, 2>,
    /// `[P, 1]`
    pub opacities: Tensor<B, 2>,
    /// `[P, 3]`
    pub positions: Tensor<B, 2>,
    /// `[P, 4]`
    pub rotations: Tensor<B, 2>,
    /// `[P, 3]`
    pub scalings: Tensor<B, 2>,
}

/// A mutation of the point set.
///
/// The points after committing are the retained ones (in the order of
/// [`Self::retained`]) followed by the appended ones.
#[derive(Clone, Debug)]
pub struct Gaussian3dMutation<B: Backend> {
    /// `[R]`
    pub retained: Tensor<B, 1, Int>,
    /// `[A, *]`
    pub appended: Option<Gaussian3dPoints<B>>,
}

impl<B: Backend> Gaussian3dPoints<B> {
    /// Number of points.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.positions.dims()[0]
    }

    /// Checking that all arrays share the point count and have the expected widths.
    pub fn validate(&self) -> Result<&Self, Error> {
        let point_count = self.point_count();
        let shapes = [
            (self.colors_sh_dc.dims(), 3),
            (self.colors_sh_rest.dims(), (SH_COUNT_MAX - 1) * 3),
            (self.opacities.dims(), 1),
            (self.positions.dims(), 3),
            (self.rotations.dims(), 4),
            (self.scalings.dims(), 3),
        ];

        for (dims, width) in shapes {
            if dims != [point_count, width] {
                return Err(Error::MismatchedShape(
                    dims.to_vec(),
                    vec![point_count, width],
                ));
            }
        }

        Ok(self)
    }
}

impl<B: Backend> Gaussian3dMutation<B> {
    /// Retaining the points at `retained` without appending.
    #[inline]
    pub fn retain(retained: Tensor<B, 1, Int>) -> Self {
        Self {
            retained,
            appended: None,
        }
    }

    /// Retaining all of the `point_count` points.
    #[inline]
    pub fn retain_all(
        point_count: usize,
        device: &B::Device,
    ) -> Self {
        Self::retain(Tensor::arange(0..point_count as i64, device))
    }

    /// Appending `points` after the retained ones.
    #[inline]
    pub fn with_appended(
        mut self,
        points: Gaussian3dPoints<B>,
    ) -> Self {
        self.appended = Some(points);
        self
    }

    /// Number of retained points.
    #[inline]
    pub fn retained_count(&self) -> usize {
        self.retained.dims()[0]
    }

    /// Number of appended points.
    #[inline]
    pub fn appended_count(&self) -> usize {
        self.appended.as_ref().map_or(0, Gaussian3dPoints::point_count)
    }

    /// Number of points after committing.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.retained_count() + self.appended_count()
    }

    /// The retained indices on another backend.
    pub fn retained_on<B2: Backend>(
        &self,
        device: &B2::Device,
    ) -> Tensor<B2, 1, Int> {
        Tensor::from_data(
            self.retained.to_data().convert::<B2::IntElem>(),
            device,
        )
    }

    /// Checking the mutation against a point set of `point_count` points.
    pub fn validate(
        &self,
        point_count: usize,
    ) -> Result<&Self, Error> {
        for index in self.retained.to_data().iter::<i64>() {
            if index < 0 || index as usize >= point_count {
                return Err(Error::OutOfBound(index.max(0) as usize, point_count));
            }
        }
        if let Some(appended) = &self.appended {
            appended.validate()?;
        }

        Ok(self)
    }
}

impl<B: Backend> Gaussian3dScene<B> {
    /// Inner values of all points.
    pub fn points(&self) -> Gaussian3dPoints<B> {
        Gaussian3dPoints {
            colors_sh_dc: self.colors_sh_dc.val(),
            colors_sh_rest: self.colors_sh_rest.val(),
            opacities: self.opacities.val(),
            positions: self.positions.val(),
            rotations: self.rotations.val(),
            scalings: self.scalings.val(),
        }
    }

    /// Committing the mutation to all parameters at once.
    ///
    /// The parameters become new leaves, keeping their IDs.
    pub fn commit(
        &mut self,
        mutation: &Gaussian3dMutation<B>,
    ) -> Result<&mut Self, Error> {
        mutation.validate(self.point_count())?;

        let points = self.points();
        let appended = mutation.appended.to_owned();
        // Detached tensors keep tracking on autodiff backends, so the
        // remapped values are untracked before becoming new leaves.
        let remap = |value: Tensor<B, 2>, appended: Option<Tensor<B, 2>>| {
            let value = value
                .select(0, mutation.retained.to_owned())
                .detach()
                .set_require_grad(false);
            let value = match appended {
                Some(appended) => Tensor::cat(
                    vec![value, appended.detach().set_require_grad(false)],
                    0,
                ),
                None => value,
            };
            value.require_grad()
        };

        self.set_inner_colors_sh_dc(remap(
            points.colors_sh_dc,
            appended.as_ref().map(|a| a.colors_sh_dc.to_owned()),
        ))
        .set_inner_colors_sh_rest(remap(
            points.colors_sh_rest,
            appended.as_ref().map(|a| a.colors_sh_rest.to_owned()),
        ))
        .set_inner_opacities(remap(
            points.opacities,
            appended.as_ref().map(|a| a.opacities.to_owned()),
        ))
        .set_inner_positions(remap(
            points.positions,
            appended.as_ref().map(|a| a.positions.to_owned()),
        ))
        .set_inner_rotations(remap(
            points.rotations,
            appended.as_ref().map(|a| a.rotations.to_owned()),
        ))
        .set_inner_scalings(remap(
            points.scalings,
            appended.as_ref().map(|a| a.scalings.to_owned()),
        ));

        #[cfg(debug_assertions)]
        log::debug!(
            target: "gausplat::trainer::scene",
            "Gaussian3dScene::commit > point_count ({})",
            self.point_count(),
        );

        Ok(self)
    }
}
