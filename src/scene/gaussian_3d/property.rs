//! 3DGS scene property implementation.

pub use super::*;

use crate::{function::TensorFloatExtension, spherical_harmonics::SH_COUNT_MAX};
use burn::tensor::activation;
use humansize::{format_size, BINARY};

/// Outer property value getters
impl<B: Backend> Gaussian3dScene<B> {
    /// Colors in SH space. (Outer value)
    ///
    /// The shape is `[P, M, 3]`, which is the concatenation of
    /// [`Self::get_colors_sh_dc`] and [`Self::get_colors_sh_rest`].
    /// - `P` is [`Self::point_count`].
    /// - `M` is [`SH_COUNT_MAX`].
    #[inline]
    pub fn get_colors_sh(&self) -> Tensor<B, 3> {
        let point_count = self.point_count();
        Tensor::cat(vec![self.get_colors_sh_dc(), self.get_colors_sh_rest()], 1)
            .reshape([point_count, SH_COUNT_MAX, 3])
    }

    /// Colors in SH space of degree 0. (Outer value)
    ///
    /// The shape is `[P, 3]`.
    #[inline]
    pub fn get_colors_sh_dc(&self) -> Tensor<B, 2> {
        Self::make_colors_sh_dc(self.colors_sh_dc.val())
    }

    /// Colors in SH space of degree 1 and higher. (Outer value)
    ///
    /// The shape is `[P, (M - 1) * 3]`.
    #[inline]
    pub fn get_colors_sh_rest(&self) -> Tensor<B, 2> {
        Self::make_colors_sh_rest(self.colors_sh_rest.val())
    }

    /// Opacities. (Outer value)
    ///
    /// The shape is `[P, 1]`.
    ///
    /// They range from `0.0` to `1.0`.
    #[inline]
    pub fn get_opacities(&self) -> Tensor<B, 2> {
        Self::make_opacities(self.opacities.val())
    }

    /// 3D Positions. (Outer value)
    ///
    /// The shape is `[P, 3]`.
    #[inline]
    pub fn get_positions(&self) -> Tensor<B, 2> {
        Self::make_positions(self.positions.val())
    }

    /// Rotations. (Outer value)
    ///
    /// The shape is `[P, 4]`.
    ///
    /// They are represented as normalized Hamilton quaternions in scalar-last order,
    /// i.e., `[x, y, z, w]`.
    #[inline]
    pub fn get_rotations(&self) -> Tensor<B, 2> {
        Self::make_rotations(self.rotations.val())
    }

    /// 3D scalings. (Outer value)
    ///
    /// The shape is `[P, 3]`.
    ///
    /// They are positive.
    #[inline]
    pub fn get_scalings(&self) -> Tensor<B, 2> {
        Self::make_scalings(self.scalings.val())
    }
}

/// Outer property value makers
impl<B: Backend> Gaussian3dScene<B> {
    /// Making values for [`Gaussian3dScene::get_colors_sh_dc`]
    #[inline]
    pub fn make_colors_sh_dc(colors_sh_dc: Tensor<B, 2>) -> Tensor<B, 2> {
        colors_sh_dc
    }

    /// Making values for [`Gaussian3dScene::get_colors_sh_rest`]
    #[inline]
    pub fn make_colors_sh_rest(colors_sh_rest: Tensor<B, 2>) -> Tensor<B, 2> {
        colors_sh_rest
    }

    /// Making values for [`Gaussian3dScene::get_opacities`]
    #[inline]
    pub fn make_opacities(opacities: Tensor<B, 2>) -> Tensor<B, 2> {
        activation::sigmoid(opacities)
    }

    /// Making values for [`Gaussian3dScene::get_positions`]
    #[inline]
    pub fn make_positions(positions: Tensor<B, 2>) -> Tensor<B, 2> {
        positions
    }

    /// Making values for [`Gaussian3dScene::get_rotations`]
    #[inline]
    pub fn make_rotations(rotations: Tensor<B, 2>) -> Tensor<B, 2> {
        rotations.normalize_dim(1)
    }

    /// Making values for [`Gaussian3dScene::get_scalings`]
    #[inline]
    pub fn make_scalings(scalings: Tensor<B, 2>) -> Tensor<B, 2> {
        scalings.exp()
    }
}

/// Outer property value setters
impl<B: Backend> Gaussian3dScene<B> {
    /// Setting values for [`Gaussian3dScene::get_colors_sh_dc`]
    pub fn set_colors_sh_dc(
        &mut self,
        colors_sh_dc: Tensor<B, 2>,
    ) -> &mut Self {
        self.set_inner_colors_sh_dc(Self::make_inner_colors_sh_dc(colors_sh_dc))
    }

    /// Setting values for [`Gaussian3dScene::get_colors_sh_rest`]
    pub fn set_colors_sh_rest(
        &mut self,
        colors_sh_rest: Tensor<B, 2>,
    ) -> &mut Self {
        self.set_inner_colors_sh_rest(Self::make_inner_colors_sh_rest(colors_sh_rest))
    }

    /// Setting values for [`Gaussian3dScene::get_opacities`]
    pub fn set_opacities(
        &mut self,
        opacities: Tensor<B, 2>,
    ) -> &mut Self {
        self.set_inner_opacities(Self::make_inner_opacities(opacities))
    }

    /// Setting values for [`Gaussian3dScene::get_positions`]
    pub fn set_positions(
        &mut self,
        positions: Tensor<B, 2>,
    ) -> &mut Self {
        self.set_inner_positions(Self::make_inner_positions(positions))
    }

    /// Setting values for [`Gaussian3dScene::get_rotations`]
    pub fn set_rotations(
        &mut self,
        rotations: Tensor<B, 2>,
    ) -> &mut Self {
        self.set_inner_rotations(Self::make_inner_rotations(rotations))
    }

    /// Setting values for [`Gaussian3dScene::get_scalings`]
    pub fn set_scalings(
        &mut self,
        scalings: Tensor<B, 2>,
    ) -> &mut Self {
        self.set_inner_scalings(Self::make_inner_scalings(scalings))
    }
}

/// Inner property value makers
impl<B: Backend> Gaussian3dScene<B> {
    /// Making values for [`Gaussian3dScene::colors_sh_dc`]
    #[inline]
    pub fn make_inner_colors_sh_dc(colors_sh_dc: Tensor<B, 2>) -> Tensor<B, 2> {
        colors_sh_dc
    }

    /// Making values for [`Gaussian3dScene::colors_sh_rest`]
    #[inline]
    pub fn make_inner_colors_sh_rest(colors_sh_rest: Tensor<B, 2>) -> Tensor<B, 2> {
        colors_sh_rest
    }

    /// Making values for [`Gaussian3dScene::opacities`]
    #[inline]
    pub fn make_inner_opacities(opacities: Tensor<B, 2>) -> Tensor<B, 2> {
        opacities.to_owned().div(-opacities + 1.0).log()
    }

    /// Making values for [`Gaussian3dScene::positions`]
    #[inline]
    pub fn make_inner_positions(positions: Tensor<B, 2>) -> Tensor<B, 2> {
        positions
    }

    /// Making values for [`Gaussian3dScene::rotations`]
    ///
    /// Rotations are normalized on every use, so any positive multiple is kept as is.
    #[inline]
    pub fn make_inner_rotations(rotations: Tensor<B, 2>) -> Tensor<B, 2> {
        rotations
    }

    /// Making values for [`Gaussian3dScene::scalings`]
    #[inline]
    pub fn make_inner_scalings(scalings: Tensor<B, 2>) -> Tensor<B, 2> {
        scalings.log()
    }
}

/// Inner property value setters
impl<B: Backend> Gaussian3dScene<B> {
    /// Setting inner values for [`Gaussian3dScene::colors_sh_dc`]
    #[inline]
    pub fn set_inner_colors_sh_dc(
        &mut self,
        colors_sh_dc: Tensor<B, 2>,
    ) -> &mut Self {
        self.colors_sh_dc = Param::initialized(self.colors_sh_dc.id.to_owned(), colors_sh_dc);
        self
    }

    /// Setting inner values for [`Gaussian3dScene::colors_sh_rest`]
    #[inline]
    pub fn set_inner_colors_sh_rest(
        &mut self,
        colors_sh_rest: Tensor<B, 2>,
    ) -> &mut Self {
        self.colors_sh_rest =
            Param::initialized(self.colors_sh_rest.id.to_owned(), colors_sh_rest);
        self
    }

    /// Setting inner values for [`Gaussian3dScene::opacities`]
    #[inline]
    pub fn set_inner_opacities(
        &mut self,
        opacities: Tensor<B, 2>,
    ) -> &mut Self {
        self.opacities = Param::initialized(self.opacities.id.to_owned(), opacities);
        self
    }

    /// Setting inner values for [`Gaussian3dScene::positions`]
    #[inline]
    pub fn set_inner_positions(
        &mut self,
        positions: Tensor<B, 2>,
    ) -> &mut Self {
        self.positions = Param::initialized(self.positions.id.to_owned(), positions);
        self
    }

    /// Setting inner values for [`Gaussian3dScene::rotations`]
    #[inline]
    pub fn set_inner_rotations(
        &mut self,
        rotations: Tensor<B, 2>,
    ) -> &mut Self {
        self.rotations = Param::initialized(self.rotations.id.to_owned(), rotations);
        self
    }

    /// Setting inner values for [`Gaussian3dScene::scalings`]
    #[inline]
    pub fn set_inner_scalings(
        &mut self,
        scalings: Tensor<B, 2>,
    ) -> &mut Self {
        self.scalings = Param::initialized(self.scalings.id.to_owned(), scalings);
        self
    }
}

/// Attribute getters
impl<B: Backend> Gaussian3dScene<B> {
    /// The device.
    #[inline]
    pub fn device(&self) -> B::Device {
        self.positions.device()
    }

    /// Number of points.
    #[inline]
    pub fn point_count(&self) -> usize {
        let point_count_target = self.positions.dims()[0];
        let point_count_other = self.colors_sh_dc.dims()[0];
        debug_assert_eq!(point_count_other, point_count_target);
        let point_count_other = self.colors_sh_rest.dims()[0];
        debug_assert_eq!(point_count_other, point_count_target);
        let point_count_other = self.opacities.dims()[0];
        debug_assert_eq!(point_count_other, point_count_target);
        let point_count_other = self.rotations.dims()[0];
        debug_assert_eq!(point_count_other, point_count_target);
        let point_count_other = self.scalings.dims()[0];
        debug_assert_eq!(point_count_other, point_count_target);

        point_count_target
    }

    /// Size of the parameters in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.num_params() * size_of::<B::FloatElem>()
    }

    /// Readable size of the parameters.
    #[inline]
    pub fn size_readable(&self) -> String {
        format_size(self.size(), BINARY.decimal_places(1))
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn set_outer_property() {
        use super::*;
        use burn::{backend::NdArray, tensor::Distribution};

        let device = Default::default();

        let input_colors_sh_dc =
            Tensor::<NdArray<f32>, 2>::random([10, 3], Distribution::Default, &device);
        let input_colors_sh_rest =
            Tensor::<NdArray<f32>, 2>::random([10, 45], Distribution::Default, &device);
        let input_opacities = Tensor::<NdArray<f32>, 2>::random(
            [10, 1],
            Distribution::Uniform(0.05, 0.95),
            &device,
        );
        let input_positions =
            Tensor::<NdArray<f32>, 2>::random([10, 3], Distribution::Default, &device);
        let input_rotations = Tensor::<NdArray<f32>, 2>::ones([10, 4], &device);
        let input_scalings =
            Tensor::<NdArray<f32>, 2>::random([10, 3], Distribution::Default, &device)
                .add_scalar(1.0);

        let mut scene = Gaussian3dScene::<NdArray<f32>>::default();

        scene
            .set_colors_sh_dc(input_colors_sh_dc.to_owned())
            .set_colors_sh_rest(input_colors_sh_rest.to_owned())
            .set_opacities(input_opacities.to_owned())
            .set_positions(input_positions.to_owned())
            .set_rotations(input_rotations.to_owned())
            .set_scalings(input_scalings.to_owned());

        assert_eq!(scene.point_count(), 10);
        assert_eq!(scene.get_colors_sh().dims(), [10, SH_COUNT_MAX, 3]);

        input_colors_sh_dc
            .to_owned()
            .into_data()
            .assert_approx_eq(&scene.get_colors_sh_dc().into_data(), 6);
        input_colors_sh_dc.into_data().assert_approx_eq(
            &scene
                .get_colors_sh()
                .slice([0..10, 0..1, 0..3])
                .reshape([10, 3])
                .into_data(),
            6,
        );
        input_colors_sh_rest
            .into_data()
            .assert_approx_eq(&scene.get_colors_sh_rest().into_data(), 6);
        input_opacities
            .into_data()
            .assert_approx_eq(&scene.get_opacities().into_data(), 5);
        input_positions
            .into_data()
            .assert_approx_eq(&scene.get_positions().into_data(), 6);
        Tensor::<NdArray<f32>, 2>::full([10, 4], 0.5, &device)
            .into_data()
            .assert_approx_eq(&scene.get_rotations().into_data(), 6);
        input_scalings
            .into_data()
            .assert_approx_eq(&scene.get_scalings().into_data(), 5);
    }

    #[test]
    fn rotations_are_scale_invariant() {
        use super::*;
        use burn::{backend::NdArray, tensor::Distribution};

        let device = Default::default();
        let rotations =
            Tensor::<NdArray<f32>, 2>::random([8, 4], Distribution::Uniform(0.1, 1.0), &device);

        let mut scene = Gaussian3dScene::<NdArray<f32>>::default();
        let target = scene.set_rotations(rotations.to_owned()).get_rotations();
        let output = scene.set_rotations(rotations.mul_scalar(7.5)).get_rotations();

        output.into_data().assert_approx_eq(&target.into_data(), 5);
    }
}
