pub use super::Backend;
pub use crate::scene::point::{Point, Points};

use crate::{
    scene::gaussian_3d::{Gaussian3dScene, Param, Tensor, TensorData},
    spherical_harmonics::{SH_COEF, SH_COUNT_MAX},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use std::{f64::consts::PI, fmt};

/// The seed of random initialization.
pub const SEED: u64 = 0x3D65;

#[derive(Clone, PartialEq)]
pub struct Gaussian3dSceneConfig<B: Backend> {
    pub device: B::Device,
    pub points: Points,
}

impl<B: Backend> Gaussian3dSceneConfig<B> {
    /// Uniformly random points within `[-extent, extent]^3`.
    pub fn random(
        device: B::Device,
        point_count: usize,
        extent: f64,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let points = (0..point_count)
            .map(|_| Point {
                color_rgb: [rng.gen(), rng.gen(), rng.gen()],
                position: [
                    rng.gen_range(-extent..=extent),
                    rng.gen_range(-extent..=extent),
                    rng.gen_range(-extent..=extent),
                ],
            })
            .collect();

        Self { device, points }
    }
}

impl<B: Backend> fmt::Debug for Gaussian3dSceneConfig<B> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("Gaussian3dSceneConfig")
            .field("device", &self.device)
            .field("points.len()", &self.points.len())
            .finish()
    }
}

impl<B: Backend> Default for Gaussian3dSceneConfig<B> {
    fn default() -> Self {
        Self {
            device: Default::default(),
            points: vec![Default::default()],
        }
    }
}

impl<B: Backend> From<Gaussian3dSceneConfig<B>> for Gaussian3dScene<B> {
    fn from(config: Gaussian3dSceneConfig<B>) -> Self {
        let device = config.device;
        // P
        let point_count = config.points.len();
        let mut rng = StdRng::seed_from_u64(SEED);

        #[cfg(debug_assertions)]
        log::debug!(
            target: "gausplat::trainer::scene",
            "Gaussian3dScene::from > point_count ({point_count})",
        );

        // ([P, 3], [P, 3])
        let (colors_rgb, positions) = config.points.into_iter().fold(
            (
                Vec::with_capacity(point_count * 3),
                Vec::with_capacity(point_count * 3),
            ),
            |(mut colors_rgb, mut positions), point| {
                colors_rgb.extend(point.color_rgb.map(|c| c as f32));
                positions.extend(point.position.map(|c| c as f32));
                (colors_rgb, positions)
            },
        );

        // [P, 3]
        let colors_sh_dc = colors_rgb
            .into_iter()
            .map(|c| ((c as f64 - 0.5) / SH_COEF.0[0]) as f32)
            .collect::<Vec<_>>();

        // [P, (M - 1) * 3]
        let colors_sh_rest = vec![0.0; point_count * (SH_COUNT_MAX - 1) * 3];

        // [P, 1]
        let opacities = vec![Self::make_inner_opacity(0.1) as f32; point_count];

        // [P, 4] (x, y, z, w)
        let rotations = (0..point_count)
            .flat_map(|_| random_rotation(&mut rng))
            .collect::<Vec<_>>();

        // [P, 3]
        let scalings = {
            // Log-normal with the standard deviation `e`
            let samples = StandardNormal
                .sample_iter(&mut rng)
                .take(point_count)
                .map(|sample: f64| (sample * std::f64::consts::E).exp().max(f64::EPSILON))
                .collect::<Vec<_>>();
            let sample_max = samples.iter().copied().fold(f64::EPSILON, f64::max);

            samples
                .into_iter()
                .flat_map(|sample| {
                    let scaling = (sample / sample_max).sqrt().max(f64::EPSILON);
                    [scaling.ln() as f32; 3]
                })
                .collect::<Vec<_>>()
        };

        Self {
            colors_sh_dc: param(colors_sh_dc, [point_count, 3], &device),
            colors_sh_rest: param(
                colors_sh_rest,
                [point_count, (SH_COUNT_MAX - 1) * 3],
                &device,
            ),
            opacities: param(opacities, [point_count, 1], &device),
            positions: param(positions, [point_count, 3], &device),
            rotations: param(rotations, [point_count, 4], &device),
            scalings: param(scalings, [point_count, 3], &device),
        }
    }
}

impl<B: Backend> Gaussian3dScene<B> {
    /// The logit of `opacity`.
    #[inline]
    fn make_inner_opacity(opacity: f64) -> f64 {
        (opacity / (1.0 - opacity)).ln()
    }
}

/// A lazily initialized parameter from host values.
fn param<B: Backend>(
    values: Vec<f32>,
    shape: [usize; 2],
    device: &B::Device,
) -> Param<Tensor<B, 2>> {
    Param::uninitialized(
        Default::default(),
        move |device, is_require_grad| {
            Tensor::from_data(
                TensorData::new(values.to_owned(), shape).convert::<B::FloatElem>(),
                device,
            )
            .set_require_grad(is_require_grad)
        },
        device.to_owned(),
        true,
    )
}

/// A uniformly random unit quaternion in scalar-last order.
fn random_rotation(rng: &mut impl Rng) -> [f32; 4] {
    let u = rng.gen::<f64>();
    let v = rng.gen::<f64>();
    let w = rng.gen::<f64>();
    let (a, b) = ((1.0 - u).sqrt(), u.sqrt());

    [
        a * (2.0 * PI * v).sin(),
        a * (2.0 * PI * v).cos(),
        b * (2.0 * PI * w).sin(),
        b * (2.0 * PI * w).cos(),
    ]
    .map(|c| c as f32)
}

#[cfg(test)]
mod tests {
    #[test]
    fn scene_from_config_shapes() {
        use super::*;

        let device = Default::default();
        let points = vec![
            Point {
                color_rgb: [1.0, 0.5, 0.0],
                position: [0.0, -0.5, 0.2],
            },
            Point {
                color_rgb: [0.5, 1.0, 0.2],
                position: [1.0, 0.0, -0.3],
            },
        ];

        let config = Gaussian3dSceneConfig::<burn::backend::NdArray> { device, points };

        let scene = Gaussian3dScene::from(config);

        assert_eq!(scene.point_count(), 2);
        assert_eq!(scene.colors_sh_dc.dims(), [2, 3]);
        assert_eq!(scene.colors_sh_rest.dims(), [2, 45]);
        assert_eq!(scene.opacities.dims(), [2, 1]);
        assert_eq!(scene.positions.dims(), [2, 3]);
        assert_eq!(scene.rotations.dims(), [2, 4]);
        assert_eq!(scene.scalings.dims(), [2, 3]);
    }

    #[test]
    fn scene_from_config_values() {
        use super::*;
        use burn::backend::NdArray;

        let device = Default::default();
        let points = vec![Point {
            color_rgb: [1.0, 0.5, 0.0],
            position: [0.0, -0.5, 0.2],
        }];
        let scene = Gaussian3dScene::from(Gaussian3dSceneConfig::<NdArray> { device, points });

        // The colors are recovered by the SH of degree 0 with the offset.
        let colors_rgb = scene.get_colors_sh_dc().mul_scalar(SH_COEF.0[0]).add_scalar(0.5);
        colors_rgb.into_data().assert_approx_eq(
            &Tensor::<NdArray, 2>::from_floats([[1.0, 0.5, 0.0]], &device).into_data(),
            5,
        );
        scene.get_opacities().into_data().assert_approx_eq(
            &Tensor::<NdArray, 2>::from_floats([[0.1]], &device).into_data(),
            5,
        );
        scene.get_positions().into_data().assert_approx_eq(
            &Tensor::<NdArray, 2>::from_floats([[0.0, -0.5, 0.2]], &device).into_data(),
            6,
        );

        let rotation_norm = scene.rotations.val().powf_scalar(2.0).sum().into_scalar();
        assert!((rotation_norm - 1.0).abs() < 1e-5);

        let scalings = scene.get_scalings().into_data().to_vec::<f32>().unwrap();
        assert!(scalings.iter().all(|s| *s > 0.0 && *s <= 1.0));
    }

    #[test]
    fn random_config() {
        use super::*;
        use burn::backend::NdArray;

        let config = Gaussian3dSceneConfig::<NdArray>::random(Default::default(), 100, 2.0, SEED);
        assert_eq!(config.points.len(), 100);
        assert!(config
            .points
            .iter()
            .all(|p| p.position.iter().all(|c| c.abs() <= 2.0)
                && p.color_rgb.iter().all(|c| (0.0..1.0).contains(c))));

        let other = Gaussian3dSceneConfig::<NdArray>::random(Default::default(), 100, 2.0, SEED);
        assert_eq!(config.points, other.points);

        let scene = Gaussian3dScene::from(config);
        assert_eq!(scene.point_count(), 100);
    }
}
