//! Spherical harmonics.

use burn::tensor::{backend::Backend, Tensor};
use std::{f64::consts::PI, sync::LazyLock};

/// The count of spherical harmonics coefficients
pub const SH_COUNT_MAX: usize = sh_count(SH_DEGREE_MAX);

/// The maximum degree of spherical harmonics
pub const SH_DEGREE_MAX: u32 = 3;

/// The real coefficients of orthonormalized spherical harmonics from degree 0 to 3
///
/// ## Examples
///
/// ```rust
/// use gausplat_trainer::spherical_harmonics::SH_COEF;
///
/// assert_eq!(SH_COEF.0[0], 0.28209479177387814);
/// assert_eq!(SH_COEF.1[1], 0.4886025119029199);
/// assert_eq!(SH_COEF.2[2], 0.31539156525252005);
/// assert_eq!(SH_COEF.3[3 + 2], 1.445305721320277);
/// ```
#[allow(clippy::type_complexity)]
pub static SH_COEF: LazyLock<([f64; 1], [f64; 3], [f64; 5], [f64; 7])> =
    LazyLock::new(|| {
        (
            [(1.0 / 4.0 / PI).sqrt()],
            [
                -(3.0 / 4.0 / PI).sqrt(),
                (3.0 / 4.0 / PI).sqrt(),
                -(3.0 / 4.0 / PI).sqrt(),
            ],
            [
                (15.0 / 4.0 / PI).sqrt(),
                -(15.0 / 4.0 / PI).sqrt(),
                (5.0 / 16.0 / PI).sqrt(),
                -(15.0 / 4.0 / PI).sqrt(),
                (15.0 / 16.0 / PI).sqrt(),
            ],
            [
                -(35.0 / 32.0 / PI).sqrt(),
                (105.0 / 4.0 / PI).sqrt(),
                -(21.0 / 32.0 / PI).sqrt(),
                (7.0 / 16.0 / PI).sqrt(),
                -(21.0 / 32.0 / PI).sqrt(),
                (105.0 / 16.0 / PI).sqrt(),
                -(35.0 / 32.0 / PI).sqrt(),
            ],
        )
    });

/// The count of coefficients used up to `degree`, i.e., `(degree + 1)^2`.
#[inline]
pub const fn sh_count(degree: u32) -> usize {
    (degree as usize + 1).pow(2)
}

/// Evaluating view-dependent colors from SH coefficients.
///
/// ## Arguments
///
/// - `degree`: It should be no more than [`SH_DEGREE_MAX`].
/// - `directions`: `[P, 3]`, normalized viewing directions in world space.
/// - `colors_sh`: `[P, M, 3]`, `M` is at least `(degree + 1)^2`.
///
/// ## Returns
///
/// `[P, 3]`, the signed RGB values before offsetting.
pub fn evaluate<B: Backend>(
    degree: u32,
    directions: Tensor<B, 2>,
    colors_sh: Tensor<B, 3>,
) -> Tensor<B, 2> {
    debug_assert!(degree <= SH_DEGREE_MAX, "degree should be no more than {SH_DEGREE_MAX}");

    let [point_count, coef_count, _] = colors_sh.dims();
    let sh_count = sh_count(degree).min(coef_count);

    // [P, K]
    let bases = Tensor::cat(bases(degree, directions), 1);
    // [P, K, 3]
    let colors_sh = colors_sh.slice([0..point_count, 0..sh_count, 0..3]);

    (bases.unsqueeze_dim::<3>(2) * colors_sh)
        .sum_dim(1)
        .reshape([point_count, 3])
}

/// `[P, 1]` of each basis up to `degree`
fn bases<B: Backend>(
    degree: u32,
    directions: Tensor<B, 2>,
) -> Vec<Tensor<B, 2>> {
    let [point_count, _] = directions.dims();
    let device = directions.device();
    let (c0, c1, c2, c3) = *SH_COEF;

    let mut bases = Vec::with_capacity(sh_count(degree));
    bases.push(Tensor::full([point_count, 1], c0[0], &device));
    if degree < 1 {
        return bases;
    }

    let x = directions.to_owned().slice([0..point_count, 0..1]);
    let y = directions.to_owned().slice([0..point_count, 1..2]);
    let z = directions.slice([0..point_count, 2..3]);

    bases.push(y.to_owned().mul_scalar(c1[0]));
    bases.push(z.to_owned().mul_scalar(c1[1]));
    bases.push(x.to_owned().mul_scalar(c1[2]));
    if degree < 2 {
        return bases;
    }

    let xx = x.to_owned() * x.to_owned();
    let yy = y.to_owned() * y.to_owned();
    let zz = z.to_owned() * z.to_owned();
    let xy = x.to_owned() * y.to_owned();
    let yz = y.to_owned() * z.to_owned();
    let xz = x.to_owned() * z.to_owned();

    bases.push(xy.to_owned().mul_scalar(c2[0]));
    bases.push(yz.mul_scalar(c2[1]));
    bases.push(
        (zz.to_owned().mul_scalar(2.0) - xx.to_owned() - yy.to_owned())
            .mul_scalar(c2[2]),
    );
    bases.push(xz.mul_scalar(c2[3]));
    bases.push((xx.to_owned() - yy.to_owned()).mul_scalar(c2[4]));
    if degree < 3 {
        return bases;
    }

    // 4 z^2 - x^2 - y^2
    let zz_4_xx_yy = zz.to_owned().mul_scalar(4.0) - xx.to_owned() - yy.to_owned();

    bases.push(
        (y.to_owned() * (xx.to_owned().mul_scalar(3.0) - yy.to_owned()))
            .mul_scalar(c3[0]),
    );
    bases.push((xy * z.to_owned()).mul_scalar(c3[1]));
    bases.push((y * zz_4_xx_yy.to_owned()).mul_scalar(c3[2]));
    bases.push(
        (z.to_owned()
            * (zz.mul_scalar(2.0)
                - xx.to_owned().mul_scalar(3.0)
                - yy.to_owned().mul_scalar(3.0)))
        .mul_scalar(c3[3]),
    );
    bases.push((x.to_owned() * zz_4_xx_yy).mul_scalar(c3[4]));
    bases.push((z * (xx.to_owned() - yy.to_owned())).mul_scalar(c3[5]));
    bases.push((x * (xx - yy.mul_scalar(3.0))).mul_scalar(c3[6]));

    bases
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn sh_count_by_degree() {
        assert_eq!(sh_count(0), 1);
        assert_eq!(sh_count(1), 4);
        assert_eq!(sh_count(2), 9);
        assert_eq!(sh_count(3), 16);
        assert_eq!(SH_COUNT_MAX, 16);
    }

    #[test]
    fn evaluate_degree_0_is_view_independent() {
        let device = Default::default();
        let colors_sh = Tensor::<NdArray<f32>, 3>::random(
            [4, SH_COUNT_MAX, 3],
            burn::tensor::Distribution::Default,
            &device,
        );
        let directions_1 = Tensor::<NdArray<f32>, 2>::from_floats(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.6, 0.8, 0.0]],
            &device,
        );
        let directions_2 = directions_1.to_owned().neg();

        let output_1 = evaluate(0, directions_1, colors_sh.to_owned());
        let output_2 = evaluate(0, directions_2, colors_sh.to_owned());
        let target = colors_sh
            .slice([0..4, 0..1, 0..3])
            .reshape([4, 3])
            .mul_scalar(SH_COEF.0[0]);

        output_1.to_owned().into_data().assert_approx_eq(&target.into_data(), 6);
        output_1.into_data().assert_approx_eq(&output_2.into_data(), 6);
    }

    #[test]
    fn evaluate_degree_1() {
        let device = Default::default();
        // Only the coefficient of `x` is set.
        let mut colors_sh = Tensor::<NdArray<f32>, 3>::zeros([1, SH_COUNT_MAX, 3], &device);
        colors_sh = colors_sh.slice_assign(
            [0..1, 3..4, 0..3],
            Tensor::from_floats([[[1.0, 2.0, 3.0]]], &device),
        );
        let directions =
            Tensor::<NdArray<f32>, 2>::from_floats([[1.0, 0.0, 0.0]], &device);

        let output = evaluate(1, directions.to_owned(), colors_sh.to_owned());
        let c = SH_COEF.1[2] as f32;
        let target =
            Tensor::<NdArray<f32>, 2>::from_floats([[c, 2.0 * c, 3.0 * c]], &device);
        output.into_data().assert_approx_eq(&target.into_data(), 5);

        // Degree 0 ignores the higher coefficients.
        let output = evaluate(0, directions, colors_sh);
        let target = Tensor::<NdArray<f32>, 2>::zeros([1, 3], &device);
        output.into_data().assert_approx_eq(&target.into_data(), 6);
    }

    #[test]
    fn evaluate_degree_3_shape() {
        let device = Default::default();
        let colors_sh = Tensor::<NdArray<f32>, 3>::ones([5, SH_COUNT_MAX, 3], &device);
        let directions =
            Tensor::<NdArray<f32>, 2>::from_floats([[0.0, 0.0, 1.0]; 5], &device);

        let output = evaluate(3, directions, colors_sh);
        assert_eq!(output.dims(), [5, 3]);
    }
}
