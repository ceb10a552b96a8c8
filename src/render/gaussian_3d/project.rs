//! Projecting the points onto the screen.

pub use super::*;

use crate::function::TensorFloatExtension;

/// $ c_f $
pub const FILTER_LOW_PASS: f64 = 0.3;

/// Points nearer than this depth in view space are culled.
pub const DEPTH_MIN: f64 = 0.01;

/// The bound of `P_v.xy / P_v.z` relative to `tan(Fov / 2)`.
pub const VIEW_BOUND_FACTOR: f64 = 1.3;

/// Inputs of [`project`].
#[derive(Clone, Debug)]
pub struct ProjectInput<B: Backend> {
    /// `F_x`
    pub focal_length_x: f64,
    /// `F_y`
    pub focal_length_y: f64,
    /// `I_y`
    pub image_height: u32,
    /// `I_x`
    pub image_width: u32,
    /// `[P, 3]`
    pub positions: Tensor<B, 2>,
    /// `C_x`
    pub principal_point_x: f64,
    /// `C_y`
    pub principal_point_y: f64,
    /// `[P, 4]`, normalized quaternions in scalar-last order.
    pub rotations: Tensor<B, 2>,
    /// The unit multiplied onto all scalings.
    pub scaling_unit: f64,
    /// `[P, 3]`, positive.
    pub scalings: Tensor<B, 2>,
    /// `[I_x / T_x, I_y / T_y, 1]`
    pub tile_bounds: [u32; 3],
    /// `[4, 4]`, projection times view transform.
    pub view_projection_transform: Tensor<B, 2>,
    /// `[4, 4]`, from world space to view space.
    pub view_transform: Tensor<B, 2>,
}

/// Outputs of [`project`].
#[derive(Clone, Debug)]
pub struct ProjectOutput<B: Backend> {
    /// `[P, 3]`, the upper triangle of the inverse 2D covariance.
    pub conics: Tensor<B, 2>,
    /// `[P]`
    pub depths: Tensor<B, 1>,
    /// `[P, 2]`
    pub positions_2d: Tensor<B, 2>,
    /// `[P]`, `0` means the point is culled.
    pub radii: Tensor<B, 1, Int>,
    /// `[P]`
    pub tile_touched_counts: Tensor<B, 1, Int>,
}

/// Projecting the points onto the screen.
///
/// For each one of the $ p $ points:
///
/// 1. Transform the position $ P $ into view space: $ P_v = M_v P $.
///    Cull it if $ P_v.z \le $ [`DEPTH_MIN`].
///
/// 2. Compute the 3D covariance $ \Sigma = (R_s S_s) (R_s S_s)^T $
///    from the rotation matrix $ R_s $ and the scaling matrix $ S_s $.
///
/// 3. Project it onto the screen with the Jacobian $ J $ of the perspective
///    projection and add the low-pass filter $ C_f $:
///    $ \Sigma^' = J R_v \Sigma (J R_v)^T + C_f I $.
///    Cull it if $ |\Sigma^'| \le 0 $.
///
/// 4. The conic is $ \Sigma^{'-1} $ and the radius is
///    $ r = \lceil 3 \sqrt{\lambda_{\max}} \rceil $.
///
/// 5. The 2D position comes from the view-projection transform, and the
///    touched tiles from the bounding box $ P^' \pm r $.
///    Cull it if no tile is touched.
pub fn project<B: Backend>(input: ProjectInput<B>) -> ProjectOutput<B> {
    #[cfg(debug_assertions)]
    log::debug!(target: "gausplat::trainer::render::project", "start");

    let device = input.positions.device();
    // P
    let point_count = input.positions.dims()[0];
    let p = point_count;
    let focal_length_x = input.focal_length_x;
    let focal_length_y = input.focal_length_y;
    // tan(Fov_x / 2) * 1.3
    let view_bound_x = input.image_width as f64 / focal_length_x / 2.0 * VIEW_BOUND_FACTOR;
    // tan(Fov_y / 2) * 1.3
    let view_bound_y = input.image_height as f64 / focal_length_y / 2.0 * VIEW_BOUND_FACTOR;

    // [P, 4]
    let positions_3d_homo =
        Tensor::cat(vec![input.positions, Tensor::ones([p, 1], &device)], 1);

    // Transforming the positions into view space

    // [P, 4]
    let positions_3d_in_view = positions_3d_homo
        .to_owned()
        .matmul(input.view_transform.to_owned().transpose());
    let x_v = positions_3d_in_view.to_owned().slice([0..p, 0..1]);
    let y_v = positions_3d_in_view.to_owned().slice([0..p, 1..2]);
    let depths = positions_3d_in_view.slice([0..p, 2..3]);
    let is_near = depths.to_owned().lower_equal_elem(DEPTH_MIN);
    let z_v = depths.to_owned().clamp_min(DEPTH_MIN);

    // Computing the 3D covariances

    // [P, 3, 3]
    let rotations_matrix = rotations_matrix(input.rotations);
    // [P, 1, 3]
    let scalings = input
        .scalings
        .mul_scalar(input.scaling_unit)
        .unsqueeze_dim::<3>(1);
    // [P, 3, 3]
    let transforms_3d = rotations_matrix * scalings;
    // [P, 3, 3]
    let covariances_3d = transforms_3d
        .to_owned()
        .matmul_batched(transforms_3d.transpose());

    // Projecting the 3D covariances onto the screen

    let z_v_recip = z_v.to_owned().recip();
    let z_v_recip_2 = z_v_recip.to_owned().powf_scalar(2.0);
    let t_x = (x_v / z_v.to_owned()).clamp(-view_bound_x, view_bound_x) * z_v.to_owned();
    let t_y = (y_v / z_v.to_owned()).clamp(-view_bound_y, view_bound_y) * z_v;
    let zeros = Tensor::<B, 2>::zeros([p, 1], &device);

    // [P, 2, 3]
    let jacobians = Tensor::cat(
        vec![
            z_v_recip.to_owned().mul_scalar(focal_length_x),
            zeros.to_owned(),
            (t_x * z_v_recip_2.to_owned()).mul_scalar(-focal_length_x),
            zeros,
            z_v_recip.mul_scalar(focal_length_y),
            (t_y * z_v_recip_2).mul_scalar(-focal_length_y),
        ],
        1,
    )
    .reshape([p, 2, 3]);
    // [3, 3]
    let rotation_view = input.view_transform.slice([0..3, 0..3]);
    // [P, 2, 3]
    let transforms_2d = jacobians
        .reshape([p * 2, 3])
        .matmul(rotation_view)
        .reshape([p, 2, 3]);
    // [P, 4] <- [P, 2, 2]
    let covariances_2d = transforms_2d
        .to_owned()
        .matmul_batched(covariances_3d)
        .matmul_batched(transforms_2d.transpose())
        .reshape([p, 4]);

    let cov_a = covariances_2d
        .to_owned()
        .slice([0..p, 0..1])
        .add_scalar(FILTER_LOW_PASS);
    let cov_b = covariances_2d.to_owned().slice([0..p, 1..2]);
    let cov_c = covariances_2d.slice([0..p, 3..4]).add_scalar(FILTER_LOW_PASS);
    let determinants = cov_a.to_owned() * cov_c.to_owned() - cov_b.to_owned().powf_scalar(2.0);
    let is_degenerate = determinants.to_owned().lower_equal_elem(0.0);
    let determinants_safe = determinants.to_owned().clamp_min(f32::EPSILON);

    // [P, 3]
    let conics = Tensor::cat(
        vec![
            cov_c.to_owned().div(determinants_safe.to_owned()),
            cov_b.neg().div(determinants_safe.to_owned()),
            cov_a.to_owned().div(determinants_safe),
        ],
        1,
    );

    // Estimating the radii

    // [P, 1]
    let radii = {
        let middles = (cov_a.detach() + cov_c.detach()).mul_scalar(0.5);
        let lambdas = middles.to_owned()
            + (middles.powf_scalar(2.0) - determinants.detach())
                .clamp_min(0.1)
                .sqrt();
        lambdas.sqrt().mul_scalar(3.0).ceil()
    };

    // Projecting the positions onto the screen

    // [P, 4]
    let positions_clip =
        positions_3d_homo.matmul(input.view_projection_transform.transpose());
    let w_clip = positions_clip
        .to_owned()
        .slice([0..p, 3..4])
        .clamp_min(DEPTH_MIN);
    let positions_ndc = positions_clip.slice([0..p, 0..2]) / w_clip;
    let x_ndc = positions_ndc.to_owned().slice([0..p, 0..1]);
    let y_ndc = positions_ndc.slice([0..p, 1..2]);

    // [P, 2]
    let positions_2d = Tensor::cat(
        vec![
            x_ndc
                .mul_scalar(input.image_width as f64 / 2.0)
                .add_scalar(input.principal_point_x),
            y_ndc
                .mul_scalar(input.image_height as f64 / 2.0)
                .add_scalar(input.principal_point_y),
        ],
        1,
    );

    // Computing the touched tiles

    // [P, 1]
    let tile_touched_counts = {
        let [tile_count_x, tile_count_y, _] = input.tile_bounds.map(|c| c as f64);
        let tile_size_x = TILE_SIZE_X as f64;
        let tile_size_y = TILE_SIZE_Y as f64;
        let positions_2d = positions_2d.to_owned().detach();
        let x = positions_2d.to_owned().slice([0..p, 0..1]);
        let y = positions_2d.slice([0..p, 1..2]);

        let x_min = (x.to_owned() - radii.to_owned())
            .div_scalar(tile_size_x)
            .floor()
            .clamp(0.0, tile_count_x);
        let x_max = (x + radii.to_owned())
            .add_scalar(tile_size_x - 1.0)
            .div_scalar(tile_size_x)
            .floor()
            .clamp(0.0, tile_count_x);
        let y_min = (y.to_owned() - radii.to_owned())
            .div_scalar(tile_size_y)
            .floor()
            .clamp(0.0, tile_count_y);
        let y_max = (y + radii.to_owned())
            .add_scalar(tile_size_y - 1.0)
            .div_scalar(tile_size_y)
            .floor()
            .clamp(0.0, tile_count_y);

        (x_max - x_min) * (y_max - y_min)
    };

    // Culling the points

    let is_culled = is_near
        .float()
        .add(is_degenerate.float())
        .add(tile_touched_counts.to_owned().lower_equal_elem(0.0).float())
        .greater_elem(0.0);
    let radii = radii.mask_fill(is_culled.to_owned(), 0.0).reshape([p]).int();
    let tile_touched_counts = tile_touched_counts
        .mask_fill(is_culled, 0.0)
        .reshape([p])
        .int();

    ProjectOutput {
        conics,
        depths: depths.reshape([p]),
        positions_2d,
        radii,
        tile_touched_counts,
    }
}

/// Converting normalized quaternions `[x, y, z, w]` into rotation matrices.
///
/// $$ R_s = 2 \cdot \begin{bmatrix}
///  \- y^2 - z^2 + \frac{1}{2} & x y - w z & x z + w y
/// \\\ x y + w z & - x^2 - z^2 + \frac{1}{2} & y z - w x
/// \\\ x z - w y & y z + w x & - x^2 - y^2 + \frac{1}{2}
/// \end{bmatrix} $$
///
/// The shape is `[P, 3, 3]`.
pub fn rotations_matrix<B: Backend>(rotations: Tensor<B, 2>) -> Tensor<B, 3> {
    let p = rotations.dims()[0];
    let x = rotations.to_owned().slice([0..p, 0..1]);
    let y = rotations.to_owned().slice([0..p, 1..2]);
    let z = rotations.to_owned().slice([0..p, 2..3]);
    let w = rotations.slice([0..p, 3..4]);

    let xx = x.to_owned() * x.to_owned();
    let yy = y.to_owned() * y.to_owned();
    let zz = z.to_owned() * z.to_owned();
    let xy = x.to_owned() * y.to_owned();
    let xz = x.to_owned() * z.to_owned();
    let yz = y.to_owned() * z.to_owned();
    let wx = w.to_owned() * x;
    let wy = w.to_owned() * y;
    let wz = w * z;

    Tensor::cat(
        vec![
            (yy.to_owned() + zz.to_owned()).neg().add_scalar(0.5),
            xy.to_owned() - wz.to_owned(),
            xz.to_owned() + wy.to_owned(),
            xy + wz,
            (xx.to_owned() + zz).neg().add_scalar(0.5),
            yz.to_owned() - wx.to_owned(),
            xz - wy,
            yz + wx,
            (xx + yy).neg().add_scalar(0.5),
        ],
        1,
    )
    .mul_scalar(2.0)
    .reshape([p, 3, 3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn rotations_matrix_identity_and_half_turn() {
        let device = Default::default();
        let rotations = Tensor::<NdArray, 2>::from_floats(
            [[0.0, 0.0, 0.0, 1.0], [0.0, 0.0, 1.0, 0.0]],
            &device,
        );

        let output = rotations_matrix(rotations);
        let target = Tensor::<NdArray, 3>::from_floats(
            [
                [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]],
            ],
            &device,
        );
        output.into_data().assert_approx_eq(&target.into_data(), 6);
    }
}
