//! Camera transformations.
//!
//! All matrices are in **row-major order**, i.e., `M[row][col]`.

pub use super::Camera;

/// Identity matrix.
pub const IDENTITY: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Near clipping plane.
pub const Z_NEAR: f64 = 0.001;

/// Far clipping plane.
pub const Z_FAR: f64 = 1000.0;

/// The axis flip aligning the camera pose with the rasterizer convention,
/// i.e., `diag(1, -1, -1)`.
pub const AXIS_FLIP: [f64; 3] = [1.0, -1.0, -1.0];

impl Camera {
    /// Horizontal field of view in radians.
    ///
    /// `Fov_x = 2 * atan(I_x / (2 * F_x))`
    #[inline]
    pub fn field_of_view_x(&self) -> f64 {
        field_of_view(self.image_width as f64, self.focal_length_x)
    }

    /// Vertical field of view in radians.
    ///
    /// `Fov_y = 2 * atan(I_y / (2 * F_y))`
    #[inline]
    pub fn field_of_view_y(&self) -> f64 {
        field_of_view(self.image_height as f64, self.focal_length_y)
    }

    /// Position of the camera in world space.
    #[inline]
    pub fn view_position(&self) -> [f64; 3] {
        let m = &self.camera_to_world;
        [m[0][3], m[1][3], m[2][3]]
    }

    /// Affine transformation from world space to view space.
    ///
    /// # Format
    ///
    /// ```plaintext
    /// R_v = (R * diag(1, -1, -1))^T
    /// T_v = -R_v * T
    ///
    /// [R_v   | T_v]
    /// [...   | ...]
    /// [0 0 0 | 1  ]
    /// ```
    pub fn view_transform(&self) -> [[f64; 4]; 4] {
        let m = &self.camera_to_world;

        // R * diag(1, -1, -1)
        let mut rotation = [[0.0; 3]; 3];
        for (row, rotation_row) in rotation.iter_mut().enumerate() {
            for (col, value) in rotation_row.iter_mut().enumerate() {
                *value = m[row][col] * AXIS_FLIP[col];
            }
        }

        let translation = self.view_position();

        let mut view_transform = IDENTITY;
        for row in 0..3 {
            for col in 0..3 {
                // R_v = R^T
                view_transform[row][col] = rotation[col][row];
            }
            view_transform[row][3] = -(0..3)
                .map(|k| rotation[k][row] * translation[k])
                .sum::<f64>();
        }

        view_transform
    }
}

/// `2 * atan(size / (2 * focal_length))`
#[inline]
pub fn field_of_view(
    size: f64,
    focal_length: f64,
) -> f64 {
    2.0 * (size / (2.0 * focal_length)).atan()
}

/// Perspective projection matrix in OpenGL convention.
///
/// `z_near` and `z_far` should be positive and `z_near < z_far`.
pub fn projection_transform(
    z_near: f64,
    z_far: f64,
    field_of_view_x: f64,
    field_of_view_y: f64,
) -> [[f64; 4]; 4] {
    let top = z_near * (field_of_view_y / 2.0).tan();
    let bottom = -top;
    let right = z_near * (field_of_view_x / 2.0).tan();
    let left = -right;

    [
        [
            2.0 * z_near / (right - left),
            0.0,
            (right + left) / (right - left),
            0.0,
        ],
        [
            0.0,
            2.0 * z_near / (top - bottom),
            (top + bottom) / (top - bottom),
            0.0,
        ],
        [
            0.0,
            0.0,
            (z_far + z_near) / (z_far - z_near),
            -z_far * z_near / (z_far - z_near),
        ],
        [0.0, 0.0, 1.0, 0.0],
    ]
}

/// `lhs * rhs`
pub fn matmul(
    lhs: &[[f64; 4]; 4],
    rhs: &[[f64; 4]; 4],
) -> [[f64; 4]; 4] {
    let mut output = [[0.0; 4]; 4];
    for (row, output_row) in output.iter_mut().enumerate() {
        for (col, value) in output_row.iter_mut().enumerate() {
            *value = (0..4).map(|k| lhs[row][k] * rhs[k][col]).sum();
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_matrix_approx_eq(
        output: &[[f64; 4]; 4],
        target: &[[f64; 4]; 4],
    ) {
        for (output, target) in output.iter().flatten().zip(target.iter().flatten()) {
            assert!(
                (output - target).abs() < 1e-9,
                "{output:?} should be {target:?}",
            );
        }
    }

    #[test]
    fn view_transform_identity() {
        let camera = Camera::default();

        let target = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, -1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        assert_matrix_approx_eq(&camera.view_transform(), &target);
    }

    #[test]
    fn view_transform_inverts_pose() {
        let (sin, cos) = 0.3_f64.sin_cos();
        let camera = Camera {
            camera_to_world: [
                [cos, 0.0, sin, 1.5],
                [0.0, 1.0, 0.0, -2.0],
                [-sin, 0.0, cos, 0.25],
                [0.0, 0.0, 0.0, 1.0],
            ],
            ..Default::default()
        };
        let flip = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, -1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];

        // view * (pose * flip) = I
        let output = matmul(
            &camera.view_transform(),
            &matmul(&camera.camera_to_world, &flip),
        );
        assert_matrix_approx_eq(&output, &IDENTITY);

        // The camera position maps onto the view origin.
        let [x, y, z] = camera.view_position();
        let view = camera.view_transform();
        for row in view.iter().take(3) {
            let value = row[0] * x + row[1] * y + row[2] * z + row[3];
            assert!(value.abs() < 1e-9);
        }
    }

    #[test]
    fn field_of_view_from_intrinsics() {
        let camera = Camera {
            focal_length_x: 50.0,
            focal_length_y: 25.0,
            image_height: 50,
            image_width: 100,
            ..Default::default()
        };

        let target = std::f64::consts::FRAC_PI_2;
        assert!((camera.field_of_view_x() - target).abs() < 1e-12);
        assert!((camera.field_of_view_y() - target).abs() < 1e-12);
    }

    #[test]
    fn projection_transform_maps_clipping_planes() {
        let fov = std::f64::consts::FRAC_PI_2;
        let projection = projection_transform(Z_NEAR, Z_FAR, fov, fov);

        // NDC depth is about 0 on the near plane and about 1 on the far plane.
        let span = Z_FAR - Z_NEAR;
        for (z, target) in [(Z_NEAR, Z_NEAR / span), (Z_FAR, Z_FAR / span)] {
            let z_clip = projection[2][2] * z + projection[2][3];
            let w_clip = projection[3][2] * z;
            assert!((z_clip / w_clip - target).abs() < 1e-9);
        }

        // tan(Fov / 2) = 1
        assert!((projection[0][0] - 1.0).abs() < 1e-9);
        assert!((projection[1][1] - 1.0).abs() < 1e-9);
        assert_eq!(projection[0][2], 0.0);
        assert_eq!(projection[3], [0.0, 0.0, 1.0, 0.0]);
    }
}
