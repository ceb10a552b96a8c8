//! Camera and its scoped output resolution.

pub mod transform;

pub use transform::*;

use std::{fmt, ops};

/// A pinhole camera in 3D space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// Camera ID.
    pub camera_id: u32,
    /// Affine transformation from camera space to world space.
    ///
    /// It is in **row-major order**, i.e., `M[row][col]`.
    ///
    /// # Format
    ///
    /// ```plaintext
    /// [R     | T]
    /// [...   | .]
    /// [0 0 0 | 1]
    /// ```
    pub camera_to_world: [[f64; 4]; 4],
    /// Focal length along the horizontal axis in pixels.
    pub focal_length_x: f64,
    /// Focal length along the vertical axis in pixels.
    pub focal_length_y: f64,
    /// Image height.
    pub image_height: u32,
    /// Image width.
    pub image_width: u32,
    /// Horizontal principal point in pixels.
    pub principal_point_x: f64,
    /// Vertical principal point in pixels.
    pub principal_point_y: f64,
}

/// The intrinsics touched by [`Camera::scale_output_resolution`].
#[derive(Clone, Copy, Debug, PartialEq)]
struct Resolution {
    focal_length_x: f64,
    focal_length_y: f64,
    image_height: u32,
    image_width: u32,
    principal_point_x: f64,
    principal_point_y: f64,
}

/// A camera whose output resolution is scaled until the scope is dropped.
///
/// Dropping it restores the exact intrinsics the camera had before scaling.
pub struct CameraResolutionScope<'c> {
    camera: &'c mut Camera,
    resolution: Resolution,
}

impl Camera {
    /// Scaling the output resolution by `factor` within a scope.
    ///
    /// The focal lengths and principal point are scaled by `factor`,
    /// and the image size is floored to at least one pixel.
    pub fn scale_output_resolution(
        &mut self,
        factor: f64,
    ) -> CameraResolutionScope<'_> {
        let resolution = self.resolution();

        self.focal_length_x *= factor;
        self.focal_length_y *= factor;
        self.principal_point_x *= factor;
        self.principal_point_y *= factor;
        self.image_height = ((self.image_height as f64 * factor) as u32).max(1);
        self.image_width = ((self.image_width as f64 * factor) as u32).max(1);

        CameraResolutionScope {
            camera: self,
            resolution,
        }
    }

    #[inline]
    fn resolution(&self) -> Resolution {
        Resolution {
            focal_length_x: self.focal_length_x,
            focal_length_y: self.focal_length_y,
            image_height: self.image_height,
            image_width: self.image_width,
            principal_point_x: self.principal_point_x,
            principal_point_y: self.principal_point_y,
        }
    }

    #[inline]
    fn set_resolution(
        &mut self,
        resolution: Resolution,
    ) -> &mut Self {
        self.focal_length_x = resolution.focal_length_x;
        self.focal_length_y = resolution.focal_length_y;
        self.image_height = resolution.image_height;
        self.image_width = resolution.image_width;
        self.principal_point_x = resolution.principal_point_x;
        self.principal_point_y = resolution.principal_point_y;
        self
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            camera_id: Default::default(),
            camera_to_world: IDENTITY,
            focal_length_x: 1.0,
            focal_length_y: 1.0,
            image_height: 1,
            image_width: 1,
            principal_point_x: 0.5,
            principal_point_y: 0.5,
        }
    }
}

impl ops::Deref for CameraResolutionScope<'_> {
    type Target = Camera;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.camera
    }
}

impl ops::DerefMut for CameraResolutionScope<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.camera
    }
}

impl Drop for CameraResolutionScope<'_> {
    #[inline]
    fn drop(&mut self) {
        self.camera.set_resolution(self.resolution);
    }
}

impl fmt::Debug for CameraResolutionScope<'_> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CameraResolutionScope")
            .field("camera", &self.camera)
            .field("resolution_restored", &self.resolution)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera {
            focal_length_x: 1111.1,
            focal_length_y: 1017.3,
            image_height: 545,
            image_width: 979,
            principal_point_x: 489.5,
            principal_point_y: 272.5,
            ..Default::default()
        }
    }

    #[test]
    fn scale_output_resolution() {
        let mut camera = camera();

        let scope = camera.scale_output_resolution(0.25);
        assert_eq!(scope.image_height, 136);
        assert_eq!(scope.image_width, 244);
        assert_eq!(scope.focal_length_x, 1111.1 * 0.25);
        assert_eq!(scope.principal_point_y, 272.5 * 0.25);
    }

    #[test]
    fn scale_output_resolution_restores_on_drop() {
        let mut camera = camera();
        let target = camera;

        for factor in [1.0, 0.5, 0.25, 1.0 / 3.0, 0.125] {
            {
                let mut scope = camera.scale_output_resolution(factor);
                scope.focal_length_x += 1.0;
            }
            assert_eq!(camera, target);
        }
    }

    #[test]
    fn scale_output_resolution_minimum_size() {
        let mut camera = Camera {
            image_height: 3,
            image_width: 2,
            ..Default::default()
        };

        let scope = camera.scale_output_resolution(0.125);
        assert_eq!(scope.image_height, 1);
        assert_eq!(scope.image_width, 1);
        drop(scope);

        assert_eq!(camera.image_height, 3);
        assert_eq!(camera.image_width, 2);
    }
}
