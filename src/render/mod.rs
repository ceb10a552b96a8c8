pub mod camera;
pub mod gaussian_3d;
