//! Rasterizing the points to the image.

pub use super::*;

use rayon::slice::ParallelSliceMut;

/// The maximum opacity of a point at a pixel.
pub const ALPHA_MAX: f64 = 0.99;

/// Points less opaque than this at a pixel are skipped.
pub const ALPHA_MIN: f64 = 1.0 / 255.0;

/// `T_x`
pub const TILE_SIZE_X: u32 = 16;

/// `T_y`
pub const TILE_SIZE_Y: u32 = 16;

/// Inputs of [`rasterize`].
#[derive(Clone, Debug)]
pub struct RasterizeInput<B: Backend> {
    /// `[3]`
    pub background: Tensor<B, 1>,
    /// `[P, 3]`
    pub colors_rgb_3d: Tensor<B, 2>,
    /// `[P, 3]`
    pub conics: Tensor<B, 2>,
    /// `[P]`
    pub depths: Tensor<B, 1>,
    /// `I_y`
    pub image_height: u32,
    /// `I_x`
    pub image_width: u32,
    /// `[P, 1]`
    pub opacities: Tensor<B, 2>,
    /// `[P, 2]`
    pub positions_2d: Tensor<B, 2>,
    /// `[P]`
    pub radii: Tensor<B, 1, Int>,
    /// `[P]`
    pub tile_touched_counts: Tensor<B, 1, Int>,
}

/// The number of points composited in one pass.
pub const POINT_CHUNK_SIZE: usize = 256;

/// Rasterizing the points to the image.
///
/// The points are sorted by depth and composited front to back at each pixel:
///
/// $$ \sigma = \frac{1}{2} (a \Delta_x^2 + c \Delta_y^2) + b \Delta_x \Delta_y $$
/// $$ \alpha_i = \min(\alpha_{\max}, o_i e^{-\sigma}) $$
/// $$ T_i = \prod_{j < i} (1 - \alpha_j) $$
/// $$ C = \sum_i \alpha_i T_i c_i + T_p \cdot C_{bg} $$
///
/// It is dense over pixels and runs over chunks of [`POINT_CHUNK_SIZE`] points,
/// carrying the transmittance between chunks.
///
/// The shape of output is `[I_y, I_x, 3]`.
#[inline]
pub fn rasterize<B: Backend>(input: RasterizeInput<B>) -> Tensor<B, 3> {
    rasterize_by_chunk(input, POINT_CHUNK_SIZE)
}

/// Rasterizing the points to the image, `chunk_size` points at a time.
pub fn rasterize_by_chunk<B: Backend>(
    input: RasterizeInput<B>,
    chunk_size: usize,
) -> Tensor<B, 3> {
    #[cfg(debug_assertions)]
    log::debug!(target: "gausplat::trainer::render::rasterize", "start");

    let device = input.positions_2d.device();
    let chunk_size = chunk_size.max(1);
    // P
    let p = input.positions_2d.dims()[0];
    // I_y
    let image_height = input.image_height as usize;
    // I_x
    let image_width = input.image_width as usize;
    // I_y * I_x
    let pixel_count = image_height * image_width;

    // Sorting the points by depth

    let orders = {
        let depths = input.depths.into_data().iter::<f32>().collect::<Vec<_>>();
        let mut orders = (0..p).collect::<Vec<_>>();
        orders.par_sort_unstable_by(|&a, &b| depths[a].total_cmp(&depths[b]));

        Tensor::<B, 1, Int>::from_data(
            TensorData::new(orders.into_iter().map(|i| i as i64).collect(), [p])
                .convert::<B::IntElem>(),
            &device,
        )
    };

    // Zeroing the invisible points, whose values may not be finite

    // [P, 1]
    let is_visible = input
        .radii
        .greater_elem(0)
        .int()
        .mul(input.tile_touched_counts.greater_elem(0).int())
        .float()
        .select(0, orders.to_owned())
        .reshape([p, 1]);
    let is_invisible_with = |width: usize| {
        (is_visible.to_owned() + Tensor::<B, 2>::zeros([p, width], &device)).lower_equal_elem(0.0)
    };
    // [P, 3]
    let colors_rgb_3d = input
        .colors_rgb_3d
        .select(0, orders.to_owned())
        .mask_fill(is_invisible_with(3), 0.0);
    // [P, 3]
    let conics = input
        .conics
        .select(0, orders.to_owned())
        .mask_fill(is_invisible_with(3), 0.0);
    // [P, 1]
    let opacities = input
        .opacities
        .select(0, orders.to_owned())
        .mask_fill(is_invisible_with(1), 0.0);
    // [P, 2]
    let positions_2d = input
        .positions_2d
        .select(0, orders)
        .mask_fill(is_invisible_with(2), 0.0);

    // ([I, 1], [I, 1])
    let (pixels_x, pixels_y) = {
        let (pixels_x, pixels_y) = (0..pixel_count)
            .map(|index| {
                (
                    (index % image_width) as f32 + 0.5,
                    (index / image_width) as f32 + 0.5,
                )
            })
            .unzip::<_, _, Vec<_>, Vec<_>>();
        (
            Tensor::<B, 2>::from_data(
                TensorData::new(pixels_x, [pixel_count, 1]).convert::<B::FloatElem>(),
                &device,
            ),
            Tensor::<B, 2>::from_data(
                TensorData::new(pixels_y, [pixel_count, 1]).convert::<B::FloatElem>(),
                &device,
            ),
        )
    };

    // [C, C], `1` where row < col
    let c = chunk_size.min(p.max(1));
    let exclusive = Tensor::<B, 2>::from_data(
        TensorData::new(
            (0..c * c)
                .map(|index| if index / c < index % c { 1.0 } else { 0.0 })
                .collect::<Vec<f32>>(),
            [c, c],
        )
        .convert::<B::FloatElem>(),
        &device,
    );

    // Compositing the colors front to back

    // [I, 3]
    let mut colors_rgb_2d = Tensor::<B, 2>::zeros([pixel_count, 3], &device);
    // [I, 1]
    let mut transmittances_log = Tensor::<B, 2>::zeros([pixel_count, 1], &device);

    for start in (0..p).step_by(c) {
        let end = (start + c).min(p);
        let n = end - start;

        // [I, N]
        let alphas = alphas_at_pixels(
            pixels_x.to_owned(),
            pixels_y.to_owned(),
            positions_2d.to_owned().slice([start..end, 0..2]),
            conics.to_owned().slice([start..end, 0..3]),
            opacities.to_owned().slice([start..end, 0..1]),
            is_visible.to_owned().slice([start..end, 0..1]),
        );
        // [I, N]
        let alphas_complement_log = alphas.to_owned().neg().add_scalar(1.0).log();
        // [I, N]
        let transmittances = (transmittances_log.to_owned()
            + alphas_complement_log
                .to_owned()
                .matmul(exclusive.to_owned().slice([0..n, 0..n])))
        .exp();

        colors_rgb_2d = colors_rgb_2d
            + (alphas * transmittances).matmul(colors_rgb_3d.to_owned().slice([start..end, 0..3]));
        transmittances_log = transmittances_log + alphas_complement_log.sum_dim(1);
    }

    // [I, 3]
    let colors_rgb_2d =
        colors_rgb_2d + transmittances_log.exp() * input.background.reshape([1, 3]);

    colors_rgb_2d.reshape([image_height, image_width, 3])
}

/// Opacities of `N` points at each pixel.
///
/// The shape is `[I, N]`.
fn alphas_at_pixels<B: Backend>(
    pixels_x: Tensor<B, 2>,
    pixels_y: Tensor<B, 2>,
    positions_2d: Tensor<B, 2>,
    conics: Tensor<B, 2>,
    opacities: Tensor<B, 2>,
    is_visible: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let n = positions_2d.dims()[0];

    // [I, N]
    let deltas_x = pixels_x - positions_2d.to_owned().slice([0..n, 0..1]).reshape([1, n]);
    // [I, N]
    let deltas_y = pixels_y - positions_2d.slice([0..n, 1..2]).reshape([1, n]);
    let conic_a = conics.to_owned().slice([0..n, 0..1]).reshape([1, n]);
    let conic_b = conics.to_owned().slice([0..n, 1..2]).reshape([1, n]);
    let conic_c = conics.slice([0..n, 2..3]).reshape([1, n]);

    // [I, N]
    let sigmas = (deltas_x.to_owned().powf_scalar(2.0) * conic_a
        + deltas_y.to_owned().powf_scalar(2.0) * conic_c)
        .mul_scalar(0.5)
        + deltas_x * deltas_y * conic_b;
    let is_sigma_valid = sigmas.to_owned().greater_equal_elem(0.0).int();

    // [I, N]
    let alphas = (opacities.reshape([1, n]) * sigmas.clamp_min(0.0).neg().exp())
        .clamp_max(ALPHA_MAX);
    let is_alpha_valid = alphas.to_owned().greater_equal_elem(ALPHA_MIN).int();
    let is_visible = is_visible.reshape([1, n]).greater_elem(0.0).int();

    // Non-finite values fail every comparison, so they are masked as well.
    let is_skipped = (is_sigma_valid * is_alpha_valid * is_visible).equal_elem(0);
    alphas.mask_fill(is_skipped, 0.0)
}
