use ndarray::ArrayView2;

/// Slice samplers used when resampling display cuts.
pub(crate) struct Interpolator;

impl Interpolator {
    /// Grid size `(depth, height, width)` with every voxel edge as long as the
    /// finest spacing. `spacing` is along `(x, y, z)`. Unusable spacings keep
    /// the grid as it is.
    pub(crate) fn get_isotropic_dimensions(
        spacing: [f64; 3],
        original_dim: (usize, usize, usize),
    ) -> (u32, u32, u32) {
        let (depth, height, width) = original_dim;
        if spacing.iter().any(|step| !step.is_finite() || *step <= 0.0) {
            return (depth as u32, height as u32, width as u32);
        }
        let finest = spacing.into_iter().fold(f64::INFINITY, f64::min);

        let stretch = |count: usize, step: f64| ((count as f64 * step / finest) as u32).max(1);
        (
            stretch(depth, spacing[2]),
            stretch(height, spacing[1]),
            stretch(width, spacing[0]),
        )
    }

    /// Weighted mean of the four samples around `(y, x)`.
    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();
        let (top, left) = (y.floor() as usize, x.floor() as usize);
        let bottom = (top + 1).min(height - 1);
        let right = (left + 1).min(width - 1);
        let (fy, fx) = (y - top as f32, x - left as f32);

        let lerp = |a: f32, b: f32, t: f32| (b - a).mul_add(t, a);
        let upper = lerp(slice[[top, left]], slice[[top, right]], fx);
        let lower = lerp(slice[[bottom, left]], slice[[bottom, right]], fx);
        lerp(upper, lower, fy)
    }

    /// Sample closest to `(y, x)`, clamped to the slice. Used for masks so
    /// that resampled labels stay binary.
    #[inline]
    pub(crate) fn nearest_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();
        let y = (y.round() as usize).min(height - 1);
        let x = (x.round() as usize).min(width - 1);
        slice[[y, x]]
    }
}
