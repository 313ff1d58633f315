use ndarray::{Array2, ArrayViewMut2, Zip};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Write `gain * (frame - dark)` into `out`.
///
/// All four arrays share the image shape.
pub fn flat_field_into(
    frame: &Array2<f32>,
    dark: &Array2<f32>,
    gain: &Array2<f32>,
    out: ArrayViewMut2<'_, f32>,
) {
    let (h, w) = frame.dim();
    let zip = Zip::from(out).and(frame).and(dark).and(gain);
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        zip.par_for_each(|o, &f, &d, &g| *o = g * (f - d));
    } else {
        zip.for_each(|o, &f, &d, &g| *o = g * (f - d));
    }
}
