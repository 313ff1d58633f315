use std::path::PathBuf;

use ndarray::{Array2, Zip};
use tracing::{info, warn};

use crate::consts::PROGRESS_LOG_INTERVAL;
use crate::error::{HeliosError, Result};
use crate::frame::{FrameRole, ImageGeometry};
use crate::source::{stream_frames, FrameSource};

/// Elementwise mean of every sub-frame in `files`.
///
/// Frames are streamed one at a time into an f64 accumulator. The number of
/// frames actually averaged is compared against the count predicted from the
/// first file; a difference is logged but not fatal.
pub fn average_frames(
    source: &dyn FrameSource,
    files: &[PathBuf],
    geometry: &ImageGeometry,
    role: FrameRole,
    on_progress: Option<&dyn Fn(usize)>,
) -> Result<Array2<f32>> {
    let predicted = source.predicted_frame_count(files)?;
    info!(%role, files = files.len(), predicted, "Computing average image");

    let mut sum = Array2::<f64>::zeros(geometry.image_shape());
    let mut count = 0usize;
    for frame in stream_frames(source, files, *geometry) {
        let frame = frame?;
        Zip::from(&mut sum)
            .and(&frame.data)
            .for_each(|s, &v| *s += v as f64);
        count += 1;

        if count % PROGRESS_LOG_INTERVAL == 0 {
            info!(
                %role,
                done = count,
                "Progress: {:.1}%",
                100.0 * count as f64 / predicted.max(1) as f64
            );
        }
        if let Some(progress) = on_progress {
            progress(count);
        }
    }

    if count == 0 {
        return Err(HeliosError::EmptySequence);
    }

    info!(%role, averaged = count, predicted, "Images averaged/images predicted");
    if count != predicted {
        warn!(
            %role,
            averaged = count,
            predicted,
            "Number of images averaged does not match the number predicted; continuing"
        );
    }

    let n = count as f64;
    Ok(sum.mapv(|s| (s / n) as f32))
}
