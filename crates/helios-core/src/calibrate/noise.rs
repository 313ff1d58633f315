use std::path::{Path, PathBuf};

use ndarray::{Array3, Axis};
use tracing::{info, warn};

use crate::consts::PROGRESS_LOG_INTERVAL;
use crate::error::Result;
use crate::frame::ImageGeometry;
use crate::io::fits::{write_image, FitsHeader};
use crate::io::raw::write_f32_raw;
use crate::source::{stream_frames, FrameSource};

use super::reference::ReferenceFrames;

/// Flat-field the first `burst_number` flat sub-frames into a cube.
///
/// Returns `None` when the flats hold fewer frames than one burst.
pub fn build_noise_cube(
    source: &dyn FrameSource,
    flats: &[PathBuf],
    geometry: &ImageGeometry,
    reference: &ReferenceFrames,
    burst_number: usize,
) -> Result<Option<Array3<f32>>> {
    let (h, w) = geometry.image_shape();
    info!(shape = ?(burst_number, h, w), "Computing noise cube");

    let mut cube = Array3::<f32>::zeros((burst_number, h, w));
    let mut filled = 0;
    for frame in stream_frames(source, flats, *geometry).take(burst_number) {
        let frame = frame?;
        reference.correct_into(&frame.data, cube.index_axis_mut(Axis(0), filled));
        filled += 1;
        if filled % PROGRESS_LOG_INTERVAL == 0 {
            info!(done = filled, total = burst_number, "Noise cube progress");
        }
    }

    if filled < burst_number {
        warn!(
            available = filled,
            needed = burst_number,
            "Not enough flat frames for a noise cube; skipping it"
        );
        return Ok(None);
    }
    Ok(Some(cube))
}

/// Raw noise cube handed to the reconstruction tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoiseCube {
    pub path: PathBuf,
    /// The FITS copy could not be written.
    pub fits_copy_failed: bool,
}

/// Ensure the raw noise cube exists at `raw_path`, computing it if needed,
/// and keep a FITS copy at `fits_path` when that does not exist yet.
///
/// Returns `None` when no cube could be built. Writing the raw cube is fatal
/// on failure; the FITS copy is best-effort.
pub fn prepare_noise_cube(
    source: &dyn FrameSource,
    flats: &[PathBuf],
    geometry: &ImageGeometry,
    reference: &ReferenceFrames,
    burst_number: usize,
    raw_path: &Path,
    fits_path: &Path,
) -> Result<Option<NoiseCube>> {
    if raw_path.is_file() {
        info!(file = %raw_path.display(), "Noise file already exists");
        return Ok(Some(NoiseCube {
            path: raw_path.to_path_buf(),
            fits_copy_failed: false,
        }));
    }

    let Some(cube) = build_noise_cube(source, flats, geometry, reference, burst_number)? else {
        return Ok(None);
    };

    write_f32_raw(raw_path, &cube)?;
    info!(file = %raw_path.display(), "Saved noise file");

    let mut fits_copy_failed = false;
    if fits_path.exists() {
        info!(file = %fits_path.display(), "Noise FITS file already exists");
    } else {
        let mut header = FitsHeader::new();
        header.push_comment("Gain-corrected, dark-subtracted flat frames");
        if let Err(e) = write_image(fits_path, &cube, &header) {
            warn!(
                file = %fits_path.display(),
                error = %e,
                "Could not write noise FITS copy; continuing"
            );
            fits_copy_failed = true;
        }
    }
    Ok(Some(NoiseCube {
        path: raw_path.to_path_buf(),
        fits_copy_failed,
    }))
}
