use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayViewMut2};
use tracing::{info, warn};

use crate::error::{HeliosError, Result};
use crate::frame::{FrameRole, ImageGeometry};
use crate::io::fits::{read_primary_image, write_image, FitsHeader, FitsValue};
use crate::pipeline::config::RunConfig;
use crate::pipeline::{PipelineStage, ProgressReporter};
use crate::source::FrameSource;

use super::average::average_frames;
use super::flat_field::flat_field_into;
use super::gain::{compute_gain, count_zero_denominators};

/// Average dark, average flat and gain table of one run, all of image shape.
#[derive(Clone, Debug)]
pub struct ReferenceFrames {
    pub avg_dark: Array2<f32>,
    pub avg_flat: Array2<f32>,
    pub gain: Array2<f32>,
    /// Gain pixels whose denominator was zero.
    pub gain_zero_count: usize,
    /// Cache files that could not be written.
    pub cache_write_failures: usize,
}

impl ReferenceFrames {
    /// Flat-field `frame` into `out`.
    pub fn correct_into(&self, frame: &Array2<f32>, out: ArrayViewMut2<'_, f32>) {
        flat_field_into(frame, &self.avg_dark, &self.gain, out);
    }
}

/// FITS cache files of the reference frames.
#[derive(Clone, Debug)]
pub struct CachePaths {
    pub dark: PathBuf,
    pub flat: PathBuf,
    pub gain: PathBuf,
}

impl CachePaths {
    pub fn for_run(config: &RunConfig) -> Self {
        Self {
            dark: config.cache_file("dark"),
            flat: config.cache_file("flat"),
            gain: config.cache_file("gain"),
        }
    }
}

/// Inputs needed to compute reference frames from scratch.
pub struct ReferenceInputs<'a> {
    pub source: &'a dyn FrameSource,
    pub darks: &'a [PathBuf],
    pub flats: &'a [PathBuf],
    pub geometry: ImageGeometry,
    /// Written into the header of saved caches.
    pub instrument: &'a str,
}

/// Load each reference frame from its cache when present, otherwise compute
/// it and save it. The three caches are checked independently; a failed
/// save is logged, counted in [`ReferenceFrames::cache_write_failures`] and
/// the run continues.
pub fn load_or_build(
    inputs: &ReferenceInputs<'_>,
    cache: &CachePaths,
    reporter: &dyn ProgressReporter,
) -> Result<ReferenceFrames> {
    let mut cache_write_failures = 0;
    let avg_dark = match load_cached(&cache.dark, &inputs.geometry, "dark")? {
        Some(dark) => dark,
        None => {
            let dark = average_role(inputs, FrameRole::Dark, reporter)?;
            if !save_best_effort(&cache.dark, &dark, inputs.instrument, "Average dark") {
                cache_write_failures += 1;
            }
            dark
        }
    };

    let avg_flat = match load_cached(&cache.flat, &inputs.geometry, "flat")? {
        Some(flat) => flat,
        None => {
            let flat = average_role(inputs, FrameRole::Flat, reporter)?;
            if !save_best_effort(&cache.flat, &flat, inputs.instrument, "Average flat") {
                cache_write_failures += 1;
            }
            flat
        }
    };

    let gain_zero_count = count_zero_denominators(&avg_dark, &avg_flat);
    let gain = match load_cached(&cache.gain, &inputs.geometry, "gain")? {
        Some(gain) => gain,
        None => {
            reporter.begin_stage(PipelineStage::GainTable, None);
            let table = compute_gain(&avg_dark, &avg_flat)?;
            reporter.finish_stage();
            if !save_best_effort(&cache.gain, &table.gain, inputs.instrument, "Gain table") {
                cache_write_failures += 1;
            }
            table.gain
        }
    };

    Ok(ReferenceFrames {
        avg_dark,
        avg_flat,
        gain,
        gain_zero_count,
        cache_write_failures,
    })
}

fn average_role(
    inputs: &ReferenceInputs<'_>,
    role: FrameRole,
    reporter: &dyn ProgressReporter,
) -> Result<Array2<f32>> {
    let (stage, files) = match role {
        FrameRole::Dark => (PipelineStage::AveragingDarks, inputs.darks),
        _ => (PipelineStage::AveragingFlats, inputs.flats),
    };
    let predicted = inputs.source.predicted_frame_count(files)?;
    reporter.begin_stage(stage, Some(predicted));
    let on_progress = |done: usize| reporter.advance(done);
    let avg = average_frames(
        inputs.source,
        files,
        &inputs.geometry,
        role,
        Some(&on_progress),
    )?;
    reporter.finish_stage();
    Ok(avg)
}

fn load_cached(path: &Path, geometry: &ImageGeometry, kind: &str) -> Result<Option<Array2<f32>>> {
    if !path.is_file() {
        return Ok(None);
    }
    info!(kind, file = %path.display(), "Cached reference frame found, reading");
    let image = read_primary_image(path)?;
    if image.dim() != geometry.image_shape() {
        return Err(HeliosError::GeometryMismatch {
            path: path.to_path_buf(),
            expected: format!("{:?}", geometry.image_shape()),
            found: format!("{:?}", image.dim()),
        });
    }
    Ok(Some(image))
}

/// Returns false when the cache could not be written.
fn save_best_effort(path: &Path, image: &Array2<f32>, instrument: &str, description: &str) -> bool {
    let mut header = FitsHeader::new();
    header.set("INSTRUME", FitsValue::Text(instrument.to_string()));
    header.push_comment(description);
    match write_image(path, image, &header) {
        Ok(()) => {
            info!(file = %path.display(), "Saved {}", description.to_lowercase());
            true
        }
        Err(e) => {
            warn!(
                file = %path.display(),
                error = %e,
                "Could not write cache file; continuing"
            );
            false
        }
    }
}
