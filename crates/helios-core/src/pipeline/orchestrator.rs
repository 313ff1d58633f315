use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::burst::write_bursts;
use crate::calibrate::{load_or_build, prepare_noise_cube, CachePaths, ReferenceInputs};
use crate::error::Result;
use crate::frame::{FrameRole, ImageGeometry};
use crate::frameset::FrameSet;
use crate::kisip::{despeckle_batches, DespeckleReport};
use crate::source::{source_for, FrameSource};
use crate::transcribe::{transcribe_reconstructed, TranscribeSummary};

use super::config::RunConfig;
use super::types::{CalibrationOutput, PipelineStage, ProgressReporter, RunOutcome};

/// Create the work directory and its stage sub-directories.
pub fn prepare_directories(config: &RunConfig) -> Result<()> {
    for dir in [
        config.paths.work_base.clone(),
        config.pre_speckle_dir(),
        config.speckle_dir(),
        config.post_speckle_dir(),
    ] {
        fs::create_dir_all(&dir)?;
    }
    info!(work = %config.paths.work_base.display(), "Work directories ready");
    Ok(())
}

/// Geometry pinned in the configuration, or detected from `sample`.
pub fn resolve_geometry(
    config: &RunConfig,
    source: &dyn FrameSource,
    sample: &Path,
) -> Result<ImageGeometry> {
    let geometry = match &config.instrument.geometry {
        Some(pinned) => {
            let geometry = pinned.to_geometry()?;
            info!(%geometry, "Using configured geometry");
            geometry
        }
        None => {
            let geometry = source.detect_geometry(sample)?;
            info!(%geometry, sample = %sample.display(), "Detected geometry");
            geometry
        }
    };
    Ok(geometry)
}

fn discover_ordered(
    source: &dyn FrameSource,
    role: FrameRole,
    base: &Path,
    pattern: &str,
) -> Result<FrameSet> {
    let set = FrameSet::discover(role, base, pattern)?;
    let files = source.order_files(set.files)?;
    Ok(FrameSet { role, files })
}

/// Reference frames, noise cube and burst cubes for one run.
pub fn run_calibration(
    config: &RunConfig,
    source: &dyn FrameSource,
    reporter: &dyn ProgressReporter,
) -> Result<CalibrationOutput> {
    config.validate()?;
    prepare_directories(config)?;
    let paths = &config.paths;

    reporter.begin_stage(PipelineStage::Discovery, None);
    let darks = discover_ordered(source, FrameRole::Dark, &paths.dark_base, &paths.dark_pattern)?;
    let flats = discover_ordered(source, FrameRole::Flat, &paths.flat_base, &paths.flat_pattern)?;
    let data = discover_ordered(source, FrameRole::Data, &paths.data_base, &paths.data_pattern)?;
    reporter.finish_stage();

    reporter.begin_stage(PipelineStage::GeometryDetection, None);
    let geometry = resolve_geometry(config, source, flats.first()?)?;
    reporter.finish_stage();

    let inputs = ReferenceInputs {
        source,
        darks: &darks.files,
        flats: &flats.files,
        geometry,
        instrument: &config.instrument.name,
    };
    let reference = load_or_build(&inputs, &CachePaths::for_run(config), reporter)?;
    if reference.gain_zero_count > 0 {
        warn!(
            pixels = reference.gain_zero_count,
            "Gain table has pixels with a zero denominator"
        );
    }

    let burst_number = config.instrument.burst_number;
    let noise = if config.instrument.compute_noise {
        reporter.begin_stage(PipelineStage::NoiseCube, None);
        let noise = prepare_noise_cube(
            source,
            &flats.files,
            &geometry,
            &reference,
            burst_number,
            &config.noise_file(),
            &config.cache_file("noise"),
        )?;
        reporter.finish_stage();
        noise
    } else {
        info!("Noise cube generation disabled");
        None
    };

    let predicted_bursts = source.predicted_frame_count(&data.files)? / burst_number;
    reporter.begin_stage(PipelineStage::Bursts, Some(predicted_bursts));
    let on_progress = |done: usize| reporter.advance(done);
    let bursts = write_bursts(
        config,
        source,
        &data.files,
        &geometry,
        &reference,
        Some(&on_progress),
    )?;
    reporter.finish_stage();

    Ok(CalibrationOutput {
        geometry,
        reference,
        noise,
        bursts,
    })
}

/// Run the reconstruction tool on every batch in `batches`.
pub fn despeckle_all(
    config: &RunConfig,
    geometry: &ImageGeometry,
    batches: &[usize],
    reporter: &dyn ProgressReporter,
) -> Result<DespeckleReport> {
    reporter.begin_stage(PipelineStage::Despeckle, Some(batches.len()));
    let on_progress = |done: usize| reporter.advance(done);
    let report = despeckle_batches(config, geometry, batches, Some(&on_progress))?;
    reporter.finish_stage();
    if report.is_degraded() {
        warn!(failed = ?report.failed_batches(), "Some reconstruction batches failed");
    }
    Ok(report)
}

/// Convert the reconstructed images of the run to FITS.
pub fn transcribe_all(
    config: &RunConfig,
    geometry: &ImageGeometry,
    reporter: &dyn ProgressReporter,
) -> Result<TranscribeSummary> {
    reporter.begin_stage(PipelineStage::Transcribe, None);
    let on_progress = |done: usize| reporter.advance(done);
    let summary = transcribe_reconstructed(config, geometry, Some(&on_progress))?;
    reporter.finish_stage();
    Ok(summary)
}

/// Calibration, reconstruction and transcription in sequence.
///
/// Transcription is skipped when no reconstruction batch completed.
pub fn run_all(config: &RunConfig, reporter: &dyn ProgressReporter) -> Result<RunOutcome> {
    let source = source_for(config)?;
    let calibration = run_calibration(config, source.as_ref(), reporter)?;
    let geometry = calibration.geometry;

    let despeckle = despeckle_all(config, &geometry, &calibration.bursts.batches, reporter)?;

    let transcription = if despeckle.completed() > 0 {
        Some(transcribe_all(config, &geometry, reporter)?)
    } else {
        warn!("No reconstruction batch completed; skipping transcription");
        None
    };

    info!("Pipeline complete");
    Ok(RunOutcome {
        calibration,
        despeckle,
        transcription,
    })
}
