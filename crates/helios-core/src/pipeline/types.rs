use crate::burst::BurstSummary;
use crate::calibrate::{NoiseCube, ReferenceFrames};
use crate::frame::ImageGeometry;
use crate::kisip::DespeckleReport;
use crate::transcribe::TranscribeSummary;

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Discovery,
    GeometryDetection,
    AveragingDarks,
    AveragingFlats,
    GainTable,
    NoiseCube,
    Bursts,
    Despeckle,
    Transcribe,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovery => write!(f, "Discovering files"),
            Self::GeometryDetection => write!(f, "Detecting geometry"),
            Self::AveragingDarks => write!(f, "Averaging darks"),
            Self::AveragingFlats => write!(f, "Averaging flats"),
            Self::GainTable => write!(f, "Computing gain"),
            Self::NoiseCube => write!(f, "Computing noise cube"),
            Self::Bursts => write!(f, "Writing bursts"),
            Self::Despeckle => write!(f, "Speckle reconstruction"),
            Self::Transcribe => write!(f, "Transcribing to FITS"),
        }
    }
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new pipeline stage has started. `total_items` is the number of
    /// work items in this stage (e.g., frame count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// `items_done` work items of the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Progress reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Everything the calibration stages produce.
#[derive(Debug)]
pub struct CalibrationOutput {
    pub geometry: ImageGeometry,
    pub reference: ReferenceFrames,
    /// Raw noise cube, when one exists after the run.
    pub noise: Option<NoiseCube>,
    pub bursts: BurstSummary,
}

impl CalibrationOutput {
    /// Reference caches and noise FITS copy that could not be written.
    pub fn cache_write_failures(&self) -> usize {
        self.reference.cache_write_failures
            + self.noise.as_ref().map_or(0, |n| usize::from(n.fits_copy_failed))
    }
}

/// Outcome of a complete `run`.
#[derive(Debug)]
pub struct RunOutcome {
    pub calibration: CalibrationOutput,
    pub despeckle: DespeckleReport,
    /// `None` when no batch completed, so there was nothing to transcribe.
    pub transcription: Option<TranscribeSummary>,
}

impl RunOutcome {
    /// True when any stage finished with soft failures.
    pub fn is_degraded(&self) -> bool {
        self.calibration.reference.gain_zero_count > 0
            || self.calibration.cache_write_failures() > 0
            || self.despeckle.is_degraded()
            || self
                .transcription
                .as_ref()
                .is_some_and(|t| t.failed > 0 || t.missing_sidecars > 0)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use ndarray::Array2;

    use super::*;

    fn clean_outcome() -> RunOutcome {
        RunOutcome {
            calibration: CalibrationOutput {
                geometry: ImageGeometry::uniform((2, 2)).unwrap(),
                reference: ReferenceFrames {
                    avg_dark: Array2::zeros((2, 2)),
                    avg_flat: Array2::ones((2, 2)),
                    gain: Array2::ones((2, 2)),
                    gain_zero_count: 0,
                    cache_write_failures: 0,
                },
                noise: Some(NoiseCube {
                    path: PathBuf::from("noise.raw"),
                    fits_copy_failed: false,
                }),
                bursts: BurstSummary::default(),
            },
            despeckle: DespeckleReport::default(),
            transcription: Some(TranscribeSummary::default()),
        }
    }

    #[test]
    fn test_clean_run_is_not_degraded() {
        assert!(!clean_outcome().is_degraded());
    }

    #[test]
    fn test_cache_write_failures_degrade_run() {
        let mut outcome = clean_outcome();
        outcome.calibration.reference.cache_write_failures = 2;
        assert_eq!(outcome.calibration.cache_write_failures(), 2);
        assert!(outcome.is_degraded());

        let mut outcome = clean_outcome();
        if let Some(noise) = outcome.calibration.noise.as_mut() {
            noise.fits_copy_failed = true;
        }
        assert_eq!(outcome.calibration.cache_write_failures(), 1);
        assert!(outcome.is_degraded());
    }
}
