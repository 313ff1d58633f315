pub mod config;
mod orchestrator;
mod types;

pub use orchestrator::{
    despeckle_all, prepare_directories, resolve_geometry, run_all, run_calibration,
    transcribe_all,
};
pub use types::{CalibrationOutput, NoOpReporter, PipelineStage, ProgressReporter, RunOutcome};
