//! Hand-off to the external speckle reconstruction tool: descriptor files,
//! process launch with live log forwarding, and the per-batch job lifecycle.

pub mod descriptor;
pub mod job;
pub mod runner;

pub use self::descriptor::{resolve_indices, BatchIndices, JobDescriptor};
pub use self::job::{
    despeckle_batches, discover_batches, BatchJob, BatchOutcome, DespeckleReport, JobState,
};
pub use self::runner::{kisip_command, prepend_search_path, run_streaming, OutputLine, OutputStream};
