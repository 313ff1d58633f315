//! Per-family access to frame files.
//!
//! Both camera families go through [`FrameSource`]: it orders a discovered
//! file list, detects geometry from a sample file, yields the sub-frames of a
//! file, and renders the metadata sidecar written next to every burst cube.

pub mod fits;
pub mod raw;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::frame::{Frame, ImageGeometry, SourceFamily, SourceInfo};
use crate::pipeline::config::RunConfig;

pub use self::fits::FitsSource;
pub use self::raw::RawBufferSource;

/// Sub-frames of one file. The iterator owns its reader.
pub type SubFrames = Box<dyn Iterator<Item = Result<Frame>>>;

/// What a source needs to know to describe a completed burst.
pub struct BurstContext<'a> {
    pub burst_index: usize,
    /// Frame that completed the burst.
    pub last_frame: &'a Frame,
}

pub trait FrameSource {
    fn family(&self) -> SourceFamily;

    /// Deterministic processing order for a discovered file list.
    fn order_files(&self, files: Vec<PathBuf>) -> Result<Vec<PathBuf>>;

    /// Geometry of every frame in the run, inferred from one sample file.
    fn detect_geometry(&self, sample: &Path) -> Result<ImageGeometry>;

    /// Number of sub-frames `file` contributes.
    fn frames_in(&self, file: &Path) -> Result<usize>;

    /// Frames of `file`, cropped to the usable region of `geometry`.
    fn sub_frames(&self, file: &Path, geometry: &ImageGeometry) -> Result<SubFrames>;

    /// Text of the `<cube>.txt` sidecar describing one burst.
    fn burst_sidecar(&self, ctx: &BurstContext<'_>) -> Result<String>;

    fn source_info(&self, file: &Path) -> Result<SourceInfo>;

    /// Frames expected from `files`, assuming every file holds as many
    /// sub-frames as the first.
    fn predicted_frame_count(&self, files: &[PathBuf]) -> Result<usize> {
        match files.first() {
            Some(first) => Ok(files.len() * self.frames_in(first)?),
            None => Ok(0),
        }
    }
}

/// Build the source matching the configured camera family.
pub fn source_for(config: &RunConfig) -> Result<Box<dyn FrameSource>> {
    match config.instrument.family {
        SourceFamily::RawBuffer => Ok(Box::new(RawBufferSource::new(config.observation_clock()?))),
        SourceFamily::StructuredHeader => Ok(Box::new(FitsSource::new())),
    }
}

/// Source for inspecting files of `family` outside a configured run.
pub fn inspector(family: SourceFamily) -> Box<dyn FrameSource> {
    match family {
        SourceFamily::RawBuffer => Box::new(RawBufferSource::default()),
        SourceFamily::StructuredHeader => Box::new(FitsSource::new()),
    }
}

/// Every sub-frame of every file, in order. A file that fails to open
/// yields its error in place of its frames.
pub fn stream_frames<'a>(
    source: &'a dyn FrameSource,
    files: &'a [PathBuf],
    geometry: ImageGeometry,
) -> impl Iterator<Item = Result<Frame>> + 'a {
    files
        .iter()
        .flat_map(move |file| match source.sub_frames(file, &geometry) {
            Ok(frames) => frames,
            Err(e) => Box::new(std::iter::once(Err(e))) as SubFrames,
        })
}
