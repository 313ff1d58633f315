use std::fs;
use std::path::PathBuf;

use ndarray::{Array3, Axis};
use tracing::{info, warn};

use crate::calibrate::ReferenceFrames;
use crate::consts::BURSTS_PER_BATCH;
use crate::error::Result;
use crate::frame::{Frame, ImageGeometry};
use crate::io::raw::write_f32_raw;
use crate::pipeline::config::{sidecar_of, RunConfig};
use crate::source::{stream_frames, BurstContext, FrameSource};

/// Split a global burst index into `(batch, index within batch)`.
pub fn batch_of(burst_index: usize) -> (usize, usize) {
    (burst_index / BURSTS_PER_BATCH, burst_index % BURSTS_PER_BATCH)
}

/// What the batcher wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BurstSummary {
    pub bursts_written: usize,
    pub frames_read: usize,
    /// Trailing frames that did not fill a burst.
    pub frames_dropped: usize,
    /// Batch ids in first-seen order, each once.
    pub batches: Vec<usize>,
}

/// Assembles flat-fielded frames into burst cubes of `burst_number` frames
/// and writes each completed cube with its sidecar.
///
/// A single cube buffer is reused for every burst.
pub struct BurstBatcher<'a> {
    config: &'a RunConfig,
    source: &'a dyn FrameSource,
    reference: &'a ReferenceFrames,
    cube: Array3<f32>,
    filled: usize,
    summary: BurstSummary,
}

impl<'a> BurstBatcher<'a> {
    pub fn new(
        config: &'a RunConfig,
        source: &'a dyn FrameSource,
        reference: &'a ReferenceFrames,
        geometry: &ImageGeometry,
    ) -> Self {
        let (h, w) = geometry.image_shape();
        Self {
            config,
            source,
            reference,
            cube: Array3::zeros((config.instrument.burst_number, h, w)),
            filled: 0,
            summary: BurstSummary::default(),
        }
    }

    /// Add one frame. Returns the cube path when the frame completed a burst.
    pub fn push(&mut self, frame: &Frame) -> Result<Option<PathBuf>> {
        self.reference
            .correct_into(&frame.data, self.cube.index_axis_mut(Axis(0), self.filled));
        self.filled += 1;
        self.summary.frames_read += 1;

        if self.filled < self.config.instrument.burst_number {
            return Ok(None);
        }
        let path = self.flush(frame)?;
        Ok(Some(path))
    }

    fn flush(&mut self, last_frame: &Frame) -> Result<PathBuf> {
        let burst_index = self.summary.bursts_written;
        let (batch, within) = batch_of(burst_index);
        let path = self.config.burst_path(batch, within);

        let sidecar = self.source.burst_sidecar(&BurstContext {
            burst_index,
            last_frame,
        })?;
        write_f32_raw(&path, &self.cube)?;
        fs::write(sidecar_of(&path), format!("{sidecar}\n"))?;

        self.filled = 0;
        self.summary.bursts_written += 1;
        if self.summary.batches.last() != Some(&batch) {
            self.summary.batches.push(batch);
        }
        info!(burst = burst_index, batch, file = %path.display(), "Burst written");
        Ok(path)
    }

    pub fn summary(&self) -> &BurstSummary {
        &self.summary
    }

    /// Drop any partially filled burst and return the summary.
    pub fn finish(mut self) -> BurstSummary {
        if self.filled > 0 {
            warn!(
                dropped = self.filled,
                burst_number = self.config.instrument.burst_number,
                "Trailing frames do not fill a burst; dropping them"
            );
        }
        self.summary.frames_dropped = self.filled;
        self.summary
    }
}

/// Stream every data frame through a [`BurstBatcher`].
pub fn write_bursts(
    config: &RunConfig,
    source: &dyn FrameSource,
    files: &[PathBuf],
    geometry: &ImageGeometry,
    reference: &ReferenceFrames,
    on_progress: Option<&dyn Fn(usize)>,
) -> Result<BurstSummary> {
    let burst_number = config.instrument.burst_number;
    info!(
        dir = %config.pre_speckle_dir().display(),
        files = files.len(),
        burst_number,
        shape = ?(burst_number, geometry.height(), geometry.width()),
        "Flat-fielding and saving data to burst files"
    );

    let mut batcher = BurstBatcher::new(config, source, reference, geometry);
    for frame in stream_frames(source, files, *geometry) {
        if batcher.push(&frame?)?.is_some() {
            if let Some(progress) = on_progress {
                progress(batcher.summary().bursts_written);
            }
        }
    }
    let summary = batcher.finish();
    info!(
        bursts = summary.bursts_written,
        batches = ?summary.batches,
        dropped = summary.frames_dropped,
        "Burst files complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_split() {
        assert_eq!(batch_of(0), (0, 0));
        assert_eq!(batch_of(999), (0, 999));
        assert_eq!(batch_of(1000), (1, 0));
        assert_eq!(batch_of(2345), (2, 345));
    }
}
