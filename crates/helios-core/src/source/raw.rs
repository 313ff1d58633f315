use std::path::{Path, PathBuf};

use crate::burst::timestamp::ObservationClock;
use crate::detection::detect_overscan_geometry;
use crate::error::{HeliosError, Result};
use crate::frame::{Frame, FrameMetadata, ImageGeometry, SourceFamily, SourceInfo};
use crate::frameset::order_by_embedded_index;
use crate::io::fits::{FitsHeader, FitsValue};
use crate::io::raw::{read_raw_frame, read_raw_samples};

use super::{BurstContext, FrameSource, SubFrames};

/// Headerless u16 dumps, one frame per file.
///
/// Burst sidecars need the observation clock; a source built without one
/// can still order, inspect and read files.
#[derive(Default)]
pub struct RawBufferSource {
    clock: Option<ObservationClock>,
}

impl RawBufferSource {
    pub fn new(clock: ObservationClock) -> Self {
        Self { clock: Some(clock) }
    }
}

impl FrameSource for RawBufferSource {
    fn family(&self) -> SourceFamily {
        SourceFamily::RawBuffer
    }

    fn order_files(&self, files: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        order_by_embedded_index(files)
    }

    fn detect_geometry(&self, sample: &Path) -> Result<ImageGeometry> {
        detect_overscan_geometry(&read_raw_samples(sample)?)
    }

    fn frames_in(&self, _file: &Path) -> Result<usize> {
        Ok(1)
    }

    fn sub_frames(&self, file: &Path, geometry: &ImageGeometry) -> Result<SubFrames> {
        let data = read_raw_frame(file, geometry)?;
        let frame = Frame::new(
            data,
            FrameMetadata {
                source: file.to_path_buf(),
                sub_index: 0,
                headers: None,
            },
        );
        Ok(Box::new(std::iter::once(Ok(frame))))
    }

    /// `DATE` holds the reconstructed burst start, `EXPOSURE` the exposure
    /// time in milliseconds.
    fn burst_sidecar(&self, ctx: &BurstContext<'_>) -> Result<String> {
        let clock = self.clock.as_ref().ok_or_else(|| {
            HeliosError::Configuration("raw-buffer bursts need an observation clock".into())
        })?;
        let mut header = FitsHeader::new();
        header.set(
            "DATE",
            FitsValue::Text(clock.burst_timestamp(ctx.burst_index)),
        );
        header.set("EXPOSURE", FitsValue::Float(clock.exposure_ms()));
        Ok(header.to_text())
    }

    fn source_info(&self, file: &Path) -> Result<SourceInfo> {
        Ok(SourceInfo {
            filename: file.to_path_buf(),
            family: self.family(),
            frames_in_file: 1,
            geometry: self.detect_geometry(file)?,
            instrument: None,
            date_obs: None,
        })
    }
}
