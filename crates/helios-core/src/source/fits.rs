use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::detection::detect_header_geometry;
use crate::error::{HeliosError, Result};
use crate::frame::{Frame, FrameHeaders, FrameMetadata, ImageGeometry, SourceFamily, SourceInfo};
use crate::frameset::order_lexicographic;
use crate::io::fits::{FitsHeader, FitsReader, FitsValue};

use super::{BurstContext, FrameSource, SubFrames};

/// FITS files with a data-less primary HDU and one sub-frame per image
/// extension.
#[derive(Default)]
pub struct FitsSource;

impl FitsSource {
    pub fn new() -> Self {
        Self
    }
}

fn open_with_extensions(file: &Path) -> Result<FitsReader> {
    let reader = FitsReader::open(file)?;
    if reader.hdu_count() < 2 {
        return Err(HeliosError::InvalidFits(format!(
            "{} has no image extensions",
            file.display()
        )));
    }
    Ok(reader)
}

impl FrameSource for FitsSource {
    fn family(&self) -> SourceFamily {
        SourceFamily::StructuredHeader
    }

    fn order_files(&self, files: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        Ok(order_lexicographic(files))
    }

    fn detect_geometry(&self, sample: &Path) -> Result<ImageGeometry> {
        let reader = open_with_extensions(sample)?;
        detect_header_geometry(reader.header(1)?)
    }

    fn frames_in(&self, file: &Path) -> Result<usize> {
        Ok(FitsReader::open(file)?.hdu_count().saturating_sub(1))
    }

    fn sub_frames(&self, file: &Path, geometry: &ImageGeometry) -> Result<SubFrames> {
        let reader = FitsReader::open(file)?;
        let primary = Arc::new(reader.primary_header().clone());
        Ok(Box::new(FitsSubFrames {
            reader,
            primary,
            path: file.to_path_buf(),
            expected: geometry.image_shape(),
            next: 1,
        }))
    }

    /// Extension header of the frame that completed the burst, a blank line,
    /// then the primary header of its file.
    fn burst_sidecar(&self, ctx: &BurstContext<'_>) -> Result<String> {
        let headers = ctx.last_frame.metadata.headers.as_ref().ok_or_else(|| {
            HeliosError::InvalidFits(format!(
                "frame {} of {} carries no headers",
                ctx.last_frame.metadata.sub_index,
                ctx.last_frame.metadata.source.display()
            ))
        })?;
        Ok(format!(
            "{}\n\n{}",
            headers.extension.to_text(),
            headers.primary.to_text()
        ))
    }

    fn source_info(&self, file: &Path) -> Result<SourceInfo> {
        let reader = open_with_extensions(file)?;
        let text = |header: &FitsHeader, key: &str| {
            header.get(key).and_then(FitsValue::as_str).map(str::to_string)
        };
        let primary = reader.primary_header();
        let first = reader.header(1)?;
        Ok(SourceInfo {
            filename: file.to_path_buf(),
            family: self.family(),
            frames_in_file: reader.hdu_count() - 1,
            geometry: detect_header_geometry(first)?,
            instrument: text(primary, "INSTRUME").or_else(|| text(first, "INSTRUME")),
            date_obs: text(primary, "DATE-OBS").or_else(|| text(first, "DATE-OBS")),
        })
    }
}

/// Iterator over the image extensions of one open file.
struct FitsSubFrames {
    reader: FitsReader,
    primary: Arc<FitsHeader>,
    path: PathBuf,
    expected: (usize, usize),
    next: usize,
}

impl FitsSubFrames {
    fn read(&self, index: usize) -> Result<Frame> {
        let data = self.reader.read_image(index)?;
        if data.dim() != self.expected {
            return Err(HeliosError::GeometryMismatch {
                path: self.path.clone(),
                expected: format!("{}x{} in every extension", self.expected.0, self.expected.1),
                found: format!("{}x{} in extension {index}", data.nrows(), data.ncols()),
            });
        }
        Ok(Frame::new(
            data,
            FrameMetadata {
                source: self.path.clone(),
                sub_index: index - 1,
                headers: Some(FrameHeaders {
                    extension: self.reader.header(index)?.clone(),
                    primary: Arc::clone(&self.primary),
                }),
            },
        ))
    }
}

impl Iterator for FitsSubFrames {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.reader.hdu_count() {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.read(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.reader.hdu_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}
