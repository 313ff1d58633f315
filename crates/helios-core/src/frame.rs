use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{HeliosError, Result};
use crate::io::fits::FitsHeader;

/// Physical buffer layout and usable image region of every frame in a run.
///
/// Both shapes are `(rows, cols)`. The image region is the top-left
/// `image_shape` corner of the `data_shape` buffer; the remainder is
/// overscan. Construct through [`ImageGeometry::new`], which enforces
/// `image_shape <= data_shape` on both axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageGeometry {
    data_shape: (usize, usize),
    image_shape: (usize, usize),
}

impl ImageGeometry {
    pub fn new(data_shape: (usize, usize), image_shape: (usize, usize)) -> Result<Self> {
        let (data_rows, data_cols) = data_shape;
        let (image_rows, image_cols) = image_shape;
        if image_rows == 0 || image_cols == 0 {
            return Err(HeliosError::GeometryDetection(format!(
                "empty image region {image_rows}x{image_cols}"
            )));
        }
        if image_rows > data_rows || image_cols > data_cols {
            return Err(HeliosError::GeometryDetection(format!(
                "image region {image_rows}x{image_cols} exceeds data buffer {data_rows}x{data_cols}"
            )));
        }
        Ok(Self {
            data_shape,
            image_shape,
        })
    }

    /// Geometry without overscan: the whole buffer is usable.
    pub fn uniform(shape: (usize, usize)) -> Result<Self> {
        Self::new(shape, shape)
    }

    pub fn data_shape(&self) -> (usize, usize) {
        self.data_shape
    }

    pub fn image_shape(&self) -> (usize, usize) {
        self.image_shape
    }

    /// Number of samples in one raw buffer.
    pub fn data_len(&self) -> usize {
        self.data_shape.0 * self.data_shape.1
    }

    pub fn width(&self) -> usize {
        self.image_shape.1
    }

    pub fn height(&self) -> usize {
        self.image_shape.0
    }
}

impl fmt::Display for ImageGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "data {}x{}, image {}x{}",
            self.data_shape.0, self.data_shape.1, self.image_shape.0, self.image_shape.1
        )
    }
}

/// A single calibrated or raw frame, restricted to the usable image region.
/// Pixel values are f32 in detector units (not normalized).
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = image_shape
    pub data: Array2<f32>,
    pub metadata: FrameMetadata,
}

impl Frame {
    pub fn new(data: Array2<f32>, metadata: FrameMetadata) -> Self {
        Self { data, metadata }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FrameMetadata {
    /// File the frame was read from.
    pub source: PathBuf,
    /// Position of the frame within its file (0 for single-frame files).
    pub sub_index: usize,
    /// Headers of the frame, for sources that carry them.
    pub headers: Option<FrameHeaders>,
}

/// Extension header of a sub-frame plus the primary header of its file.
#[derive(Clone, Debug)]
pub struct FrameHeaders {
    pub extension: FitsHeader,
    pub primary: Arc<FitsHeader>,
}

/// Role of a frame list within a calibration run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameRole {
    Dark,
    Flat,
    Data,
}

impl fmt::Display for FrameRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dark => write!(f, "dark"),
            Self::Flat => write!(f, "flat"),
            Self::Data => write!(f, "data"),
        }
    }
}

/// On-disk layout family of the camera that produced the frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFamily {
    /// Headerless u16 dumps, one frame per file, zero-padded overscan,
    /// filenames carrying a least-significant-digit-first counter.
    #[default]
    RawBuffer,
    /// FITS files holding one sub-frame per image extension.
    StructuredHeader,
}

impl fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RawBuffer => write!(f, "Raw buffer"),
            Self::StructuredHeader => write!(f, "Structured header (FITS)"),
        }
    }
}

/// Summary of one frame file, as reported by `helios info`.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    pub filename: PathBuf,
    pub family: SourceFamily,
    /// Sub-frames held by the file.
    pub frames_in_file: usize,
    pub geometry: ImageGeometry,
    pub instrument: Option<String>,
    pub date_obs: Option<String>,
}
