use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeliosError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No files match {pattern} in {}", base.display())]
    Discovery { base: PathBuf, pattern: String },

    #[error("Geometry detection failed: {0}")]
    GeometryDetection(String),

    #[error("Frame {} does not match geometry: expected {expected}, found {found}", path.display())]
    GeometryMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("File list could not be ordered: {0}")]
    Ordering(String),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Numeric domain error: {0}")]
    NumericDomain(String),

    #[error("External process error: {0}")]
    ExternalProcess(String),

    #[error("Invalid file form {form:?}: {reason}")]
    FileForm { form: String, reason: String },

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Glob error: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid observation timestamp: {0}")]
    Timestamp(String),

    #[error("Empty frame sequence")]
    EmptySequence,
}

pub type Result<T> = std::result::Result<T, HeliosError>;
