use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, error, info};

use crate::error::{HeliosError, Result};
use crate::frame::FrameRole;

/// Ordered list of frame files for one role of a run.
#[derive(Clone, Debug)]
pub struct FrameSet {
    pub role: FrameRole,
    pub files: Vec<PathBuf>,
}

impl FrameSet {
    /// Glob `pattern` below `base`. The result is unordered; pass it through
    /// the source's ordering before use.
    pub fn discover(role: FrameRole, base: &Path, pattern: &str) -> Result<Self> {
        let files = discover(base, pattern)?;
        info!(%role, count = files.len(), base = %base.display(), "Discovered frame files");
        Ok(Self { role, files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn first(&self) -> Result<&Path> {
        self.files
            .first()
            .map(PathBuf::as_path)
            .ok_or(HeliosError::EmptySequence)
    }
}

/// Regular files under `base` matching `pattern`. Fails when `base` is not a
/// directory or nothing matches.
pub fn discover(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !base.is_dir() {
        return Err(HeliosError::Configuration(format!(
            "base directory {} does not exist",
            base.display()
        )));
    }
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&base.to_string_lossy()),
        pattern
    );
    let files: Vec<PathBuf> = glob::glob(&full)?
        .collect::<std::result::Result<Vec<_>, glob::GlobError>>()?
        .into_iter()
        .filter(|p| p.is_file())
        .collect();
    if files.is_empty() {
        return Err(HeliosError::Discovery {
            base: base.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }
    Ok(files)
}

/// Matcher for the frame counter embedded in raw-buffer file names.
///
/// The camera writes its counter least-significant digit first, so the
/// leading digit run of the file name is reversed before parsing:
/// `"1000000000.dat"` is frame 1, `"2100000000.dat"` is frame 12.
pub struct EmbeddedIndex {
    leading_digits: Regex,
}

impl EmbeddedIndex {
    pub fn new() -> Result<Self> {
        Ok(Self {
            leading_digits: Regex::new("^[0-9]+")?,
        })
    }

    pub fn index_of(&self, path: &Path) -> Option<usize> {
        let name = path.file_name()?.to_str()?;
        let digits = self.leading_digits.find(name)?.as_str();
        digits.chars().rev().collect::<String>().parse().ok()
    }
}

/// Frame counter of a single file; see [`EmbeddedIndex`].
pub fn reversed_digit_index(path: &Path) -> Result<Option<usize>> {
    Ok(EmbeddedIndex::new()?.index_of(path))
}

/// Place every file at its [`reversed_digit_index`].
///
/// The result is a permutation of `files` in which position equals embedded
/// index. Names without a leading digit run are logged and leave a gap; a
/// gap, a duplicate, or an index outside `0..files.len()` fails with
/// [`HeliosError::Ordering`].
pub fn order_by_embedded_index(files: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let n = files.len();
    let embedded = EmbeddedIndex::new()?;
    let mut slots: Vec<Option<PathBuf>> = vec![None; n];

    for file in files {
        let Some(index) = embedded.index_of(&file) else {
            error!(file = %file.display(), "File name carries no frame counter");
            continue;
        };
        if index >= n {
            return Err(HeliosError::Ordering(format!(
                "{} has index {index}, but only {n} files were found",
                file.display()
            )));
        }
        if let Some(existing) = &slots[index] {
            return Err(HeliosError::Ordering(format!(
                "{} and {} both have index {index}",
                existing.display(),
                file.display()
            )));
        }
        slots[index] = Some(file);
    }

    let missing: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_none())
        .map(|(i, _)| i)
        .collect();
    if !missing.is_empty() {
        return Err(HeliosError::Ordering(format!(
            "{} of {n} positions unfilled (first missing index {})",
            missing.len(),
            missing[0]
        )));
    }

    debug!(count = n, "Ordered files by embedded index");
    Ok(slots.into_iter().flatten().collect())
}

/// Lexicographic order of full paths.
pub fn order_lexicographic(mut files: Vec<PathBuf>) -> Vec<PathBuf> {
    files.sort();
    files
}
