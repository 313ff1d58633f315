//! Conversion of reconstructed images to FITS, carrying over the metadata
//! recorded in the sidecar of the matching burst cube.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::consts::RECONSTRUCTED_EXTENSION;
use crate::error::{HeliosError, Result};
use crate::frame::{ImageGeometry, SourceFamily};
use crate::io::fits::{write_image, Card, FitsHeader};
use crate::io::raw::read_f32_image;
use crate::pipeline::config::RunConfig;

const RECONSTRUCTED_TIMESTAMP_NOTES: [&str; 2] = [
    "WARNING: Timestamps were reconstructed during the data reduction.",
    "Timestamp = start time + burst number * time exposure * file number",
];

/// What the transcription wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TranscribeSummary {
    pub written: usize,
    /// Images that could not be read or written.
    pub failed: usize,
    /// Images written without metadata because their sidecar was missing.
    pub missing_sidecars: usize,
}

/// One reconstructed image found in the speckle directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconstructedImage {
    pub path: PathBuf,
    pub batch: usize,
    pub burst: usize,
}

impl ReconstructedImage {
    /// `<postSpeckle>/<file name>.fits`.
    pub fn output_path(&self, dir: &Path) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".fits");
        dir.join(name)
    }
}

/// Reconstructed images of this run, ordered by `(batch, burst)`.
pub fn find_reconstructed(config: &RunConfig) -> Result<Vec<ReconstructedImage>> {
    let dir = config.speckle_dir();
    let form = &config.instrument.speckled_form;
    let matcher = form.matcher()?;
    let suffix = format!(".{RECONSTRUCTED_EXTENSION}");

    let mut images = Vec::new();
    if dir.is_dir() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(base) = name.strip_suffix(&suffix) else {
                continue;
            };
            let Some((batch, burst)) = matcher.indices(base) else {
                continue;
            };
            if form.render(config.fields(batch, burst)) != base {
                continue;
            }
            images.push(ReconstructedImage { path, batch, burst });
        }
    }
    if images.is_empty() {
        return Err(HeliosError::Discovery {
            base: dir,
            pattern: format!("{form}{suffix}"),
        });
    }
    images.sort_by_key(|img| (img.batch, img.burst));
    Ok(images)
}

/// Header cards parsed from a burst sidecar. Structural keywords and
/// lines that are not `KEY=value` are skipped; the first card of each
/// keyword wins.
pub fn sidecar_header(text: &str) -> FitsHeader {
    let mut header = FitsHeader::new();
    for card in text.lines().filter_map(Card::parse_lenient) {
        if card.is_structural() || header.get(&card.keyword).is_some() {
            continue;
        }
        header.push(card);
    }
    header
}

/// Convert every reconstructed image of the run to FITS in the
/// post-speckle directory.
///
/// Per-image failures are logged and counted; the remaining images are
/// still converted.
pub fn transcribe_reconstructed(
    config: &RunConfig,
    geometry: &ImageGeometry,
    on_progress: Option<&dyn Fn(usize)>,
) -> Result<TranscribeSummary> {
    let images = find_reconstructed(config)?;
    let out_dir = config.post_speckle_dir();
    fs::create_dir_all(&out_dir)?;
    info!(
        images = images.len(),
        dir = %out_dir.display(),
        "Transcribing reconstructed images"
    );

    let mut summary = TranscribeSummary::default();
    for (i, image) in images.iter().enumerate() {
        transcribe_one(config, geometry, image, &out_dir, &mut summary);
        if let Some(progress) = on_progress {
            progress(i + 1);
        }
    }

    info!(
        written = summary.written,
        failed = summary.failed,
        missing_sidecars = summary.missing_sidecars,
        "Transcription complete"
    );
    Ok(summary)
}

fn transcribe_one(
    config: &RunConfig,
    geometry: &ImageGeometry,
    image: &ReconstructedImage,
    out_dir: &Path,
    summary: &mut TranscribeSummary,
) {
    let data = match read_f32_image(&image.path, geometry.image_shape()) {
        Ok(data) => data,
        Err(e) => {
            warn!(file = %image.path.display(), error = %e, "Cannot read reconstructed image");
            summary.failed += 1;
            return;
        }
    };

    let sidecar = config.sidecar_path(image.batch, image.burst);
    let mut header = match fs::read_to_string(&sidecar) {
        Ok(text) => sidecar_header(&text),
        Err(e) => {
            warn!(
                sidecar = %sidecar.display(),
                error = %e,
                "Burst sidecar missing; writing image without metadata"
            );
            summary.missing_sidecars += 1;
            FitsHeader::new()
        }
    };
    if config.instrument.family == SourceFamily::RawBuffer {
        for note in RECONSTRUCTED_TIMESTAMP_NOTES {
            header.push_comment(note);
        }
    }

    let out = image.output_path(out_dir);
    match write_image(&out, &data, &header) {
        Ok(()) => {
            info!(file = %out.display(), "Wrote FITS image");
            summary.written += 1;
        }
        Err(e) => {
            warn!(file = %out.display(), error = %e, "Failed to write FITS image");
            summary.failed += 1;
        }
    }
}
