//! The three plain-text descriptor files read by the reconstruction tool at
//! start-up. Each holds one value per line in a fixed order.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::consts::{INIT_FILE_NAME, INIT_METHOD_NAME, INIT_PROPS_NAME, SIDECAR_EXTENSION};
use crate::error::Result;
use crate::frame::ImageGeometry;
use crate::pipeline::config::RunConfig;

/// Burst index range of one batch.
///
/// `start` is always 0: bursts are assumed to be numbered contiguously from
/// zero within every batch. `end` is -1 when the batch holds no bursts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchIndices {
    pub batch: usize,
    pub start: i64,
    pub end: i64,
}

impl BatchIndices {
    pub fn from_count(batch: usize, count: usize) -> Self {
        Self {
            batch,
            start: 0,
            end: count as i64 - 1,
        }
    }

    pub fn burst_count(&self) -> usize {
        (self.end - self.start + 1).max(0) as usize
    }
}

/// Count the burst cubes of `batch` in the pre-speckle directory.
///
/// An empty batch is logged but not fatal; the tool will run and do nothing.
pub fn resolve_indices(config: &RunConfig, batch: usize) -> Result<BatchIndices> {
    let pattern = config.instrument.burst_form.batch_glob(
        &config.instrument.obs_date,
        &config.instrument.obs_time,
        batch,
    );
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&config.pre_speckle_dir().to_string_lossy()),
        pattern
    );
    info!(batch, pattern = %full, "Searching for burst files");

    let count = glob::glob(&full)?
        .collect::<std::result::Result<Vec<PathBuf>, glob::GlobError>>()?
        .iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) != Some(SIDECAR_EXTENSION))
        .count();

    if count == 0 {
        error!(batch, files = count, "Batch has no burst files");
        warn!(batch, "The reconstruction might run, but will ultimately do nothing");
    } else {
        info!(batch, files = count, "Batch burst files found");
    }

    let indices = BatchIndices::from_count(batch, count);
    info!(batch, start = indices.start, end = indices.end, "Batch indices set");
    Ok(indices)
}

/// Rendered contents of the three descriptor files for one batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobDescriptor {
    pub indices: BatchIndices,
    pub init_file: String,
    pub init_method: String,
    pub init_props: String,
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

/// Reals always carry a decimal point: `5.0`, not `5`.
fn real(value: f64) -> String {
    format!("{value:?}")
}

impl JobDescriptor {
    pub fn new(config: &RunConfig, geometry: &ImageGeometry, indices: BatchIndices) -> Self {
        let instrument = &config.instrument;
        let (date, time) = (&instrument.obs_date, &instrument.obs_time);
        let method = &config.kisip.method;
        let props = &config.kisip.props;

        let burst_stem = config
            .pre_speckle_dir()
            .join(instrument.burst_form.stem(date, time, indices.batch));
        let speckled_stem = config
            .speckle_dir()
            .join(instrument.speckled_form.stem(date, time, indices.batch));

        let init_file = lines([
            burst_stem.display().to_string(),
            format!("{:03}", indices.start),
            format!("{:03}", indices.end),
            speckled_stem.display().to_string(),
            config.noise_file().display().to_string(),
        ]);

        let init_method = lines([
            method.method.to_string(),
            real(method.subfield_arcsec),
            real(method.phase_rec_limit),
            method.ux.to_string(),
            method.uv.to_string(),
            method.max_iter.to_string(),
            real(method.sn_thresh),
            real(method.weight_exp),
            real(method.phase_rec_apod),
            flag(method.noise_filter).to_string(),
        ]);

        let init_props = lines([
            geometry.width().to_string(),
            geometry.height().to_string(),
            instrument.burst_number.to_string(),
            props.header_offset.to_string(),
            real(props.arcsec_per_pix_x),
            real(props.arcsec_per_pix_y),
            real(props.telescope_diameter_mm),
            real(props.wavelength_nm),
            real(props.ao_lock_x),
            real(props.ao_lock_y),
            flag(props.ao_used).to_string(),
        ]);

        Self {
            indices,
            init_file,
            init_method,
            init_props,
        }
    }

    /// Write the three files into `dir`, replacing earlier versions.
    pub fn write(&self, dir: &Path) -> Result<[PathBuf; 3]> {
        let files = [
            (dir.join(INIT_FILE_NAME), &self.init_file),
            (dir.join(INIT_METHOD_NAME), &self.init_method),
            (dir.join(INIT_PROPS_NAME), &self.init_props),
        ];
        for (path, contents) in &files {
            info!(file = %path.display(), "Writing descriptor file");
            fs::write(path, contents)?;
        }
        let [(a, _), (b, _), (c, _)] = files;
        Ok([a, b, c])
    }
}

fn lines<const N: usize>(values: [String; N]) -> String {
    values.iter().fold(String::new(), |mut out, v| {
        let _ = writeln!(out, "{v}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch_indices() {
        let indices = BatchIndices::from_count(3, 0);
        assert_eq!(indices.end, -1);
        assert_eq!(indices.burst_count(), 0);
        assert_eq!(format!("{:03}", indices.end), "-01");
    }

    #[test]
    fn test_reals_keep_decimal_point() {
        assert_eq!(real(5.0), "5.0");
        assert_eq!(real(760.0), "760.0");
        assert_eq!(real(1.2), "1.2");
        assert_eq!(real(-1.0), "-1.0");
    }

    #[test]
    fn test_lines_are_newline_terminated() {
        assert_eq!(lines(["a".to_string(), "1".to_string()]), "a\n1\n");
    }
}
