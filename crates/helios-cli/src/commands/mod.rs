pub mod calibrate;
pub mod config;
pub mod despeckle;
pub mod info;
pub mod pipeline;
pub mod transcribe;

use std::path::Path;

use anyhow::{Context, Result};
use helios_core::frame::{FrameRole, ImageGeometry};
use helios_core::frameset::FrameSet;
use helios_core::pipeline::config::RunConfig;
use helios_core::pipeline::resolve_geometry;
use helios_core::source::source_for;

/// Read and validate a TOML run configuration.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: RunConfig = toml::from_str(&contents).context("Invalid run config")?;
    config.validate().context("Invalid run config")?;
    Ok(config)
}

/// Fail with `detail` when the outcome is degraded, so the exit status
/// reflects soft failures that were only logged.
pub fn fail_if_degraded(degraded: bool, detail: impl FnOnce() -> String) -> Result<()> {
    if degraded {
        anyhow::bail!(detail());
    }
    Ok(())
}

/// Geometry of a run whose calibration already happened: the pinned one, or
/// detected again from the first flat.
pub fn run_geometry(config: &RunConfig) -> Result<ImageGeometry> {
    if let Some(pinned) = &config.instrument.geometry {
        return Ok(pinned.to_geometry()?);
    }
    let source = source_for(config)?;
    let flats = FrameSet::discover(
        FrameRole::Flat,
        &config.paths.flat_base,
        &config.paths.flat_pattern,
    )?;
    let files = source.order_files(flats.files)?;
    let sample = files
        .first()
        .context("No flat frames to detect geometry from")?;
    Ok(resolve_geometry(config, source.as_ref(), sample)?)
}
