use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use helios_core::pipeline::transcribe_all;

use crate::progress::BarReporter;
use crate::summary::print_transcription;

use super::{load_config, run_geometry};

#[derive(Args)]
pub struct TranscribeArgs {
    /// Run config file (TOML)
    #[arg(short, long)]
    pub config: PathBuf,
}

pub fn run(args: &TranscribeArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let geometry = run_geometry(&config)?;

    let reporter = BarReporter::default();
    let summary = transcribe_all(&config, &geometry, &reporter)?;
    print_transcription(&summary);
    println!(
        "FITS images saved to {}",
        config.post_speckle_dir().display()
    );
    Ok(())
}
