use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use helios_core::pipeline::run_all;

use crate::progress::BarReporter;
use crate::summary::{print_calibration, print_despeckle, print_run_header, print_transcription};

use super::{fail_if_degraded, load_config};

#[derive(Args)]
pub struct RunArgs {
    /// Run config file (TOML)
    #[arg(short, long)]
    pub config: PathBuf,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    print_run_header(&config);

    let reporter = BarReporter::default();
    let outcome = run_all(&config, &reporter)?;

    print_calibration(&outcome.calibration);
    print_despeckle(&outcome.despeckle);
    if let Some(ref summary) = outcome.transcription {
        print_transcription(summary);
    }

    println!(
        "Output saved to {}",
        config.post_speckle_dir().display()
    );
    fail_if_degraded(outcome.is_degraded(), || {
        "Run finished with warnings; see the log for details".to_string()
    })
}
