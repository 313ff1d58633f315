use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use helios_core::pipeline::run_calibration;
use helios_core::source::source_for;

use crate::progress::BarReporter;
use crate::summary::{print_calibration, print_run_header};

use super::load_config;

#[derive(Args)]
pub struct CalibrateArgs {
    /// Run config file (TOML)
    #[arg(short, long)]
    pub config: PathBuf,
}

pub fn run(args: &CalibrateArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    print_run_header(&config);

    let source = source_for(&config)?;
    let reporter = BarReporter::default();
    let output = run_calibration(&config, source.as_ref(), &reporter)?;

    print_calibration(&output);
    println!(
        "Burst cubes saved to {}",
        config.pre_speckle_dir().display()
    );
    Ok(())
}
