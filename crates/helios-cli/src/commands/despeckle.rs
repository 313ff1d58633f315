use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use helios_core::kisip::discover_batches;
use helios_core::pipeline::despeckle_all;

use crate::progress::BarReporter;
use crate::summary::print_despeckle;

use super::{fail_if_degraded, load_config, run_geometry};

#[derive(Args)]
pub struct DespeckleArgs {
    /// Run config file (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Batches to reconstruct (default: every batch found in preSpeckle)
    #[arg(short, long, value_delimiter = ',')]
    pub batches: Vec<usize>,
}

pub fn run(args: &DespeckleArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let geometry = run_geometry(&config)?;

    let batches = if args.batches.is_empty() {
        let instrument = &config.instrument;
        discover_batches(
            &config.pre_speckle_dir(),
            &instrument.burst_form,
            &instrument.obs_date,
            &instrument.obs_time,
        )
        .context("No burst cubes to reconstruct")?
    } else {
        args.batches.clone()
    };

    let reporter = BarReporter::default();
    let report = despeckle_all(&config, &geometry, &batches, &reporter)?;
    print_despeckle(&report);

    fail_if_degraded(report.is_degraded(), || {
        format!(
            "{} of {} batch(es) failed",
            report.outcomes.len() - report.completed(),
            report.outcomes.len()
        )
    })
}
