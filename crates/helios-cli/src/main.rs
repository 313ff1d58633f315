mod commands;
mod progress;
mod summary;

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "helios", about = "Solar burst calibration and speckle reconstruction driver")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write the log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show frame file metadata and detected geometry
    Info(commands::info::InfoArgs),
    /// Build reference frames, noise cube and burst cubes
    Calibrate(commands::calibrate::CalibrateArgs),
    /// Run speckle reconstruction on existing burst batches
    Despeckle(commands::despeckle::DespeckleArgs),
    /// Convert reconstructed images to FITS
    Transcribe(commands::transcribe::TranscribeArgs),
    /// Run the full pipeline
    Run(commands::pipeline::RunArgs),
    /// Print a default run configuration as TOML
    Config(commands::config::ConfigArgs),
}

impl Commands {
    /// Config file of commands that run pipeline stages.
    fn config_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Calibrate(args) => Some(&args.config),
            Self::Run(args) => Some(&args.config),
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match (&cli.log_file, cli.command.config_path()) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(config)) => Some(commands::load_config(config)?.default_log_file()),
        (None, None) => None,
    };
    init_logging(cli.verbose, log_file.as_ref())?;

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Calibrate(args) => commands::calibrate::run(args),
        Commands::Despeckle(args) => commands::despeckle::run(args),
        Commands::Transcribe(args) => commands::transcribe::run(args),
        Commands::Run(args) => commands::pipeline::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}

fn init_logging(verbose: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some(path) = log_file else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
        return Ok(());
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file).and(std::io::stderr))
        .init();
    Ok(())
}
