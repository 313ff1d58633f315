use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use helios_core::frame::SourceFamily;
use helios_core::source::inspector;

#[derive(Clone, Copy, ValueEnum)]
pub enum FamilyArg {
    /// Headerless u16 frame dumps
    Raw,
    /// FITS files with one frame per image extension
    Fits,
}

impl From<FamilyArg> for SourceFamily {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Raw => SourceFamily::RawBuffer,
            FamilyArg::Fits => SourceFamily::StructuredHeader,
        }
    }
}

#[derive(Args)]
pub struct InfoArgs {
    /// Input frame file
    pub file: PathBuf,

    /// Camera family of the file
    #[arg(long, value_enum, default_value = "raw")]
    pub family: FamilyArg,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let source = inspector(args.family.into());
    let info = source.source_info(&args.file)?;
    let (data_rows, data_cols) = info.geometry.data_shape();

    println!("File:        {}", info.filename.display());
    println!("Family:      {}", info.family);
    println!("Frames:      {}", info.frames_in_file);
    println!("Buffer:      {}x{}", data_cols, data_rows);
    println!("Image:       {}x{}", info.geometry.width(), info.geometry.height());

    if let Some(ref inst) = info.instrument {
        println!("Instrument:  {}", inst);
    }
    if let Some(ref date) = info.date_obs {
        println!("Date:        {}", date);
    }

    let pixels = info.geometry.width() * info.geometry.height() * info.frames_in_file;
    let cube_mb = (pixels * std::mem::size_of::<f32>()) as f64 / (1024.0 * 1024.0);
    println!("As f32:      {:.1} MB", cube_mb);

    Ok(())
}
