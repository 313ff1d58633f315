#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use helios_core::frame::SourceFamily;
use helios_core::io::fits::{FitsHeader, FitsWriter, PixelEncoding};
use helios_core::pipeline::config::{GeometryOverride, RunConfig};
use ndarray::Array2;

pub const OBS_DATE: &str = "20230401";
pub const OBS_TIME: &str = "153000";

/// Raw u16 buffer of `data_shape` with `value` in the top-left `image_shape`
/// corner and zero overscan elsewhere, flattened row-major.
pub fn raw_buffer(data_shape: (usize, usize), image_shape: (usize, usize), value: u16) -> Vec<u16> {
    let (rows, cols) = data_shape;
    let mut samples = vec![0u16; rows * cols];
    for r in 0..image_shape.0 {
        for c in 0..image_shape.1 {
            samples[r * cols + c] = value;
        }
    }
    samples
}

pub fn write_raw(path: &Path, samples: &[u16]) {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    fs::write(path, bytes).unwrap();
}

/// File name carrying `index` least-significant digit first.
pub fn raw_name(index: usize) -> String {
    let digits: String = format!("{index:010}").chars().rev().collect();
    format!("{digits}.dat")
}

/// `count` raw frames in `dir`, named by reversed index, each filled with
/// `value(index)`. Returned in index order.
pub fn write_raw_set(
    dir: &Path,
    count: usize,
    data_shape: (usize, usize),
    image_shape: (usize, usize),
    value: impl Fn(usize) -> u16,
) -> Vec<PathBuf> {
    fs::create_dir_all(dir).unwrap();
    (0..count)
        .map(|i| {
            let path = dir.join(raw_name(i));
            write_raw(&path, &raw_buffer(data_shape, image_shape, value(i)));
            path
        })
        .collect()
}

/// Multi-extension FITS file with one image extension per frame.
pub fn write_fits_frames(path: &Path, frames: &[Array2<f32>], primary: &FitsHeader) {
    let mut writer = FitsWriter::create(path, primary).unwrap();
    for frame in frames {
        writer
            .append_image(&FitsHeader::new(), frame, PixelEncoding::Unsigned16)
            .unwrap();
    }
    writer.finalize().unwrap();
}

/// Raw-family configuration rooted at `root`, with dark/flat/data/work
/// sub-directories and the given burst size.
pub fn test_config(root: &Path, burst_number: usize) -> RunConfig {
    let mut config = RunConfig::default();
    config.instrument.name = "TEST".into();
    config.instrument.family = SourceFamily::RawBuffer;
    config.instrument.burst_number = burst_number;
    config.instrument.obs_date = OBS_DATE.into();
    config.instrument.obs_time = OBS_TIME.into();
    config.instrument.exposure_ms = 15.0;
    config.paths.dark_base = root.join("dark");
    config.paths.flat_base = root.join("flat");
    config.paths.data_base = root.join("data");
    config.paths.work_base = root.join("work");
    config
}

pub fn pin_geometry(config: &mut RunConfig, data_shape: [usize; 2], image_shape: [usize; 2]) {
    config.instrument.geometry = Some(GeometryOverride {
        data_shape,
        image_shape,
    });
}
