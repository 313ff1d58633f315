mod common;

use std::fs;

use helios_core::burst::write_bursts;
use helios_core::calibrate::ReferenceFrames;
use helios_core::frame::{ImageGeometry, SourceFamily};
use helios_core::io::fits::{FitsHeader, FitsValue};
use helios_core::pipeline::config::sidecar_of;
use helios_core::pipeline::prepare_directories;
use helios_core::source::{FitsSource, RawBufferSource};
use ndarray::Array2;
use tempfile::tempdir;

use common::{test_config, write_fits_frames, write_raw_set};

const DATA: (usize, usize) = (4, 5);
const IMAGE: (usize, usize) = (3, 4);

fn unit_reference(shape: (usize, usize), dark: f32) -> ReferenceFrames {
    ReferenceFrames {
        avg_dark: Array2::from_elem(shape, dark),
        avg_flat: Array2::from_elem(shape, dark + 100.0),
        gain: Array2::ones(shape),
        gain_zero_count: 0,
        cache_write_failures: 0,
    }
}

fn read_f32_le(path: &std::path::Path) -> Vec<f32> {
    fs::read(path)
        .unwrap()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[test]
fn test_partial_trailing_burst_is_dropped() {
    let dir = tempdir().unwrap();
    let files = write_raw_set(&dir.path().join("data"), 25, DATA, IMAGE, |i| 100 + i as u16);
    let config = test_config(dir.path(), 10);
    prepare_directories(&config).unwrap();

    let source = RawBufferSource::new(config.observation_clock().unwrap());
    let geometry = ImageGeometry::new(DATA, IMAGE).unwrap();
    let reference = unit_reference(IMAGE, 100.0);
    let summary = write_bursts(&config, &source, &files, &geometry, &reference, None).unwrap();

    assert_eq!(summary.bursts_written, 2);
    assert_eq!(summary.frames_read, 25);
    assert_eq!(summary.frames_dropped, 5);
    assert_eq!(summary.batches, vec![0]);

    let first = config.burst_path(0, 0);
    let second = config.burst_path(0, 1);
    assert!(first.is_file());
    assert!(second.is_file());
    assert!(!config.burst_path(0, 2).exists());
    assert_eq!(
        first.file_name().unwrap().to_str().unwrap(),
        "20230401_153000_raw.batch.00.000"
    );

    // Plane k of burst 1 holds frame 10 + k, dark-subtracted.
    let values = read_f32_le(&second);
    let plane = IMAGE.0 * IMAGE.1;
    assert_eq!(values.len(), 10 * plane);
    for k in 0..10 {
        assert!(values[k * plane..(k + 1) * plane]
            .iter()
            .all(|&v| v == (10 + k) as f32));
    }
}

#[test]
fn test_raw_sidecar_carries_reconstructed_time() {
    let dir = tempdir().unwrap();
    let files = write_raw_set(&dir.path().join("data"), 20, DATA, IMAGE, |_| 150);
    let config = test_config(dir.path(), 10);
    prepare_directories(&config).unwrap();

    let source = RawBufferSource::new(config.observation_clock().unwrap());
    let geometry = ImageGeometry::new(DATA, IMAGE).unwrap();
    write_bursts(
        &config,
        &source,
        &files,
        &geometry,
        &unit_reference(IMAGE, 100.0),
        None,
    )
    .unwrap();

    let first = fs::read_to_string(config.sidecar_path(0, 0)).unwrap();
    assert!(first.starts_with("DATE    = '2023-04-01T15:30:00.000'"));
    assert!(first.contains("EXPOSURE="));
    assert!(first.ends_with('\n'));

    // 10 frames of 15 ms per burst.
    let second = fs::read_to_string(config.sidecar_path(0, 1)).unwrap();
    assert!(second.contains("'2023-04-01T15:30:00.150'"));
}

#[test]
fn test_burst_progress_counts_bursts() {
    let dir = tempdir().unwrap();
    let files = write_raw_set(&dir.path().join("data"), 9, DATA, IMAGE, |_| 150);
    let config = test_config(dir.path(), 3);
    prepare_directories(&config).unwrap();

    let source = RawBufferSource::new(config.observation_clock().unwrap());
    let geometry = ImageGeometry::new(DATA, IMAGE).unwrap();
    let seen = std::cell::RefCell::new(Vec::new());
    let on_progress = |done: usize| seen.borrow_mut().push(done);
    write_bursts(
        &config,
        &source,
        &files,
        &geometry,
        &unit_reference(IMAGE, 100.0),
        Some(&on_progress),
    )
    .unwrap();
    assert_eq!(*seen.borrow(), vec![1, 2, 3]);
}

#[test]
fn test_fits_bursts_span_files_and_keep_headers() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let mut primary = FitsHeader::new();
    primary.set("INSTRUME", FitsValue::Text("ROSA".into()));
    let frames: Vec<Array2<f32>> = (0..3)
        .map(|i| Array2::from_elem((3, 4), 200.0 + i as f32))
        .collect();
    let files = vec![data_dir.join("a.fits"), data_dir.join("b.fits")];
    for file in &files {
        write_fits_frames(file, &frames, &primary);
    }

    let mut config = test_config(dir.path(), 4);
    config.instrument.family = SourceFamily::StructuredHeader;
    prepare_directories(&config).unwrap();

    let geometry = ImageGeometry::uniform((3, 4)).unwrap();
    let summary = write_bursts(
        &config,
        &FitsSource::new(),
        &files,
        &geometry,
        &unit_reference((3, 4), 200.0),
        None,
    )
    .unwrap();
    assert_eq!(summary.bursts_written, 1);
    assert_eq!(summary.frames_dropped, 2);

    let cube = config.burst_path(0, 0);
    let values = read_f32_le(&cube);
    // Frames 0, 1, 2 of a.fits then frame 0 of b.fits.
    let expected_planes = [0.0f32, 1.0, 2.0, 0.0];
    for (k, expected) in expected_planes.iter().enumerate() {
        assert!(values[k * 12..(k + 1) * 12].iter().all(|v| v == expected));
    }

    let sidecar = fs::read_to_string(sidecar_of(&cube)).unwrap();
    let (extension, primary_text) = sidecar.split_once("\n\n").unwrap();
    assert!(extension.starts_with("XTENSION= 'IMAGE   '"));
    assert!(extension.contains("NAXIS1  ="));
    assert!(primary_text.starts_with("SIMPLE  ="));
    assert!(primary_text.contains("INSTRUME= 'ROSA    '"));
}

#[test]
fn test_batches_roll_over_after_a_thousand_bursts() {
    let dir = tempdir().unwrap();
    let shape = (1, 2);
    let files = write_raw_set(&dir.path().join("data"), 2005, shape, shape, |_| 150);
    let config = test_config(dir.path(), 2);
    prepare_directories(&config).unwrap();

    let source = RawBufferSource::new(config.observation_clock().unwrap());
    let geometry = ImageGeometry::uniform(shape).unwrap();
    let summary = write_bursts(
        &config,
        &source,
        &files,
        &geometry,
        &unit_reference(shape, 100.0),
        None,
    )
    .unwrap();

    assert_eq!(summary.bursts_written, 1002);
    assert_eq!(summary.frames_dropped, 1);
    assert_eq!(summary.batches, vec![0, 1]);
    assert!(config.burst_path(0, 999).is_file());
    assert!(config.burst_path(1, 0).is_file());
    assert!(config.burst_path(1, 1).is_file());
    assert!(!config.burst_path(1, 2).exists());

    // Burst 1000 starts 1000 * 2 * 15 ms after the run.
    let sidecar = fs::read_to_string(config.sidecar_path(1, 0)).unwrap();
    assert!(sidecar.starts_with("DATE    = '2023-04-01T15:30:30.000'"));
}

#[test]
fn test_failed_cube_write_leaves_no_sidecar() {
    let dir = tempdir().unwrap();
    let files = write_raw_set(&dir.path().join("data"), 10, DATA, IMAGE, |_| 150);
    let config = test_config(dir.path(), 10);
    prepare_directories(&config).unwrap();
    // A directory in place of the cube makes its write fail.
    fs::create_dir_all(config.burst_path(0, 0)).unwrap();

    let source = RawBufferSource::new(config.observation_clock().unwrap());
    let geometry = ImageGeometry::new(DATA, IMAGE).unwrap();
    let result = write_bursts(
        &config,
        &source,
        &files,
        &geometry,
        &unit_reference(IMAGE, 100.0),
        None,
    );

    assert!(result.is_err());
    assert!(!config.sidecar_path(0, 0).exists());
}
