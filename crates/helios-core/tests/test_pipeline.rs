mod common;

use std::fs;

use helios_core::error::HeliosError;
use helios_core::frame::{ImageGeometry, SourceFamily};
use helios_core::io::fits::{read_primary_image, FitsReader, FitsValue};
use helios_core::io::raw::write_f32_raw;
use helios_core::pipeline::config::RunConfig;
use helios_core::pipeline::{prepare_directories, run_calibration, transcribe_all, NoOpReporter};
use helios_core::source::source_for;
use helios_core::transcribe::{find_reconstructed, transcribe_reconstructed};
use ndarray::Array2;
use tempfile::tempdir;

use common::{pin_geometry, test_config, write_raw_set};

const DATA: (usize, usize) = (4, 5);
const IMAGE: (usize, usize) = (3, 4);

/// Darks of 100, flats of 200 and `data_frames` frames of 150.
fn raw_run(root: &std::path::Path, burst_number: usize, data_frames: usize) -> RunConfig {
    let config = test_config(root, burst_number);
    write_raw_set(&config.paths.dark_base, 3, DATA, IMAGE, |_| 100);
    write_raw_set(&config.paths.flat_base, burst_number, DATA, IMAGE, |_| 200);
    write_raw_set(&config.paths.data_base, data_frames, DATA, IMAGE, |_| 150);
    config
}

fn speckled_path(config: &RunConfig, batch: usize, burst: usize) -> std::path::PathBuf {
    let name = config
        .instrument
        .speckled_form
        .render(config.fields(batch, burst));
    config.speckle_dir().join(format!("{name}.final"))
}

#[test]
fn test_calibration_detects_geometry_and_writes_everything() {
    let dir = tempdir().unwrap();
    let config = raw_run(dir.path(), 4, 9);
    let source = source_for(&config).unwrap();

    let output = run_calibration(&config, source.as_ref(), &NoOpReporter).unwrap();

    assert_eq!(output.geometry.data_shape(), DATA);
    assert_eq!(output.geometry.image_shape(), IMAGE);
    assert!(output.reference.gain.iter().all(|&g| g == 1.0));
    assert_eq!(output.bursts.bursts_written, 2);
    assert_eq!(output.bursts.frames_dropped, 1);

    for kind in ["dark", "flat", "gain", "noise"] {
        assert!(config.cache_file(kind).is_file(), "{kind} cache missing");
    }
    let noise = output.noise.unwrap();
    assert_eq!(noise.path, config.noise_file());
    assert!(!noise.fits_copy_failed);
    assert_eq!(output.reference.cache_write_failures, 0);
    assert_eq!(
        fs::metadata(&noise.path).unwrap().len() as usize,
        4 * IMAGE.0 * IMAGE.1 * 4
    );
    assert!(config.burst_path(0, 1).is_file());
    assert!(config.sidecar_path(0, 1).is_file());
}

#[test]
fn test_noise_cube_skipped_when_flats_are_short() {
    let dir = tempdir().unwrap();
    let config = raw_run(dir.path(), 4, 4);
    // Only two flats for a burst of four.
    for i in 2..4 {
        fs::remove_file(config.paths.flat_base.join(common::raw_name(i))).unwrap();
    }
    let source = source_for(&config).unwrap();
    let output = run_calibration(&config, source.as_ref(), &NoOpReporter).unwrap();
    assert!(output.noise.is_none());
    assert!(!config.noise_file().exists());
}

#[test]
fn test_invalid_config_stops_before_any_output() {
    let dir = tempdir().unwrap();
    let mut config = raw_run(dir.path(), 4, 4);
    config.instrument.obs_time = "15h30".into();
    let source = helios_core::source::RawBufferSource::default();
    assert!(matches!(
        run_calibration(&config, &source, &NoOpReporter),
        Err(HeliosError::Configuration(_))
    ));
    assert!(!config.paths.work_base.exists());
}

#[test]
fn test_transcription_merges_sidecar_cards() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path(), 10);
    pin_geometry(&mut config, [4, 5], [3, 4]);
    prepare_directories(&config).unwrap();
    let geometry = ImageGeometry::new(DATA, IMAGE).unwrap();

    let image = Array2::from_shape_fn(IMAGE, |(r, c)| (r * 4 + c) as f32);
    for burst in 0..2 {
        write_f32_raw(&speckled_path(&config, 0, burst), &image).unwrap();
    }
    fs::write(
        config.sidecar_path(0, 0),
        "DATE    = '2023-04-01T15:30:00.000'\nEXPOSURE=                 15.0\n",
    )
    .unwrap();

    let found = find_reconstructed(&config).unwrap();
    assert_eq!(found.len(), 2);

    let summary = transcribe_reconstructed(&config, &geometry, None).unwrap();
    assert_eq!(summary.written, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.missing_sidecars, 1);

    let out = config.post_speckle_dir().join(format!(
        "{}.fits",
        speckled_path(&config, 0, 0)
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
    ));
    assert!(out.to_str().unwrap().ends_with(".000.final.fits"));
    assert_eq!(read_primary_image(&out).unwrap(), image);

    let reader = FitsReader::open(&out).unwrap();
    let header = reader.primary_header();
    assert_eq!(
        header.get("DATE"),
        Some(&FitsValue::Text("2023-04-01T15:30:00.000".into()))
    );
    assert_eq!(header.get_float("EXPOSURE"), Some(15.0));
    let comments: Vec<_> = header
        .cards()
        .iter()
        .filter(|c| c.keyword == "COMMENT")
        .filter_map(|c| c.comment.clone())
        .collect();
    assert_eq!(comments.len(), 2);
    assert!(comments[0].starts_with("WARNING: Timestamps were reconstructed"));
}

#[test]
fn test_structured_family_gets_no_timestamp_comments() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path(), 10);
    config.instrument.family = SourceFamily::StructuredHeader;
    prepare_directories(&config).unwrap();
    let geometry = ImageGeometry::uniform(IMAGE).unwrap();

    write_f32_raw(&speckled_path(&config, 1, 0), &Array2::<f32>::zeros(IMAGE)).unwrap();
    fs::write(config.sidecar_path(1, 0), "INSTRUME= 'ROSA    '\n\nSIMPLE  = T\n").unwrap();

    let summary = transcribe_all(&config, &geometry, &NoOpReporter).unwrap();
    assert_eq!(summary.written, 1);
    assert_eq!(summary.missing_sidecars, 0);

    let out = config
        .post_speckle_dir()
        .join("20230401_153000_speckle.batch.01.000.final.fits");
    let reader = FitsReader::open(&out).unwrap();
    let header = reader.primary_header();
    assert_eq!(header.get("INSTRUME"), Some(&FitsValue::Text("ROSA".into())));
    assert!(header.cards().iter().all(|c| c.keyword != "COMMENT"));
}

#[test]
fn test_wrong_sized_image_counts_as_failed() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), 10);
    prepare_directories(&config).unwrap();
    let geometry = ImageGeometry::new(DATA, IMAGE).unwrap();
    write_f32_raw(&speckled_path(&config, 0, 0), &Array2::<f32>::zeros((2, 2))).unwrap();

    let summary = transcribe_reconstructed(&config, &geometry, None).unwrap();
    assert_eq!(summary.written, 0);
    assert_eq!(summary.failed, 1);
}

#[test]
fn test_transcription_without_images_fails() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), 10);
    prepare_directories(&config).unwrap();
    let geometry = ImageGeometry::new(DATA, IMAGE).unwrap();
    assert!(matches!(
        transcribe_reconstructed(&config, &geometry, None),
        Err(HeliosError::Discovery { .. })
    ));
}

#[cfg(unix)]
#[test]
fn test_full_run_with_simulated_reconstruction() {
    use std::os::unix::fs::PermissionsExt;

    use helios_core::kisip::JobState;
    use helios_core::pipeline::run_all;

    let dir = tempdir().unwrap();
    let mut config = raw_run(dir.path(), 4, 9);

    // Writes one zero image per burst listed in the descriptor.
    let bytes = IMAGE.0 * IMAGE.1 * 4;
    let script = format!(
        "#!/bin/sh\n\
         end=$(sed -n 3p init_file.dat)\n\
         out=$(sed -n 4p init_file.dat)\n\
         i=0\n\
         while [ \"$i\" -le \"$end\" ]; do\n\
         head -c {bytes} /dev/zero > \"$out.$(printf %03d \"$i\").final\"\n\
         i=$((i + 1))\n\
         done\n\
         echo reconstruction done\n"
    );
    let bin = dir.path().join("bin");
    fs::create_dir_all(&bin).unwrap();
    let mpirun = bin.join("mpirun");
    fs::write(&mpirun, script).unwrap();
    fs::set_permissions(&mpirun, fs::Permissions::from_mode(0o755)).unwrap();
    config.kisip.env.bin = bin;
    config.kisip.env.nproc = 1;

    let outcome = run_all(&config, &NoOpReporter).unwrap();

    assert_eq!(outcome.calibration.bursts.batches, vec![0]);
    assert_eq!(outcome.despeckle.outcomes.len(), 1);
    assert_eq!(outcome.despeckle.outcomes[0].state, JobState::Completed);
    let transcription = outcome.transcription.as_ref().unwrap();
    assert_eq!(transcription.written, 2);
    assert_eq!(transcription.missing_sidecars, 0);
    assert!(!outcome.is_degraded());
    assert!(config
        .post_speckle_dir()
        .join("20230401_153000_speckle.batch.00.001.final.fits")
        .is_file());
}
