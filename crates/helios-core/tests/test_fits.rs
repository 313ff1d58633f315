mod common;

use helios_core::error::HeliosError;
use helios_core::io::fits::{
    read_primary_image, write_image, FitsHeader, FitsReader, FitsValue, FitsWriter,
    PixelEncoding,
};
use helios_core::source::{FitsSource, FrameSource};
use ndarray::{Array2, Array3};
use tempfile::tempdir;

use common::write_fits_frames;

#[test]
fn test_primary_image_values_and_cards() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("img.fits");
    let data = Array2::from_shape_fn((5, 3), |(r, c)| r as f32 * 10.0 + c as f32 - 0.5);
    let mut header = FitsHeader::new();
    header.set("OBSERVER", FitsValue::Text("O'Neil".into()));
    header.set("EXPOSURE", FitsValue::Float(15.0));
    header.push_comment("synthetic");
    write_image(&path, &data, &header).unwrap();

    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len % 2880, 0);

    assert_eq!(read_primary_image(&path).unwrap(), data);
    let reader = FitsReader::open(&path).unwrap();
    let primary = reader.primary_header();
    assert_eq!(primary.get_int("NAXIS1"), Some(3));
    assert_eq!(primary.get_int("NAXIS2"), Some(5));
    assert_eq!(primary.get("OBSERVER"), Some(&FitsValue::Text("O'Neil".into())));
    assert_eq!(primary.get_float("EXPOSURE"), Some(15.0));
    assert!(primary
        .cards()
        .iter()
        .any(|c| c.keyword == "COMMENT" && c.comment.as_deref() == Some("synthetic")));
}

#[test]
fn test_cube_is_written_with_three_axes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cube.fits");
    let cube = Array3::<f32>::from_elem((4, 2, 3), 1.5);
    write_image(&path, &cube, &FitsHeader::new()).unwrap();

    let reader = FitsReader::open(&path).unwrap();
    assert_eq!(reader.primary_header().axes().unwrap(), vec![3, 2, 4]);
}

#[test]
fn test_extensions_round_trip_unsigned() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("multi.fits");
    let mut primary = FitsHeader::new();
    primary.set("INSTRUME", FitsValue::Text("ROSA".into()));

    let mut writer = FitsWriter::create(&path, &primary).unwrap();
    for i in 0..3u16 {
        let frame = Array2::from_elem((2, 4), 60_000.0 - f32::from(i));
        let mut header = FitsHeader::new();
        header.set("FRAMENO", FitsValue::Integer(i64::from(i)));
        writer
            .append_image(&header, &frame, PixelEncoding::Unsigned16)
            .unwrap();
    }
    assert_eq!(writer.hdus_written(), 4);
    writer.finalize().unwrap();

    let reader = FitsReader::open(&path).unwrap();
    assert_eq!(reader.hdu_count(), 4);
    for i in 0..3 {
        let image = reader.read_image(i + 1).unwrap();
        assert_eq!(image.dim(), (2, 4));
        assert!(image.iter().all(|&v| v == 60_000.0 - i as f32));
        assert_eq!(reader.header(i + 1).unwrap().get_int("FRAMENO"), Some(i as i64));
    }
    assert!(reader.header(4).is_err());
}

#[test]
fn test_non_fits_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("junk.fits");
    std::fs::write(&path, vec![b'x'; 2880]).unwrap();
    assert!(matches!(
        FitsReader::open(&path),
        Err(HeliosError::InvalidFits(_))
    ));
}

#[test]
fn test_fits_source_reads_sub_frames_with_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("obs.fits");
    let mut primary = FitsHeader::new();
    primary.set("INSTRUME", FitsValue::Text("ROSA".into()));
    primary.set("DATE-OBS", FitsValue::Text("2023-04-01T15:30:00".into()));
    let frames: Vec<Array2<f32>> = (0..4)
        .map(|i| Array2::from_elem((3, 5), 100.0 * (i + 1) as f32))
        .collect();
    write_fits_frames(&path, &frames, &primary);

    let source = FitsSource::new();
    let geometry = source.detect_geometry(&path).unwrap();
    assert_eq!(geometry.image_shape(), (3, 5));
    assert_eq!(geometry.data_shape(), (3, 5));
    assert_eq!(source.frames_in(&path).unwrap(), 4);

    let read: Vec<_> = source
        .sub_frames(&path, &geometry)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(read.len(), 4);
    for (i, frame) in read.iter().enumerate() {
        assert_eq!(frame.metadata.sub_index, i);
        assert_eq!(frame.data, frames[i]);
        let headers = frame.metadata.headers.as_ref().unwrap();
        assert_eq!(headers.primary.get_int("NAXIS"), Some(0));
        assert_eq!(headers.extension.get_int("NAXIS1"), Some(5));
    }

    let info = source.source_info(&path).unwrap();
    assert_eq!(info.frames_in_file, 4);
    assert_eq!(info.instrument.as_deref(), Some("ROSA"));
    assert_eq!(info.date_obs.as_deref(), Some("2023-04-01T15:30:00"));
}

#[test]
fn test_fits_frame_with_other_shape_is_rejected() {
    let dir = tempdir().unwrap();
    let sample = dir.path().join("a.fits");
    let other = dir.path().join("b.fits");
    write_fits_frames(&sample, &[Array2::zeros((3, 5))], &FitsHeader::new());
    write_fits_frames(&other, &[Array2::zeros((4, 5))], &FitsHeader::new());

    let source = FitsSource::new();
    let geometry = source.detect_geometry(&sample).unwrap();
    let mut frames = source.sub_frames(&other, &geometry).unwrap();
    assert!(matches!(
        frames.next(),
        Some(Err(HeliosError::GeometryMismatch { .. }))
    ));
}
