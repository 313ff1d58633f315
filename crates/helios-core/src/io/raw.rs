use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{s, Array2, ArrayBase, Data, Dimension};

use crate::error::{HeliosError, Result};
use crate::frame::ImageGeometry;

/// Read a headerless dump of little-endian u16 samples.
pub fn read_raw_samples(path: &Path) -> Result<Vec<u16>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len() as usize;
    if len % 2 != 0 {
        return Err(HeliosError::GeometryMismatch {
            path: path.to_path_buf(),
            expected: "an even number of bytes".into(),
            found: format!("{len} bytes"),
        });
    }
    let mut reader = BufReader::new(file);
    let mut samples = vec![0u16; len / 2];
    reader.read_u16_into::<LittleEndian>(&mut samples)?;
    Ok(samples)
}

/// Read one raw frame and crop it to the usable image region.
///
/// The file must hold exactly `data_shape` samples.
pub fn read_raw_frame(path: &Path, geometry: &ImageGeometry) -> Result<Array2<f32>> {
    let samples = read_raw_samples(path)?;
    if samples.len() != geometry.data_len() {
        return Err(HeliosError::GeometryMismatch {
            path: path.to_path_buf(),
            expected: format!("{} samples ({geometry})", geometry.data_len()),
            found: format!("{} samples", samples.len()),
        });
    }
    let buffer = Array2::from_shape_vec(
        geometry.data_shape(),
        samples.into_iter().map(f32::from).collect(),
    )
    .map_err(|e| HeliosError::GeometryDetection(e.to_string()))?;

    let (rows, cols) = geometry.image_shape();
    Ok(buffer.slice(s![..rows, ..cols]).to_owned())
}

/// Write an array as headerless little-endian f32 in row-major order.
pub fn write_f32_raw<S, D>(path: &Path, data: &ArrayBase<S, D>) -> Result<()>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for &v in data.iter() {
        writer.write_f32::<LittleEndian>(v)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a headerless little-endian f32 image of the given `(rows, cols)` shape.
pub fn read_f32_image(path: &Path, shape: (usize, usize)) -> Result<Array2<f32>> {
    let file = File::open(path)?;
    let expected = shape.0 * shape.1 * 4;
    let len = file.metadata()?.len() as usize;
    if len != expected {
        return Err(HeliosError::GeometryMismatch {
            path: path.to_path_buf(),
            expected: format!("{expected} bytes ({}x{} f32)", shape.0, shape.1),
            found: format!("{len} bytes"),
        });
    }
    let mut reader = BufReader::new(file);
    let mut values = vec![0f32; shape.0 * shape.1];
    reader.read_f32_into::<LittleEndian>(&mut values)?;
    Array2::from_shape_vec(shape, values).map_err(|e| HeliosError::InvalidFits(e.to_string()))
}
