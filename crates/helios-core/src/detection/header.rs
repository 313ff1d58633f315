use crate::error::{HeliosError, Result};
use crate::frame::ImageGeometry;
use crate::io::fits::FitsHeader;

/// Geometry of a structured-header sub-frame, taken from `NAXIS2` (rows) and
/// `NAXIS1` (cols) of its extension header. These files carry no overscan,
/// so the data and image shapes coincide.
pub fn detect_header_geometry(header: &FitsHeader) -> Result<ImageGeometry> {
    let axis = |key: &str| {
        header
            .get_int(key)
            .filter(|&n| n > 0)
            .map(|n| n as usize)
            .ok_or_else(|| HeliosError::GeometryDetection(format!("header has no usable {key}")))
    };
    let rows = axis("NAXIS2")?;
    let cols = axis("NAXIS1")?;
    ImageGeometry::uniform((rows, cols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fits::FitsValue;

    #[test]
    fn test_rows_from_naxis2() {
        let mut header = FitsHeader::new();
        header.set("NAXIS", FitsValue::Integer(2));
        header.set("NAXIS1", FitsValue::Integer(640));
        header.set("NAXIS2", FitsValue::Integer(480));
        let geometry = detect_header_geometry(&header).unwrap();
        assert_eq!(geometry.image_shape(), (480, 640));
        assert_eq!(geometry.data_shape(), (480, 640));
    }

    #[test]
    fn test_missing_axis_fails() {
        let mut header = FitsHeader::new();
        header.set("NAXIS1", FitsValue::Integer(640));
        assert!(matches!(
            detect_header_geometry(&header),
            Err(HeliosError::GeometryDetection(_))
        ));
    }
}
