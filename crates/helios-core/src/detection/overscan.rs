use tracing::debug;

use crate::error::{HeliosError, Result};
use crate::frame::ImageGeometry;

/// Indices where a zero run starts or ends in `samples`.
///
/// Equivalent to padding the zero-mask with a `false` sentinel on both ends
/// and keeping the positions where consecutive mask values differ. Starts and
/// ends alternate, beginning with a start; an end may equal `samples.len()`.
pub fn zero_run_boundaries(samples: &[u16]) -> Vec<usize> {
    let mut boundaries = Vec::new();
    let mut previous = false;
    for (i, &v) in samples.iter().enumerate() {
        let zero = v == 0;
        if zero != previous {
            boundaries.push(i);
            previous = zero;
        }
    }
    if previous {
        boundaries.push(samples.len());
    }
    boundaries
}

/// Infer buffer layout and usable region from one raw sample frame whose
/// overscan is zero-filled.
///
/// The first zero run starts after the usable columns of row 0 and ends at
/// the row stride. Each further image row contributes one start/end pair with
/// the same spacing; the first boundary spacing that breaks the pattern marks
/// the start of the bottom overscan, so its position gives the usable rows.
pub fn detect_overscan_geometry(samples: &[u16]) -> Result<ImageGeometry> {
    let b = zero_run_boundaries(samples);
    if b.len() < 3 {
        return Err(HeliosError::GeometryDetection(format!(
            "found {} zero-run boundaries, need at least 3 (no overscan present?)",
            b.len()
        )));
    }

    let image_cols = b[0];
    let stride = b[1];
    if image_cols == 0 {
        return Err(HeliosError::GeometryDetection(
            "sample frame starts with overscan".into(),
        ));
    }
    if samples.len() % stride != 0 {
        return Err(HeliosError::GeometryDetection(format!(
            "sample length {} is not a multiple of the row stride {stride}",
            samples.len()
        )));
    }
    let data_rows = samples.len() / stride;

    let dx1 = b[1] - b[0];
    let dx2 = b[2] - b[1];
    let mismatch = b
        .windows(2)
        .map(|w| w[1] - w[0])
        .position(|d| d != dx1 && d != dx2);

    let image_rows = match mismatch {
        Some(pos) => pos / 2 + 1,
        None if b.len() == 2 * data_rows => data_rows,
        None => {
            return Err(HeliosError::GeometryDetection(format!(
                "regular boundary pattern of length {} does not cover {data_rows} rows",
                b.len()
            )))
        }
    };

    debug!(
        image_cols,
        stride,
        data_rows,
        image_rows,
        boundaries = b.len(),
        "Detected overscan geometry"
    );
    ImageGeometry::new((data_rows, stride), (image_rows, image_cols))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_with_trailing_run() {
        assert_eq!(zero_run_boundaries(&[1, 0, 0, 2, 0]), vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_boundaries_of_worked_example() {
        let mut samples = vec![0u16; 60];
        for r in 0..4 {
            for c in 0..7 {
                samples[r * 10 + c] = 1;
            }
        }
        assert_eq!(
            zero_run_boundaries(&samples),
            vec![7, 10, 17, 20, 27, 30, 37, 60]
        );
    }

    #[test]
    fn test_no_zeros_is_an_error() {
        assert!(detect_overscan_geometry(&[5u16; 16]).is_err());
    }

    #[test]
    fn test_leading_zero_is_an_error() {
        let samples = [0u16, 1, 1, 0, 1, 1];
        assert!(detect_overscan_geometry(&samples).is_err());
    }
}
