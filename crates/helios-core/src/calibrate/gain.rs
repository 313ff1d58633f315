use ndarray::{Array2, Zip};
use rayon::prelude::*;
use tracing::{error, info};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{HeliosError, Result};

/// Gain table and the statistics it was derived from.
#[derive(Clone, Debug)]
pub struct GainTable {
    pub gain: Array2<f32>,
    /// Median of `avg_flat - avg_dark`.
    pub median: f32,
    /// Pixels where `avg_flat == avg_dark`; their gain is ±inf or NaN.
    pub zero_count: usize,
}

/// Median of `values`, reordering them in place. Even lengths give the mean
/// of the two middle values.
pub fn median(values: &mut [f32]) -> Result<f32> {
    let n = values.len();
    if n == 0 {
        return Err(HeliosError::EmptySequence);
    }
    if n == 1 {
        return Ok(values[0]);
    }
    let mid = n / 2;
    let upper = *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1;
    if n % 2 == 1 {
        return Ok(upper);
    }
    // After selection everything left of `mid` is <= upper; its maximum is
    // the lower middle value.
    let lower = values[..mid]
        .iter()
        .copied()
        .max_by(|a, b| a.total_cmp(b))
        .unwrap_or(upper);
    Ok((lower + upper) / 2.0)
}

/// Pixels where the flat and dark averages coincide.
///
/// Rows are counted in parallel for images >= 256x256.
pub fn count_zero_denominators(avg_dark: &Array2<f32>, avg_flat: &Array2<f32>) -> usize {
    let (h, w) = avg_flat.dim();
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h)
            .into_par_iter()
            .map(|row| {
                avg_flat
                    .row(row)
                    .iter()
                    .zip(avg_dark.row(row).iter())
                    .filter(|&(&f, &d)| f - d == 0.0)
                    .count()
            })
            .sum()
    } else {
        Zip::from(avg_flat)
            .and(avg_dark)
            .fold(0, |acc, &f, &d| acc + usize::from(f - d == 0.0))
    }
}

/// `gain = median(d) / d` with `d = avg_flat - avg_dark`.
///
/// Zero denominators are counted and reported as a numeric-domain error in
/// the log; the affected pixels keep the IEEE result so the run can continue.
pub fn compute_gain(avg_dark: &Array2<f32>, avg_flat: &Array2<f32>) -> Result<GainTable> {
    if avg_dark.dim() != avg_flat.dim() {
        return Err(HeliosError::NumericDomain(format!(
            "dark {:?} and flat {:?} shapes differ",
            avg_dark.dim(),
            avg_flat.dim()
        )));
    }
    info!("Computing gain table");

    let diff = avg_flat - avg_dark;
    let mut scratch: Vec<f32> = diff.iter().copied().collect();
    let median = median(&mut scratch)?;

    let (h, w) = diff.dim();
    let mut gain = Array2::<f32>::zeros((h, w));
    let zip = Zip::from(&mut gain).and(&diff);
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        zip.par_for_each(|g, &d| *g = median / d);
    } else {
        zip.for_each(|g, &d| *g = median / d);
    }

    let zero_count = count_zero_denominators(avg_dark, avg_flat);
    if zero_count > 0 {
        let err = HeliosError::NumericDomain(format!(
            "{zero_count} gain pixels divide by zero (flat equals dark)"
        ));
        error!(zero_count, "{err}; continuing");
    }
    info!(median, "Gain table computed");

    Ok(GainTable {
        gain,
        median,
        zero_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]).unwrap(), 2.0);
    }

    #[test]
    fn test_median_even_averages_middle_pair() {
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
    }

    #[test]
    fn test_median_empty() {
        assert!(median(&mut []).is_err());
    }

    #[test]
    fn test_zero_count_matches_on_parallel_path() {
        let dark = Array2::from_elem((256, 256), 10.0f32);
        let mut flat = Array2::from_elem((256, 256), 20.0f32);
        flat[[0, 0]] = 10.0;
        flat[[255, 17]] = 10.0;
        flat[[128, 255]] = 10.0;
        assert_eq!(count_zero_denominators(&dark, &flat), 3);
        assert_eq!(compute_gain(&dark, &flat).unwrap().zero_count, 3);
    }
}
