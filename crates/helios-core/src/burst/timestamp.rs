use chrono::{NaiveDateTime, TimeDelta};

use crate::error::{HeliosError, Result};

const START_FORMAT: &str = "%Y%m%d%H%M%S";
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Reconstructs burst start times for cameras that do not record them.
///
/// Burst `n` is assumed to start `n * burst_number * exposure_ms`
/// milliseconds after the observation start. Frame gaps are not accounted
/// for, so the result is an estimate.
#[derive(Clone, Copy, Debug)]
pub struct ObservationClock {
    start: NaiveDateTime,
    exposure_ms: f64,
    burst_span_us: i64,
}

impl ObservationClock {
    /// `date` is `YYYYMMDD` and `time` is `HHMMSS`; extra trailing
    /// characters (fractional seconds) are ignored.
    pub fn new(date: &str, time: &str, exposure_ms: f64, burst_number: usize) -> Result<Self> {
        let date_part = date.get(..8).ok_or_else(|| {
            HeliosError::Timestamp(format!("observation date {date:?} is not YYYYMMDD"))
        })?;
        let time_part = time.get(..6).ok_or_else(|| {
            HeliosError::Timestamp(format!("observation time {time:?} is not HHMMSS"))
        })?;
        let start = NaiveDateTime::parse_from_str(&format!("{date_part}{time_part}"), START_FORMAT)
            .map_err(|e| HeliosError::Timestamp(format!("{date} {time}: {e}")))?;
        if !exposure_ms.is_finite() || exposure_ms < 0.0 {
            return Err(HeliosError::Timestamp(format!(
                "exposure {exposure_ms} ms is not a non-negative duration"
            )));
        }
        Ok(Self {
            start,
            exposure_ms,
            burst_span_us: (exposure_ms * 1000.0 * burst_number as f64).round() as i64,
        })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn exposure_ms(&self) -> f64 {
        self.exposure_ms
    }

    pub fn burst_start(&self, burst_index: usize) -> NaiveDateTime {
        self.start + TimeDelta::microseconds(self.burst_span_us * burst_index as i64)
    }

    /// ISO-8601 start of a burst with millisecond precision.
    pub fn burst_timestamp(&self, burst_index: usize) -> String {
        self.burst_start(burst_index).format(ISO_FORMAT).to_string()
    }
}
