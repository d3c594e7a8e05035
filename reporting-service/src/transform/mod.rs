pub mod derived;
pub mod normalize;
pub mod units;

use chrono::{DateTime, TimeZone, Utc};
use reporting_client::domain::RawSample;

pub use normalize::{normalize, NormalizeStats};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SampleRejection {
    #[error("value is not finite")]
    NonFinite,
    #[error("timestamp {0} outside the sanity window")]
    Timestamp(DateTime<Utc>),
}

/// Pure validation of a raw sample.
///
/// Rules:
/// - value must be finite.
/// - timestamp must be within a broad sanity window [2000-01-01, 2100-01-01).
pub fn validate_sample(sample: &RawSample) -> Result<(), SampleRejection> {
    if !sample.value.is_finite() {
        return Err(SampleRejection::NonFinite);
    }

    let min_ts = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).single();
    let max_ts = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).single();
    let in_window = match (min_ts, max_ts) {
        (Some(min), Some(max)) => sample.timestamp >= min && sample.timestamp < max,
        _ => true,
    };
    if !in_window {
        return Err(SampleRejection::Timestamp(sample.timestamp));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: DateTime<Utc>, value: f64) -> RawSample {
        RawSample {
            component_id: 1,
            timestamp: ts,
            metric: "AC_ACTIVE_POWER".to_string(),
            value,
            unit: "kW".to_string(),
        }
    }

    #[test]
    fn accepts_valid_sample() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(validate_sample(&sample(ts, 1.0)).is_ok());
        assert!(validate_sample(&sample(ts, -3.0)).is_ok());
    }

    #[test]
    fn rejects_non_finite_values() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            validate_sample(&sample(ts, f64::NAN)),
            Err(SampleRejection::NonFinite)
        );
        assert_eq!(
            validate_sample(&sample(ts, f64::INFINITY)),
            Err(SampleRejection::NonFinite)
        );
    }

    #[test]
    fn rejects_out_of_window_timestamps() {
        let ts = Utc.with_ymd_and_hms(1980, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            validate_sample(&sample(ts, 1.0)),
            Err(SampleRejection::Timestamp(_))
        ));
    }
}
