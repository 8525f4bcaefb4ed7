//! Range checks on raw records.

use tracing::warn;

use crate::error::FeatureError;
use crate::record::RawRecord;

/// Speeds above this (knots) are suspicious but physically possible.
const HIGH_SPEED_KNOTS: f64 = 100.0;

/// Reject positions outside geographic ranges; warn about implausible speeds.
pub fn validate_records(records: &[RawRecord]) -> Result<(), FeatureError> {
    let mut high_speed = 0usize;

    for r in records {
        if r.lat.abs() > 90.0 {
            return Err(FeatureError::LatitudeOutOfRange {
                mmsi: r.mmsi.clone(),
                value: r.lat,
            });
        }
        if r.lon.abs() > 180.0 {
            return Err(FeatureError::LongitudeOutOfRange {
                mmsi: r.mmsi.clone(),
                value: r.lon,
            });
        }
        if r.sog > HIGH_SPEED_KNOTS {
            high_speed += 1;
        }
    }

    if high_speed > 0 {
        warn!(records = high_speed, "very high speed over ground values detected");
    }
    Ok(())
}
