//! Per-vessel trajectory summarization.
//!
//! Model:
//! - Group records by MMSI (first-seen order), drop vessels with fewer than
//!   [`MIN_POINTS_PER_VESSEL`] reports.
//! - Sort each vessel's reports by timestamp (stable).
//! - Emit the 50 features of [`FEATURE_NAMES`](crate::FEATURE_NAMES) in schema order.
//!
//! Features without a cheap incremental computation (acceleration, turn rate, shore
//! distance, activity windows, circular variance, linearity) are fixed constants. The
//! trained model was fitted on these same constants.

use std::collections::HashMap;

use crate::record::RawRecord;
use crate::schema::{FEATURE_COUNT, FeatureVector};

/// Vessels with fewer reports carry too little signal and are dropped.
pub const MIN_POINTS_PER_VESSEL: usize = 5;

/// Rough degrees-to-kilometres factor for the planar distance approximation.
const KM_PER_DEGREE: f64 = 111.0;

/// Speed (knots) below which a report counts as stationary.
const STATIONARY_SOG: f64 = 0.5;

/// Consecutive-point distance (km) above which a report counts as a speed change.
const SPEED_CHANGE_KM: f64 = 0.1;

/// Floor for divisors that may legitimately be zero.
const EPSILON: f64 = 0.001;

const DIRECTION_CHANGES: f64 = 0.0;
const ACCELERATION_MEAN: f64 = 0.0;
const ACCELERATION_STD: f64 = 0.0;
const TURN_RATE_MEAN: f64 = 0.0;
const TURN_RATE_STD: f64 = 0.0;
const DISTANCE_FROM_SHORE_MEAN: f64 = 10.0;
const DISTANCE_FROM_SHORE_MIN: f64 = 5.0;
const IN_PORT_RATIO: f64 = 0.1;
const NIGHT_ACTIVITY_RATIO: f64 = 0.3;
const WEEKEND_ACTIVITY_RATIO: f64 = 0.3;
const CIRCULAR_VARIANCE: f64 = 0.0;
const LINEARITY_INDEX: f64 = 0.5;

/// Summarize every qualifying vessel, in the order vessels first appear in `records`.
pub fn extract_features(records: &[RawRecord]) -> Vec<FeatureVector> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&RawRecord>> = HashMap::new();

    for r in records {
        groups
            .entry(r.mmsi.as_str())
            .or_insert_with(|| {
                order.push(r.mmsi.as_str());
                Vec::new()
            })
            .push(r);
    }

    order
        .into_iter()
        .filter_map(|mmsi| {
            let mut track = groups.remove(mmsi)?;
            if track.len() < MIN_POINTS_PER_VESSEL {
                return None;
            }
            track.sort_by_key(|r| r.timestamp);
            Some(summarize_track(mmsi, &track))
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Stats {
    mean: f64,
    std: f64,
    min: f64,
    max: f64,
}

impl Stats {
    fn of(values: impl Iterator<Item = f64> + Clone) -> Self {
        let n = values.clone().count() as f64;
        let mean = values.clone().sum::<f64>() / n;
        let (min, max) = values
            .clone()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        // Sample standard deviation (n - 1).
        let var = if n > 1.0 {
            values.map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };
        Self {
            mean,
            std: var.sqrt(),
            min,
            max,
        }
    }

    fn range(&self) -> f64 {
        self.max - self.min
    }
}

fn summarize_track(mmsi: &str, track: &[&RawRecord]) -> FeatureVector {
    let n = track.len();
    let channels: [Stats; 5] = [
        Stats::of(track.iter().map(|r| r.lat)),
        Stats::of(track.iter().map(|r| r.lon)),
        Stats::of(track.iter().map(|r| r.sog)),
        Stats::of(track.iter().map(|r| r.cog)),
        Stats::of(track.iter().map(|r| r.heading)),
    ];
    let [lat, lon, sog, cog, _heading] = channels;

    let span_secs = match (track.first(), track.last()) {
        (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    };
    let span_hours = span_secs / 3600.0;

    let legs: Vec<f64> = track
        .windows(2)
        .map(|w| {
            let dlat = w[1].lat - w[0].lat;
            let dlon = w[1].lon - w[0].lon;
            (dlat * dlat + dlon * dlon).sqrt() * KM_PER_DEGREE
        })
        .collect();
    let total_distance: f64 = legs.iter().sum();

    let stationary = track.iter().filter(|r| r.sog < STATIONARY_SOG).count() as f64;
    let moving = n as f64 - stationary;
    let speed_changes = legs.iter().filter(|d| **d > SPEED_CHANGE_KM).count() as f64;
    let diagonal_km = (lat.range().powi(2) + lon.range().powi(2)).sqrt() * KM_PER_DEGREE;

    let mut values = Vec::with_capacity(FEATURE_COUNT);
    values.extend(channels.iter().map(|s| s.mean));
    values.extend(channels.iter().map(|s| s.std));
    values.extend(channels.iter().map(|s| s.min));
    values.extend(channels.iter().map(|s| s.max));
    values.extend(channels.iter().map(Stats::range));
    values.extend([
        total_distance,
        total_distance / span_hours.max(EPSILON),
        sog.max,
        span_hours,
        n as f64,
        span_secs / (n.saturating_sub(1).max(1)) as f64,
        speed_changes,
        DIRECTION_CHANGES,
        stationary,
        moving / n as f64,
        stationary / n as f64,
        ACCELERATION_MEAN,
        ACCELERATION_STD,
        TURN_RATE_MEAN,
        TURN_RATE_STD,
        DISTANCE_FROM_SHORE_MEAN,
        DISTANCE_FROM_SHORE_MIN,
        IN_PORT_RATIO,
        NIGHT_ACTIVITY_RATIO,
        WEEKEND_ACTIVITY_RATIO,
        1.0 - sog.std / sog.mean.max(EPSILON),
        1.0 - cog.std / 360.0,
        total_distance / diagonal_km.max(EPSILON),
        CIRCULAR_VARIANCE,
        LINEARITY_INDEX,
    ]);

    let mut fixed = [0.0; FEATURE_COUNT];
    fixed.copy_from_slice(&values);
    FeatureVector::new(mmsi, fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn report(mmsi: &str, minutes: i64, lat: f64, lon: f64, sog: f64) -> RawRecord {
        RawRecord {
            mmsi: mmsi.to_string(),
            timestamp: t0() + Duration::minutes(minutes),
            lat,
            lon,
            sog,
            cog: 90.0,
            heading: 90.0,
        }
    }

    fn straight_track(mmsi: &str, points: usize) -> Vec<RawRecord> {
        (0..points)
            .map(|i| report(mmsi, i as i64 * 30, 10.0 + i as f64 * 0.01, 20.0, 5.0))
            .collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn vessels_below_five_points_are_dropped() {
        let mut records = straight_track("short", 4);
        records.extend(straight_track("long", 5));

        let vectors = extract_features(&records);
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].mmsi(), "long");
    }

    #[test]
    fn output_follows_first_seen_order() {
        let mut records = Vec::new();
        for i in 0..5 {
            records.push(report("b", i, 1.0, 1.0, 1.0));
            records.push(report("a", i, 1.0, 1.0, 1.0));
            records.push(report("c", i, 1.0, 1.0, 1.0));
        }
        let ids: Vec<_> = extract_features(&records)
            .iter()
            .map(|v| v.mmsi().to_string())
            .collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[test]
    fn time_features_use_sorted_timestamps() {
        let mut records = straight_track("v", 5);
        records.reverse();

        let v = &extract_features(&records)[0];
        // 4 legs of 30 minutes.
        assert!(close(v.get("time_span_hours").unwrap(), 2.0));
        assert!(close(v.get("avg_time_between_points").unwrap(), 1800.0));
        assert!(close(v.get("num_points").unwrap(), 5.0));
        // 4 legs of 0.01 degree: sorted order means no back-and-forth.
        assert!(close(v.get("total_distance").unwrap(), 4.0 * 0.01 * KM_PER_DEGREE));
        assert!(close(v.get("zigzag_factor").unwrap(), 1.0));
        assert!(close(v.get("avg_speed").unwrap(), 4.0 * 0.01 * KM_PER_DEGREE / 2.0));
    }

    #[test]
    fn positional_statistics() {
        let records: Vec<_> = [1.0, 2.0, 3.0, 4.0, 5.0]
            .iter()
            .enumerate()
            .map(|(i, lat)| report("v", i as i64, *lat, 0.0, 1.0))
            .collect();

        let v = &extract_features(&records)[0];
        assert!(close(v.get("lat_mean").unwrap(), 3.0));
        assert!(close(v.get("lat_std").unwrap(), 2.5_f64.sqrt()));
        assert!(close(v.get("lat_min").unwrap(), 1.0));
        assert!(close(v.get("lat_max").unwrap(), 5.0));
        assert!(close(v.get("lat_range").unwrap(), 4.0));
        assert!(close(v.get("lon_range").unwrap(), 0.0));
    }

    #[test]
    fn moving_and_stationary_split_on_half_a_knot() {
        let sogs = [0.0, 0.49, 0.5, 3.0, 12.0];
        let records: Vec<_> = sogs
            .iter()
            .enumerate()
            .map(|(i, sog)| report("v", i as i64, 0.0, 0.0, *sog))
            .collect();

        let v = &extract_features(&records)[0];
        assert!(close(v.get("stops_count").unwrap(), 2.0));
        assert!(close(v.get("stationary_time_ratio").unwrap(), 0.4));
        assert!(close(v.get("moving_time_ratio").unwrap(), 0.6));
        assert!(close(v.get("max_speed").unwrap(), 12.0));
    }

    #[test]
    fn stationary_vessel_does_not_divide_by_zero() {
        let records: Vec<_> = (0..5).map(|_| report("v", 0, 1.0, 1.0, 0.0)).collect();
        let v = &extract_features(&records)[0];
        assert!(v.values().iter().all(|x| x.is_finite()));
        assert!(close(v.get("total_distance").unwrap(), 0.0));
        assert!(close(v.get("speed_consistency").unwrap(), 1.0));
    }

    #[test]
    fn placeholders_are_fixed() {
        let v = &extract_features(&straight_track("v", 6))[0];
        assert_eq!(v.get("direction_changes"), Some(0.0));
        assert_eq!(v.get("distance_from_shore_mean"), Some(10.0));
        assert_eq!(v.get("distance_from_shore_min"), Some(5.0));
        assert_eq!(v.get("in_port_ratio"), Some(0.1));
        assert_eq!(v.get("night_activity_ratio"), Some(0.3));
        assert_eq!(v.get("weekend_activity_ratio"), Some(0.3));
        assert_eq!(v.get("linearity_index"), Some(0.5));
    }

    #[test]
    fn extraction_is_deterministic() {
        let mut records = straight_track("a", 7);
        records.extend(straight_track("b", 9));
        assert_eq!(extract_features(&records), extract_features(&records));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: a vessel with fewer than five reports never yields a vector,
            /// and every vessel with five or more yields exactly one.
            #[test]
            fn threshold_is_exact(counts in prop::collection::vec(1usize..9, 1..12)) {
                let mut records = Vec::new();
                for (vessel, count) in counts.iter().enumerate() {
                    for i in 0..*count {
                        records.push(report(&vessel.to_string(), i as i64, 0.0, 0.0, 1.0));
                    }
                }

                let vectors = extract_features(&records);
                let expected: Vec<String> = counts
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| **c >= MIN_POINTS_PER_VESSEL)
                    .map(|(v, _)| v.to_string())
                    .collect();
                let got: Vec<String> = vectors.iter().map(|v| v.mmsi().to_string()).collect();
                prop_assert_eq!(got, expected);
            }
        }
    }
}
