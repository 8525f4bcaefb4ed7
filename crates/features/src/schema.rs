//! The fixed feature schema consumed by the classifier.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Number of features per vessel.
pub const FEATURE_COUNT: usize = 50;

/// Feature names in model column order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "lat_mean",
    "lon_mean",
    "sog_mean",
    "cog_mean",
    "heading_mean",
    "lat_std",
    "lon_std",
    "sog_std",
    "cog_std",
    "heading_std",
    "lat_min",
    "lon_min",
    "sog_min",
    "cog_min",
    "heading_min",
    "lat_max",
    "lon_max",
    "sog_max",
    "cog_max",
    "heading_max",
    "lat_range",
    "lon_range",
    "sog_range",
    "cog_range",
    "heading_range",
    "total_distance",
    "avg_speed",
    "max_speed",
    "time_span_hours",
    "num_points",
    "avg_time_between_points",
    "speed_changes",
    "direction_changes",
    "stops_count",
    "moving_time_ratio",
    "stationary_time_ratio",
    "acceleration_mean",
    "acceleration_std",
    "turn_rate_mean",
    "turn_rate_std",
    "distance_from_shore_mean",
    "distance_from_shore_min",
    "in_port_ratio",
    "night_activity_ratio",
    "weekend_activity_ratio",
    "speed_consistency",
    "course_consistency",
    "zigzag_factor",
    "circular_variance",
    "linearity_index",
];

/// Position of a feature in [`FEATURE_NAMES`].
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// Summary of one vessel's trajectory.
///
/// Serializes as a chunk row: `{ "mmsi": ..., "features": { name: value, ... } }`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    mmsi: String,
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn new(mmsi: impl Into<String>, values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            mmsi: mmsi.into(),
            values,
        }
    }

    pub fn mmsi(&self) -> &str {
        &self.mmsi
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|i| self.values[i])
    }

    /// `(name, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Features<'a>(&'a FeatureVector);

        impl Serialize for Features<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
                for (name, value) in self.0.iter() {
                    map.serialize_entry(name, &value)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("mmsi", &self.mmsi)?;
        map.serialize_entry("features", &Features(self))?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let mut names = FEATURE_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FEATURE_COUNT);
    }

    #[test]
    fn serializes_as_named_row() {
        let mut values = [0.0; FEATURE_COUNT];
        values[feature_index("num_points").unwrap()] = 12.0;
        let v = FeatureVector::new("366001", values);

        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["mmsi"], "366001");
        assert_eq!(json["features"]["num_points"], 12.0);
        assert_eq!(json["features"].as_object().unwrap().len(), FEATURE_COUNT);
    }
}
