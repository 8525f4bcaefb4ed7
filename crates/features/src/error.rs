use thiserror::Error;

/// Input rejected before any chunk is produced.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeatureError {
    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("line {line}: {message}")]
    Malformed { line: u64, message: String },

    #[error("invalid latitude {value} for vessel {mmsi} (must be between -90 and 90)")]
    LatitudeOutOfRange { mmsi: String, value: f64 },

    #[error("invalid longitude {value} for vessel {mmsi} (must be between -180 and 180)")]
    LongitudeOutOfRange { mmsi: String, value: f64 },

    #[error("no valid vessel data found after preprocessing")]
    NoQualifyingVessels,
}
