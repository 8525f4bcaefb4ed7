//! `vesselflow-features`
//!
//! **Responsibility:** turn raw AIS trajectory records into one fixed-schema
//! [`FeatureVector`] per vessel.
//!
//! Everything here is pure: no IO beyond parsing an in-memory byte slice.

pub mod error;
pub mod extract;
pub mod record;
pub mod schema;
pub mod validate;

pub use error::FeatureError;
pub use extract::{MIN_POINTS_PER_VESSEL, extract_features};
pub use record::{RawRecord, REQUIRED_COLUMNS, parse_csv};
pub use schema::{FEATURE_COUNT, FEATURE_NAMES, FeatureVector};
pub use validate::validate_records;

/// Parse, validate and summarize an uploaded CSV in one step.
///
/// An upload that yields no qualifying vessel is rejected: there is nothing to classify.
pub fn preprocess(bytes: &[u8]) -> Result<Vec<FeatureVector>, FeatureError> {
    let records = parse_csv(bytes)?;
    tracing::info!(records = records.len(), "loaded raw AIS records");

    validate_records(&records)?;

    let vectors = extract_features(&records);
    tracing::info!(vessels = vectors.len(), "extracted vessel features");

    if vectors.is_empty() {
        return Err(FeatureError::NoQualifyingVessels);
    }
    Ok(vectors)
}
