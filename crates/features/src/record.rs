//! Raw AIS records and CSV parsing.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FeatureError;

/// Columns every upload must carry. Extra columns are ignored.
pub const REQUIRED_COLUMNS: [&str; 7] = ["mmsi", "timestamp", "lat", "lon", "sog", "cog", "heading"];

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// One AIS position report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub mmsi: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// Speed over ground (knots).
    pub sog: f64,
    /// Course over ground (degrees).
    pub cog: f64,
    pub heading: f64,
}

/// Parse an uploaded CSV (header row required).
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<RawRecord>, FeatureError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| malformed(1, e))?
        .clone();

    let mut index = [0usize; REQUIRED_COLUMNS.len()];
    let mut missing = Vec::new();
    for (slot, name) in index.iter_mut().zip(REQUIRED_COLUMNS) {
        match headers.iter().position(|h| h.eq_ignore_ascii_case(name)) {
            Some(i) => *slot = i,
            None => missing.push(name.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(FeatureError::MissingColumns(missing));
    }
    let [mmsi, timestamp, lat, lon, sog, cog, heading] = index;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            malformed(line, e)
        })?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let field = |i: usize| row.get(i).unwrap_or("");

        let id = field(mmsi);
        if id.is_empty() {
            return Err(malformed(line, "empty mmsi"));
        }

        records.push(RawRecord {
            mmsi: id.to_string(),
            timestamp: parse_timestamp(field(timestamp)).ok_or_else(|| {
                malformed(line, format!("unrecognized timestamp `{}`", field(timestamp)))
            })?,
            lat: parse_number(field(lat), "lat", line)?,
            lon: parse_number(field(lon), "lon", line)?,
            sog: parse_number(field(sog), "sog", line)?,
            cog: parse_number(field(cog), "cog", line)?,
            heading: parse_number(field(heading), "heading", line)?,
        });
    }

    Ok(records)
}

/// Accepts RFC 3339 and naive `YYYY-MM-DD[ T]HH:MM:SS[.f]` (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_number(raw: &str, column: &str, line: u64) -> Result<f64, FeatureError> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(malformed(line, format!("column `{column}` is not a number: `{raw}`"))),
    }
}

fn malformed(line: u64, message: impl ToString) -> FeatureError {
    FeatureError::Malformed {
        line,
        message: message.to_string(),
    }
}
