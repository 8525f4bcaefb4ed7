//! Chunk rows -> model input.
//!
//! Chunk payloads are loosely typed JSON. Preparing the matrix never fails a chunk:
//! columns the model expects but no row carries are filled with `0.0`, and values that
//! are not finite numbers are coerced to `0.0`.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use vesselflow_features::FEATURE_NAMES;

/// Neutral value for absent or non-numeric features.
const DEFAULT_FEATURE_VALUE: f64 = 0.0;

/// One vessel row as stored in a chunk payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkRow {
    #[serde(default)]
    pub mmsi: JsonValue,
    #[serde(default)]
    pub features: Map<String, JsonValue>,
}

/// Dense row-major matrix handed to a [`Classifier`](crate::Classifier).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    data: Vec<f64>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            data: Vec::new(),
        }
    }

    /// Build from explicit rows (every row must match the column count).
    pub fn from_rows(columns: Vec<String>, rows: &[Vec<f64>]) -> Self {
        let mut matrix = Self::new(columns);
        for row in rows {
            matrix.push_row(row);
        }
        matrix
    }

    pub fn push_row(&mut self, row: &[f64]) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.data.extend_from_slice(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        if self.columns.is_empty() {
            0
        } else {
            self.data.len() / self.columns.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.columns.len().max(1))
    }
}

/// A chunk ready for inference: the matrix plus row-aligned vessel ids.
#[derive(Debug, Clone)]
pub struct PreparedChunk {
    pub matrix: FeatureMatrix,
    /// `vessel_ids[i]` identifies matrix row `i`.
    pub vessel_ids: Vec<String>,
    /// Model columns no row carried (filled with the default).
    pub missing_columns: Vec<String>,
}

/// The 50-column schema produced by feature extraction.
pub fn default_feature_columns() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Build the model input for `rows` using the model's `columns`.
pub fn prepare_matrix(rows: &[ChunkRow], columns: &[String]) -> PreparedChunk {
    let missing_columns: Vec<String> = columns
        .iter()
        .filter(|c| c.as_str() != "mmsi" && !rows.iter().any(|r| r.features.contains_key(c.as_str())))
        .cloned()
        .collect();

    let mut matrix = FeatureMatrix::new(columns.to_vec());
    let mut vessel_ids = Vec::with_capacity(rows.len());
    let mut buf = Vec::with_capacity(columns.len());

    for (i, row) in rows.iter().enumerate() {
        buf.clear();
        buf.extend(
            columns
                .iter()
                .map(|c| row.features.get(c).map_or(DEFAULT_FEATURE_VALUE, coerce_numeric)),
        );
        matrix.push_row(&buf);
        vessel_ids.push(vessel_id(&row.mmsi, i));
    }

    PreparedChunk {
        matrix,
        vessel_ids,
        missing_columns,
    }
}

fn coerce_numeric(value: &JsonValue) -> f64 {
    let parsed = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .unwrap_or(DEFAULT_FEATURE_VALUE)
}

fn vessel_id(mmsi: &JsonValue, position: usize) -> String {
    match mmsi {
        JsonValue::String(s) if !s.is_empty() => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        _ => position.to_string(),
    }
}
