//! Classification outputs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::JobId;

/// Vessel categories the classifier can emit, in model output order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VesselClass {
    Tug,
    Fishing,
    Pleasure,
    Cargo,
    /// Model emitted an index outside the known label set.
    Unknown,
}

impl VesselClass {
    /// Known labels indexed by model output position.
    pub const LABELS: [VesselClass; 4] = [
        VesselClass::Tug,
        VesselClass::Fishing,
        VesselClass::Pleasure,
        VesselClass::Cargo,
    ];

    pub fn from_index(index: usize) -> Self {
        Self::LABELS.get(index).copied().unwrap_or(VesselClass::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VesselClass::Tug => "TUG",
            VesselClass::Fishing => "FISHING",
            VesselClass::Pleasure => "PLEASURE",
            VesselClass::Cargo => "CARGO",
            VesselClass::Unknown => "UNKNOWN",
        }
    }
}

impl core::fmt::Display for VesselClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prediction for one vessel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub mmsi: String,
    /// Raw class index emitted by the model.
    pub prediction: usize,
    pub class_name: VesselClass,
    /// In \[0, 1\]; `0.0` when the model gave no probabilities.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_probabilities: Option<BTreeMap<VesselClass, f64>>,
}

impl PredictionResult {
    pub fn new(mmsi: impl Into<String>, prediction: usize, probabilities: Option<&[f64]>) -> Self {
        let confidence = probabilities
            .map(|p| p.iter().copied().fold(0.0_f64, f64::max).clamp(0.0, 1.0))
            .unwrap_or(0.0);

        let class_probabilities = probabilities.map(|p| {
            p.iter()
                .enumerate()
                .map(|(i, prob)| (VesselClass::from_index(i), *prob))
                .collect()
        });

        Self {
            mmsi: mmsi.into(),
            prediction,
            class_name: VesselClass::from_index(prediction),
            confidence,
            class_probabilities,
        }
    }
}

/// All predictions of one chunk. At most one batch exists per `(job_id, chunk_index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBatch {
    pub job_id: JobId,
    pub chunk_index: u32,
    pub predictions: Vec<PredictionResult>,
    pub chunk_size: usize,
    /// `true` when the model failed and the fallback class was used.
    #[serde(default)]
    pub fallback: bool,
    pub processed_at: DateTime<Utc>,
}
