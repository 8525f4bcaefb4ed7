//! Multinomial logistic model exported from training.
//!
//! Model file (JSON):
//!
//! ```json
//! {
//!   "feature_columns": ["lat_mean", "..."],
//!   "means":  [0.0, "..."],
//!   "scales": [1.0, "..."],
//!   "weights": [[0.1, "..."], "... one row per class ..."],
//!   "intercepts": [0.0, "..."]
//! }
//! ```
//!
//! `feature_columns` defaults to the extraction schema; `means`/`scales` default to an
//! identity standardization.

use serde::{Deserialize, Serialize};

use crate::classifier::Classifier;
use crate::matrix::{FeatureMatrix, default_feature_columns};
use crate::result::{ClassOutput, ModelError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub feature_columns: Option<Vec<String>>,
    #[serde(default)]
    pub means: Option<Vec<f64>>,
    #[serde(default)]
    pub scales: Option<Vec<f64>>,
    /// One weight row per class, each as wide as `feature_columns`.
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

/// The trained classifier, validated at load time.
#[derive(Debug, Clone)]
pub struct TrainedClassifier {
    columns: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl TrainedClassifier {
    pub fn new(model: LinearModel) -> Result<Self, ModelError> {
        let columns = model.feature_columns.unwrap_or_else(default_feature_columns);
        let width = columns.len();

        if model.weights.is_empty() {
            return Err(ModelError::InvalidModel("model has no classes".to_string()));
        }
        if model.intercepts.len() != model.weights.len() {
            return Err(ModelError::InvalidModel(format!(
                "{} weight rows but {} intercepts",
                model.weights.len(),
                model.intercepts.len()
            )));
        }
        if let Some(bad) = model.weights.iter().position(|w| w.len() != width) {
            return Err(ModelError::InvalidModel(format!(
                "weight row {bad} does not match {width} feature columns"
            )));
        }

        let means = model.means.unwrap_or_else(|| vec![0.0; width]);
        let scales = model.scales.unwrap_or_else(|| vec![1.0; width]);
        if means.len() != width || scales.len() != width {
            return Err(ModelError::InvalidModel(
                "standardization vectors do not match feature columns".to_string(),
            ));
        }

        Ok(Self {
            columns,
            means,
            scales,
            weights: model.weights,
            intercepts: model.intercepts,
        })
    }

    pub fn class_count(&self) -> usize {
        self.weights.len()
    }

    fn predict_row(&self, row: &[f64]) -> Result<ClassOutput, ModelError> {
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.intercepts)
            .map(|(w, b)| {
                let dot: f64 = row
                    .iter()
                    .zip(&self.means)
                    .zip(&self.scales)
                    .zip(w)
                    .map(|(((x, mean), scale), weight)| {
                        let scale = if *scale == 0.0 { 1.0 } else { *scale };
                        (x - mean) / scale * weight
                    })
                    .sum();
                dot + b
            })
            .collect();

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exp.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(ModelError::InferenceFailed(
                "non-finite class scores".to_string(),
            ));
        }
        let probabilities: Vec<f64> = exp.iter().map(|e| e / total).collect();

        let class_index = probabilities
            .iter()
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |best, (i, p)| if *p > best.1 { (i, *p) } else { best })
            .0;

        Ok(ClassOutput::new(class_index).with_probabilities(probabilities))
    }
}

impl Classifier for TrainedClassifier {
    fn name(&self) -> &str {
        "linear"
    }

    fn feature_columns(&self) -> &[String] {
        &self.columns
    }

    fn classify(&self, matrix: &FeatureMatrix) -> Result<Vec<ClassOutput>, ModelError> {
        if matrix.width() != self.columns.len() {
            return Err(ModelError::ShapeMismatch {
                expected: self.columns.len(),
                found: matrix.width(),
            });
        }
        matrix.rows().map(|row| self.predict_row(row)).collect()
    }
}
