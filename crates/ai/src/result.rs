use thiserror::Error;

/// Output of the classifier for one input row.
///
/// This is *not* a persisted prediction; the worker maps it back to a vessel and
/// builds the stored result.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassOutput {
    /// Index into the model's class list.
    pub class_index: usize,

    /// Per-class probabilities, when the model provides them.
    pub probabilities: Option<Vec<f64>>,
}

impl ClassOutput {
    pub fn new(class_index: usize) -> Self {
        Self {
            class_index,
            probabilities: None,
        }
    }

    pub fn with_probabilities(mut self, probabilities: Vec<f64>) -> Self {
        self.probabilities = Some(probabilities);
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("input has {found} columns, model expects {expected}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}
