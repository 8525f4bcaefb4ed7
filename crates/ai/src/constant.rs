use crate::classifier::Classifier;
use crate::matrix::{FeatureMatrix, default_feature_columns};
use crate::result::{ClassOutput, ModelError};

/// Development classifier used when no trained model is available.
///
/// Always predicts `class_index` with full confidence. Never fails.
#[derive(Debug, Clone)]
pub struct ConstantClassifier {
    class_index: usize,
    class_count: usize,
    columns: Vec<String>,
}

impl ConstantClassifier {
    pub fn new(class_index: usize, class_count: usize) -> Self {
        Self {
            class_index,
            class_count: class_count.max(class_index + 1),
            columns: default_feature_columns(),
        }
    }
}

impl Default for ConstantClassifier {
    /// Class 0 (`TUG`) out of the four known labels.
    fn default() -> Self {
        Self::new(0, 4)
    }
}

impl Classifier for ConstantClassifier {
    fn name(&self) -> &str {
        "constant"
    }

    fn feature_columns(&self) -> &[String] {
        &self.columns
    }

    fn classify(&self, matrix: &FeatureMatrix) -> Result<Vec<ClassOutput>, ModelError> {
        let mut probabilities = vec![0.0; self.class_count];
        probabilities[self.class_index] = 1.0;

        Ok((0..matrix.len())
            .map(|_| ClassOutput::new(self.class_index).with_probabilities(probabilities.clone()))
            .collect())
    }
}
