use crate::matrix::FeatureMatrix;
use crate::result::{ClassOutput, ModelError};

/// A batch classifier over prepared feature matrices.
///
/// Selected once at startup and shared by every worker (`Arc<dyn Classifier>`);
/// implementations must be stateless with respect to calls.
pub trait Classifier: Send + Sync + 'static {
    /// Model name for logs.
    fn name(&self) -> &str;

    /// Columns the model expects, in order.
    fn feature_columns(&self) -> &[String];

    /// Classify every row. Must return exactly one output per row, in row order.
    fn classify(&self, matrix: &FeatureMatrix) -> Result<Vec<ClassOutput>, ModelError>;
}
