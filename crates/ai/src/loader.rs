//! Startup model selection.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::classifier::Classifier;
use crate::constant::ConstantClassifier;
use crate::result::ModelError;
use crate::trained::{LinearModel, TrainedClassifier};

/// Pick the classifier once, at startup.
///
/// A readable, valid model file yields a [`TrainedClassifier`]; anything else logs a
/// warning and yields the [`ConstantClassifier`] so the pipeline stays usable in dev.
pub fn load_classifier(path: Option<&Path>) -> Arc<dyn Classifier> {
    let Some(path) = path else {
        warn!("no model path configured, using constant classifier");
        return Arc::new(ConstantClassifier::default());
    };

    match read_model(path) {
        Ok(clf) => {
            info!(
                path = %path.display(),
                classes = clf.class_count(),
                features = clf.feature_columns().len(),
                "loaded trained model"
            );
            Arc::new(clf)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not load model, using constant classifier");
            Arc::new(ConstantClassifier::default())
        }
    }
}

fn read_model(path: &Path) -> Result<TrainedClassifier, ModelError> {
    let bytes = std::fs::read(path).map_err(|e| ModelError::InvalidModel(e.to_string()))?;
    let model: LinearModel =
        serde_json::from_slice(&bytes).map_err(|e| ModelError::InvalidModel(e.to_string()))?;
    TrainedClassifier::new(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_constant() {
        let clf = load_classifier(Some(Path::new("/nonexistent/model.json")));
        assert_eq!(clf.name(), "constant");
    }

    #[test]
    fn no_path_falls_back_to_constant() {
        assert_eq!(load_classifier(None).name(), "constant");
    }

    #[test]
    fn valid_file_loads_trained_model() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let model = serde_json::json!({
            "feature_columns": ["sog_mean"],
            "weights": [[1.0], [-1.0]],
            "intercepts": [0.0, 0.0]
        });
        file.write_all(model.to_string().as_bytes()).unwrap();

        let clf = load_classifier(Some(file.path()));
        assert_eq!(clf.name(), "linear");
        assert_eq!(clf.feature_columns(), &["sog_mean".to_string()]);
    }

    #[test]
    fn corrupt_file_falls_back_to_constant() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert_eq!(load_classifier(Some(file.path())).name(), "constant");
    }
}
