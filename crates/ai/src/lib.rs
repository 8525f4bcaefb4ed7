//! `vesselflow-ai`
//!
//! **Responsibility:** the classification boundary.
//!
//! The trained model is an opaque function `feature matrix -> class (+ probabilities)`
//! per row. This crate defines that seam ([`Classifier`]), its two implementations
//! (a trained linear model and a constant fallback), the matrix preparation that turns
//! loosely-typed chunk rows into model input, and startup model selection.

pub mod classifier;
pub mod constant;
pub mod loader;
pub mod matrix;
pub mod result;
pub mod trained;

pub use classifier::Classifier;
pub use constant::ConstantClassifier;
pub use loader::load_classifier;
pub use matrix::{ChunkRow, FeatureMatrix, PreparedChunk, default_feature_columns, prepare_matrix};
pub use result::{ClassOutput, ModelError};
pub use trained::{LinearModel, TrainedClassifier};
