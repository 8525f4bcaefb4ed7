//! HTTP API: upload intake and job queries over the classification pipeline.

pub mod app;
