use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use vesselflow_core::JobId;
use vesselflow_infra::{IngestError, PipelineError};

/// Errors surfaced by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The request itself is unusable (empty body, blank name).
    InvalidArgument(String),
    InvalidId(String),
    Pipeline(PipelineError),
    /// Ingestion failed; the body names the errored job when one was created.
    Ingest(IngestError),
}

impl From<PipelineError> for ApiError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<IngestError> for ApiError {
    fn from(value: IngestError) -> Self {
        Self::Ingest(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidArgument(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_argument", msg, None),
            ApiError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg, None),
            ApiError::Pipeline(err) => pipeline_error_to_response(err, None),
            ApiError::Ingest(IngestError { job_id, error }) => pipeline_error_to_response(error, job_id),
        }
    }
}

pub fn pipeline_error_to_response(err: PipelineError, job_id: Option<JobId>) -> Response {
    match err {
        PipelineError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg, job_id),
        PipelineError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg, job_id),
        PipelineError::Model(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "model_error", msg, job_id),
        PipelineError::Infrastructure(msg) => {
            tracing::error!(error = %msg, ?job_id, "infrastructure failure while serving request");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error", msg, job_id)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    job_id: Option<JobId>,
) -> Response {
    let mut body = json!({
        "error": code,
        "message": message.into(),
    });
    if let Some(job_id) = job_id {
        body["jobId"] = json!(job_id);
    }
    (status, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value as JsonValue;

    use super::*;

    async fn body(res: Response) -> JsonValue {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn ingest_failure_names_the_errored_job() {
        let id = JobId::new();
        let err = IngestError::for_job(id, PipelineError::Validation("no valid vessel data".into()));

        let res = ApiError::from(err).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let json = body(res).await;
        assert_eq!(json["error"], "validation_error");
        assert_eq!(json["jobId"], id.to_string());
    }

    #[tokio::test]
    async fn failures_without_a_job_have_no_job_id() {
        let res = ApiError::from(PipelineError::NotFound("job x".into())).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(body(res).await.get("jobId").is_none());
    }
}
