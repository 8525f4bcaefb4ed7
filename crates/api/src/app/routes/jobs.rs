use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    Json,
};

use vesselflow_core::JobId;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// `GET /jobs`: every job, newest first, including the ones that failed ingestion.
pub async fn list_jobs(Extension(services): Extension<Arc<AppServices>>) -> Result<impl IntoResponse, ApiError> {
    let jobs = services.list_jobs().await?;
    Ok(Json(jobs))
}

/// `GET /jobs/:job_id`: status, progress and every prediction persisted so far.
pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id: JobId = id
        .parse()
        .map_err(|_| ApiError::InvalidId(format!("invalid job id {id:?}")))?;

    let report = services.job_results(job_id).await?;
    Ok(Json(report))
}
