use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::dto::UploadAccepted;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// `PUT /uploads/:file_name` with the raw CSV as the body.
pub async fn upload(
    Extension(services): Extension<Arc<AppServices>>,
    Path(file_name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if file_name.trim().is_empty() {
        return Err(ApiError::InvalidArgument("file name is required".to_string()));
    }
    if body.is_empty() {
        return Err(ApiError::InvalidArgument("request body is empty".to_string()));
    }

    let job_id = services.upload(file_name, body.to_vec()).await?;
    tracing::info!(%job_id, "upload accepted");

    Ok((StatusCode::ACCEPTED, Json(UploadAccepted { job_id })))
}
