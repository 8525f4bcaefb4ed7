use axum::{
    routing::{get, put},
    Router,
};

pub mod jobs;
pub mod system;
pub mod uploads;

/// Router for the pipeline endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/uploads/:file_name", put(uploads::upload))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:job_id", get(jobs::get_job))
}
