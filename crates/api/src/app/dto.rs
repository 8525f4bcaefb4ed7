use serde::Serialize;

use vesselflow_core::JobId;

/// Body of a `202 Accepted` upload response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAccepted {
    pub job_id: JobId,
}
