use std::time::Duration;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use benthos_core::orchestrator::{DEFAULT_BATCH_IMAGES, DEFAULT_LEASE_SECONDS};
use benthos_model::{JobDocument, JobStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::authorize;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RetrieveBatchQuery {
    worker: String,
    #[serde(rename = "nImages")]
    n_images: Option<i64>,
    /// Lease duration in seconds.
    expiration: Option<i64>,
}

/// POST `/api/v1/jobs/retrieve_batch`: issue the next batch of jobs to the
/// calling worker. Any authenticated key may request work; the key's hash
/// becomes the jobs' origin.
pub async fn retrieve_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RetrieveBatchQuery>,
) -> AppResult<Json<JobDocument>> {
    let key = authorize(&state, &headers, None).await?;

    let n_images = query.n_images.unwrap_or(DEFAULT_BATCH_IMAGES);
    let lease_seconds = query.expiration.unwrap_or(DEFAULT_LEASE_SECONDS);
    if lease_seconds <= 0 {
        return Err(AppError::bad_request("bad expiration value"));
    }

    let document = state
        .orchestrator
        .retrieve_batch(
            &query.worker,
            &key.hash,
            n_images,
            Duration::from_secs(lease_seconds as u64),
        )
        .await?;
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
pub struct JobStatusQuery {
    #[serde(rename = "jobId")]
    job_id: String,
    status: String,
    progress: Option<i16>,
}

/// PUT `/api/v1/jobs/status`: report a job's status and optional progress.
pub async fn set_job_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<JobStatusQuery>,
) -> AppResult<StatusCode> {
    authorize(&state, &headers, None).await?;

    let job_id = Uuid::parse_str(&query.job_id)
        .map_err(|_| AppError::bad_request("bad jobId value"))?;
    let status: JobStatus = query
        .status
        .parse()
        .map_err(|_| AppError::bad_request("bad status value"))?;

    state
        .orchestrator
        .set_job_status(job_id, status, query.progress)
        .await?;
    Ok(StatusCode::OK)
}
