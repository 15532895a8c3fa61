use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use benthos_model::{LaserPoint, Scope};

use crate::auth::authorize;
use crate::errors::{AppError, AppResult};
use crate::handlers::require_checksum;
use crate::state::AppState;

fn octet_stream(bytes: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response()
}

fn jpeg(bytes: Vec<u8>, cache_max_age: Option<u32>) -> Response {
    match cache_max_age {
        Some(age) => (
            [
                (header::CONTENT_TYPE, "image/jpeg".to_string()),
                (header::CACHE_CONTROL, format!("max-age={age}")),
            ],
            bytes,
        )
            .into_response(),
        None => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
    }
}

/// GET `/api/v1/data/raw/{c}`: raw file bytes by checksum.
pub async fn get_raw_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(checksum): Path<String>,
) -> AppResult<Response> {
    authorize(&state, &headers, Some(Scope::GetRawFile)).await?;
    let checksum = require_checksum(&checksum)?;
    let bytes = state.data_model.raw_file_bytes(checksum).await?;
    Ok(octet_stream(bytes))
}

/// GET `/api/v1/data/lens_cal/{cameraId}`: lens calibration package.
pub async fn get_lens_cal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(camera_id): Path<i32>,
) -> AppResult<Response> {
    authorize(&state, &headers, Some(Scope::GetRawFile)).await?;
    let bytes = state.data_model.lens_cal_bytes(camera_id).await?;
    Ok(octet_stream(bytes))
}

/// GET `/api/v1/data/preprocess_jpeg/{c}`.
pub async fn get_preprocess_jpeg(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(checksum): Path<String>,
) -> AppResult<Response> {
    authorize(&state, &headers, Some(Scope::GetLaserFrame)).await?;
    let checksum = require_checksum(&checksum)?;
    let bytes = state.data_model.preprocess_jpeg(checksum).await?;
    Ok(jpeg(bytes, Some(3600)))
}

/// PUT `/api/v1/data/preprocess_jpeg/{c}`: store a worker's preprocessed
/// frame and register it on the image row.
pub async fn put_preprocess_jpeg(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(checksum): Path<String>,
    body: Bytes,
) -> AppResult<StatusCode> {
    authorize(&state, &headers, Some(Scope::PutPreprocessedFrame)).await?;
    let checksum = require_checksum(&checksum)?;
    state.data_model.put_preprocess_jpeg(checksum, &body).await?;
    Ok(StatusCode::OK)
}

/// GET `/api/v1/data/laser_jpeg/{c}`.
pub async fn get_laser_jpeg(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(checksum): Path<String>,
) -> AppResult<Response> {
    authorize(&state, &headers, Some(Scope::GetLaserFrame)).await?;
    let checksum = require_checksum(&checksum)?;
    let bytes = state.data_model.laser_jpeg(checksum).await?;
    Ok(jpeg(bytes, Some(3600)))
}

/// PUT `/api/v1/data/laser_jpeg/{c}`.
pub async fn put_laser_jpeg(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(checksum): Path<String>,
    body: Bytes,
) -> AppResult<StatusCode> {
    authorize(&state, &headers, Some(Scope::PutLaserFrame)).await?;
    let checksum = require_checksum(&checksum)?;
    state.data_model.put_laser_jpeg(checksum, &body).await?;
    Ok(StatusCode::OK)
}

/// DELETE `/api/v1/data/laser_jpeg/{c}`: drop a bad laser frame so a worker
/// can regenerate it.
pub async fn delete_laser_jpeg(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(checksum): Path<String>,
) -> AppResult<StatusCode> {
    authorize(&state, &headers, Some(Scope::Admin)).await?;
    let checksum = require_checksum(&checksum)?;
    state.data_model.delete_laser_jpeg(checksum).await?;
    Ok(StatusCode::OK)
}

/// GET `/api/v1/data/laser/{c}`: completed laser keypoint for a frame.
pub async fn get_laser_label(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(checksum): Path<String>,
) -> AppResult<Json<LaserPoint>> {
    authorize(&state, &headers, Some(Scope::GetRawFile)).await?;
    let checksum = require_checksum(&checksum)?;
    let label = state
        .catalog
        .laser_label(checksum)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no laser label for {checksum}")))?;
    Ok(Json(label))
}

/// DELETE `/api/v1/data/head_tail/{c}`: remove a head/tail label so the
/// frame is re-registered on the next sync.
pub async fn delete_headtail_label(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(checksum): Path<String>,
) -> AppResult<StatusCode> {
    authorize(&state, &headers, Some(Scope::Admin)).await?;
    let checksum = require_checksum(&checksum)?;
    if !state.catalog.delete_headtail_label(checksum).await? {
        return Err(AppError::not_found(format!(
            "no head/tail label for {checksum}"
        )));
    }
    Ok(StatusCode::OK)
}
