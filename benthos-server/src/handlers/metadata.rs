use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use benthos_model::{DiveMetadata, FrameMetadata, Scope};
use serde_json::{Value, json};

use crate::auth::authorize;
use crate::errors::{AppError, AppResult};
use crate::handlers::require_checksum;
use crate::state::AppState;

/// GET `/api/v1/metadata/frame/{c}`: the catalog row for one frame.
pub async fn get_frame(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(checksum): Path<String>,
) -> AppResult<Json<FrameMetadata>> {
    authorize(&state, &headers, Some(Scope::GetMetadata)).await?;
    let checksum = require_checksum(&checksum)?;
    let frame = state
        .catalog
        .frame_metadata(checksum)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{checksum} is not a known checksum")))?;
    Ok(Json(frame))
}

/// GET `/api/v1/metadata/dive/{c}`: a canonical dive and its frames.
pub async fn get_dive(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(checksum): Path<String>,
) -> AppResult<Json<DiveMetadata>> {
    authorize(&state, &headers, Some(Scope::GetMetadata)).await?;
    let checksum = require_checksum(&checksum)?;
    let dive = state
        .catalog
        .dive_metadata(checksum)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{checksum} is not a known dive")))?;
    Ok(Json(dive))
}

/// GET `/api/v1/metadata/dives`: every dive the crawler has registered.
pub async fn list_dives(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    authorize(&state, &headers, Some(Scope::GetMetadata)).await?;
    let dives = state.catalog.list_dive_summaries().await?;
    Ok(Json(json!({ "dives": dives })))
}
