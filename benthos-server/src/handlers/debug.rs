use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use benthos_model::Scope;
use uuid::Uuid;

use crate::auth::authorize;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// PUT `/api/v1/debug/{id}`: store a worker's debug archive for triage.
pub async fn put_debug_blob(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<StatusCode> {
    authorize(&state, &headers, Some(Scope::PutDebugBlob)).await?;
    let id = Uuid::parse_str(&id).map_err(|_| AppError::bad_request("bad debug id"))?;
    state.data_model.put_debug_blob(id, &body).await?;
    Ok(StatusCode::OK)
}
