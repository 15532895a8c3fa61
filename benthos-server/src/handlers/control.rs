use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use benthos_model::Scope;

use crate::auth::authorize;
use crate::errors::AppResult;
use crate::state::AppState;

/// POST `/api/v1/control/discover`: set the discovery run-now signal.
pub async fn trigger_discovery(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    authorize(&state, &headers, Some(Scope::DoDiscovery)).await?;
    state.discovery_trigger.notify_one();
    Ok(StatusCode::OK)
}

/// POST `/api/v1/control/label_studio_sync`: set the sync run-now signal.
pub async fn trigger_label_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    authorize(&state, &headers, Some(Scope::DoLabelStudioSync)).await?;
    state.label_sync_trigger.notify_one();
    Ok(StatusCode::OK)
}
