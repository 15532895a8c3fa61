use axum::http::HeaderMap;
use benthos_core::AuthorizedKey;
use benthos_model::Scope;

use crate::errors::AppError;
use crate::state::AppState;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "api_key";

/// Authenticate a request against the key store, optionally requiring a
/// scope. Missing, unknown, expired, and unscoped keys all map to 401.
pub async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    scope: Option<Scope>,
) -> Result<AuthorizedKey, AppError> {
    let key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("key not provided"))?;

    match state.key_store.authorize_key(key, scope).await {
        Ok(Some(authorized)) => Ok(authorized),
        Ok(None) => Err(AppError::unauthorized("key failed authorization")),
        Err(err) => Err(err.into()),
    }
}
