use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use benthos_model::Scope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::auth::authorize;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScopesBody {
    pub scopes: Vec<Scope>,
}

/// GET `/api/v1/admin/scope?key=`: list the scopes granted to a key.
pub async fn get_scopes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KeyQuery>,
) -> AppResult<Json<ScopesBody>> {
    authorize(&state, &headers, Some(Scope::Admin)).await?;
    let scopes = state.key_store.scopes(&query.key).await?;
    Ok(Json(ScopesBody { scopes }))
}

async fn apply_scopes(
    state: &AppState,
    key: &str,
    scopes: &[Scope],
    value: bool,
) -> AppResult<Json<ScopesBody>> {
    for scope in scopes {
        if !state.key_store.set_scope(key, *scope, value).await? {
            return Err(AppError::not_found("unknown api key"));
        }
    }
    let scopes = state.key_store.scopes(key).await?;
    Ok(Json(ScopesBody { scopes }))
}

/// PUT `/api/v1/admin/scope?key=`: grant the listed scopes.
pub async fn add_scopes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KeyQuery>,
    Json(body): Json<ScopesBody>,
) -> AppResult<Json<ScopesBody>> {
    authorize(&state, &headers, Some(Scope::Admin)).await?;
    apply_scopes(&state, &query.key, &body.scopes, true).await
}

/// DELETE `/api/v1/admin/scope?key=`: revoke the listed scopes.
pub async fn remove_scopes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KeyQuery>,
    Json(body): Json<ScopesBody>,
) -> AppResult<Json<ScopesBody>> {
    authorize(&state, &headers, Some(Scope::Admin)).await?;
    apply_scopes(&state, &query.key, &body.scopes, false).await
}

#[derive(Debug, Deserialize)]
pub struct NewKeyQuery {
    comment: String,
    /// RFC 3339 expiration; defaults to the store's standard validity.
    expiration: Option<String>,
    /// Comma-separated scope names to grant at creation.
    scopes: Option<String>,
}

/// POST `/api/v1/admin/new_key?comment=&expiration=&scopes=`: mint a key.
pub async fn new_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NewKeyQuery>,
) -> AppResult<Json<Value>> {
    authorize(&state, &headers, Some(Scope::Admin)).await?;

    let expiration = query
        .expiration
        .as_deref()
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| AppError::bad_request("bad expiration value"))
        })
        .transpose()?;

    let scopes = query
        .scopes
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter(|name| !name.is_empty())
        .map(|name| {
            name.trim()
                .parse::<Scope>()
                .map_err(|err| AppError::bad_request(err))
        })
        .collect::<Result<Vec<Scope>, AppError>>()?;

    let (key, expires) = state.key_store.new_key(&query.comment, expiration).await?;
    for scope in scopes {
        state.key_store.set_scope(&key, scope, true).await?;
    }

    Ok(Json(json!({
        "key": key,
        "expires": expires.to_rfc3339(),
    })))
}
