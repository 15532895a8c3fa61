pub mod admin;
pub mod control;
pub mod data;
pub mod debug;
pub mod jobs;
pub mod metadata;

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::state::AppState;

/// Unauthenticated banner: version and deployment time.
pub async fn home(State(state): State<AppState>) -> String {
    format!(
        "Benthos data processing orchestrator v{} deployed at {}",
        env!("CARGO_PKG_VERSION"),
        state.start_time.to_rfc3339()
    )
}

pub async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// `{c}` path segments must be 32-char lowercase hex.
pub fn require_checksum(candidate: &str) -> Result<&str, crate::errors::AppError> {
    let valid = candidate.len() == 32
        && candidate
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    if valid {
        Ok(candidate)
    } else {
        Err(crate::errors::AppError::bad_request(format!(
            "{candidate} is not a valid checksum"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_validation() {
        assert!(require_checksum("5eb63bbbe01eeed093cb22bb8f5acdc3").is_ok());
        assert!(require_checksum("5EB63BBBE01EEED093CB22BB8F5ACDC3").is_err());
        assert!(require_checksum("5eb63bbb").is_err());
        assert!(require_checksum("zzzzzbbbe01eeed093cb22bb8f5acdc3").is_err());
    }
}
