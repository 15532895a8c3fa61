//! # Benthos Server
//!
//! Authenticated HTTP surface of the Benthos coordination service.
//!
//! ## Overview
//!
//! The server fronts three subsystems from `benthos-core`:
//!
//! - **Discovery pipeline**: crawls the raw camera trees into the catalog
//! - **Job orchestrator**: leases preprocessing batches to remote workers
//! - **Label sync**: keeps the external annotation projects in step
//!
//! Every non-OPTIONS request authenticates against the embedded API key
//! store; scopes gate the individual resources.

/// Request authentication against the key store.
pub mod auth;

/// Error types and HTTP mapping.
pub mod errors;

/// Per-resource handler functions.
pub mod handlers;

/// Request observability middleware.
pub mod middleware;

/// Route table.
pub mod routes;

/// Shared application state.
pub mod state;

pub use routes::create_app;
pub use state::AppState;
