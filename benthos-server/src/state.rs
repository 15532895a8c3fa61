use std::sync::Arc;

use benthos_core::{Catalog, DataModel, KeyStore, Metrics, Orchestrator};
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

/// Server application state. Every handle is constructor-injected; handlers
/// take what they need from here.
#[derive(Debug, Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub key_store: Arc<KeyStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub data_model: Arc<DataModel>,
    pub metrics: Arc<Metrics>,
    /// Run-now signal of the discovery worker.
    pub discovery_trigger: Arc<Notify>,
    /// Run-now signal of the label-sync worker.
    pub label_sync_trigger: Arc<Notify>,
    pub start_time: DateTime<Utc>,
}
