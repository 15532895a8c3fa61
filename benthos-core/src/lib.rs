//! Core library for the Benthos coordination service.
//!
//! Owns the Postgres catalog, the embedded API key store, the local staging
//! cache, and the background workers: the discovery pipeline, the job
//! orchestrator and its reaper, the annotation-project sync, and the summary
//! counters.

pub mod cache;
pub mod catalog;
pub mod datamodel;
pub mod discovery;
pub mod error;
pub mod keystore;
pub mod labels;
pub mod metrics;
pub mod orchestrator;
pub mod summary;
pub mod worker;

pub use cache::FileCache;
pub use catalog::Catalog;
pub use datamodel::DataModel;
pub use discovery::Crawler;
pub use error::{CoreError, Result};
pub use keystore::{AuthorizedKey, KeyStore};
pub use labels::{LabelStudioClient, LabelStudioSync};
pub use metrics::Metrics;
pub use orchestrator::Orchestrator;
pub use summary::SummaryWorker;
