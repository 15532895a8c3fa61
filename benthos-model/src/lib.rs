//! Shared data model for the Benthos coordination service.
//!
//! Closed enums carry their persistence codes and wire names here so that the
//! catalog, the orchestrator, and the HTTP surface agree on one mapping.

pub mod job;
pub mod metadata;
pub mod scope;

pub use job::{JobDocument, JobRecord, JobStatus, JobType, Priority};
pub use metadata::{DiveMetadata, DiveSummary, FrameMetadata, LaserPoint};
pub use scope::Scope;
