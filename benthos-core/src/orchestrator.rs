//! Job orchestrator.
//!
//! Issues bounded batches of preprocessing work under a lease, tracks status
//! transitions, and reaps lapsed leases back into the pending pool.

use std::sync::Arc;
use std::time::Duration;

use benthos_model::{JobDocument, JobRecord, JobStatus, JobType, Priority};
use chrono::Utc;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::{CoreError, Result};
use crate::metrics::Metrics;
use crate::worker::{Wake, next_wake};

pub const DEFAULT_BATCH_IMAGES: i64 = 1000;
pub const DEFAULT_LEASE_SECONDS: i64 = 3600;

/// Candidate pools in strict priority order.
const POOL_ORDER: [(JobType, Priority); 4] = [
    (JobType::Preprocess, Priority::High),
    (JobType::PreprocessWithLaser, Priority::High),
    (JobType::Preprocess, Priority::Low),
    (JobType::PreprocessWithLaser, Priority::Low),
];

#[derive(Debug, Clone)]
pub struct Orchestrator {
    catalog: Catalog,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    pub fn new(catalog: Catalog, metrics: Arc<Metrics>) -> Self {
        Self { catalog, metrics }
    }

    /// Issue the next batch of jobs to a worker.
    ///
    /// All writes happen on one transaction, so competing calls never see a
    /// partially claimed frame set; the pool selections use row locks with
    /// `SKIP LOCKED`, so concurrent batches come back disjoint. Counting is
    /// in frames, not jobs.
    pub async fn retrieve_batch(
        &self,
        worker: &str,
        origin: &str,
        n_images: i64,
        lease: Duration,
    ) -> Result<JobDocument> {
        let mut document = JobDocument::default();
        if n_images <= 0 {
            return Ok(document);
        }

        let expiration = Utc::now()
            + chrono::Duration::from_std(lease)
                .map_err(|_| CoreError::BadRequest("lease duration out of range".into()))?;

        let mut tx = self.catalog.pool().begin().await?;
        let mut remaining = n_images;
        for (job_type, priority) in POOL_ORDER {
            if remaining <= 0 {
                break;
            }
            let rows = self
                .catalog
                .next_preprocess_candidates(&mut tx, job_type, priority, remaining)
                .await?;
            for row in rows {
                let job_id = Uuid::new_v4();
                self.catalog
                    .insert_job(&mut tx, job_id, worker, origin, job_type, expiration)
                    .await?;
                match job_type {
                    JobType::Preprocess => {
                        self.catalog
                            .update_headtail_preprocess_job(&mut tx, job_id, &row.checksums)
                            .await?;
                    }
                    JobType::PreprocessWithLaser => {
                        self.catalog
                            .update_preprocess_job(&mut tx, job_id, &row.checksums)
                            .await?;
                    }
                }
                remaining -= row.checksums.len() as i64;
                document.jobs.push(JobRecord {
                    job_id,
                    frame_ids: row.checksums,
                    camera_id: row.camera_idx,
                    operation: job_type,
                    dive_id: row.dive,
                });
            }
        }
        tx.commit().await?;

        info!(
            "issued {} jobs ({} frames) to {worker}",
            document.jobs.len(),
            document.frame_count()
        );
        Ok(document)
    }

    /// Update a job's status and optional progress.
    ///
    /// Terminal rows are left untouched: a late report against an already
    /// reaped job succeeds without effect, since content writes are
    /// idempotent keyed by checksum. Cancellation additionally releases the
    /// job's frame claims so the frames re-enter the pending pool.
    pub async fn set_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        progress: Option<i16>,
    ) -> Result<()> {
        if let Some(progress) = progress
            && !(0..=100).contains(&progress)
        {
            return Err(CoreError::BadRequest(format!(
                "progress {progress} out of range"
            )));
        }

        let updated = self.catalog.update_job_status(job_id, status, progress).await?;
        if !updated {
            if !self.catalog.job_exists(job_id).await? {
                return Err(CoreError::NotFound(format!("unknown job {job_id}")));
            }
            // Already terminal; tolerated no-op.
            return Ok(());
        }

        if status == JobStatus::Cancelled {
            let job_type = self
                .catalog
                .job_type(job_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("unknown job {job_id}")))?;
            let mut conn = self.catalog.pool().acquire().await?;
            match job_type {
                JobType::Preprocess => {
                    self.catalog
                        .cancel_headtail_preprocess_job(&mut conn, job_id)
                        .await?;
                }
                JobType::PreprocessWithLaser => {
                    self.catalog.cancel_preprocess_job(&mut conn, job_id).await?;
                }
            }
        }
        Ok(())
    }

    /// A job id is valid iff the jobs table holds a matching row.
    pub async fn is_job_valid(&self, job_id: Uuid) -> Result<bool> {
        self.catalog.job_exists(job_id).await
    }

    /// Return every lapsed open lease to the pending pool. Each job's frame
    /// unclaim and status flip share a transaction.
    pub async fn reap_expired(&self) -> Result<u64> {
        let expired = self.catalog.expired_jobs().await?;
        let mut reaped = 0u64;
        for (job_id, type_name) in expired {
            let Ok(job_type) = type_name.parse::<JobType>() else {
                warn!("job {job_id} has unknown type {type_name}, skipping");
                continue;
            };
            let mut tx = self.catalog.pool().begin().await?;
            match job_type {
                JobType::Preprocess => {
                    self.catalog
                        .cancel_headtail_preprocess_job(&mut tx, job_id)
                        .await?;
                }
                JobType::PreprocessWithLaser => {
                    self.catalog.cancel_preprocess_job(&mut tx, job_id).await?;
                }
            }
            self.catalog.mark_job_expired(&mut tx, job_id).await?;
            tx.commit().await?;

            self.metrics
                .jobs_reaped
                .with_label_values(&[job_type.as_str()])
                .inc();
            reaped += 1;
        }
        if reaped > 0 {
            info!("reaped {reaped} expired jobs");
        }
        Ok(reaped)
    }

    /// Start the reaper timer.
    pub fn spawn_reaper(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            info!("job reaper started, interval {}s", interval.as_secs());
            let never = Notify::new();
            loop {
                match next_wake(interval, &never, &mut shutdown).await {
                    Wake::Shutdown => break,
                    Wake::Interval | Wake::Triggered => {}
                }
                if let Err(err) = orchestrator.reap_expired().await {
                    error!("reaper pass failed: {err}");
                }
            }
            info!("job reaper stopped");
        })
    }
}
