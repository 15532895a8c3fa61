//! Summary worker: periodically counts the catalog tables into gauges.

use std::sync::Arc;
use std::time::Duration;

use benthos_model::JobStatus;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::catalog::Catalog;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::worker::{Wake, next_wake};

#[derive(Debug)]
pub struct SummaryWorker {
    catalog: Catalog,
    interval: Duration,
    metrics: Arc<Metrics>,
}

impl SummaryWorker {
    pub fn new(catalog: Catalog, interval: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            catalog,
            interval,
            metrics,
        }
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("summary worker started, interval {}s", self.interval.as_secs());
            let never = Notify::new();
            loop {
                match next_wake(self.interval, &never, &mut shutdown).await {
                    Wake::Shutdown => break,
                    Wake::Interval | Wake::Triggered => {}
                }
                if let Err(err) = self.update_gauges().await {
                    error!("summary pass failed: {err}");
                }
            }
            info!("summary worker stopped");
        })
    }

    async fn update_gauges(&self) -> Result<()> {
        for (table, count) in self.catalog.table_counts().await? {
            self.metrics
                .catalog_rows
                .with_label_values(&[table])
                .set(count);
        }
        for (code, count) in self.catalog.job_status_counts().await? {
            if let Some(status) = JobStatus::from_code(code) {
                self.metrics
                    .jobs_by_status
                    .with_label_values(&[status.as_str()])
                    .set(count);
            }
        }
        Ok(())
    }
}
