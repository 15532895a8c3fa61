//! Annotation-project synchronization.
//!
//! An interval worker keeps the external labeling projects in step with the
//! catalog: frames whose preprocessed artifact exists get one remote task
//! each, and completed annotations flow back into the label tables. One
//! failing project never blocks the others.

mod client;

pub use client::{ExportedTask, KeypointResult, LabelStudioClient};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use benthos_config::ProjectPair;
use benthos_model::Priority;
use chrono::Utc;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::worker::{Wake, next_wake};

/// Keypoint names used by the head/tail labeling configuration.
const HEAD_LABEL: &str = "Snout";
const TAIL_LABEL: &str = "Fork";

/// What a head/tail task's annotations amount to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadTail {
    Complete {
        head: (i32, i32),
        tail: (i32, i32),
    },
    /// Some keypoints present but not a full pair; needs operator review.
    Partial,
    Unlabeled,
}

#[derive(Debug)]
pub struct LabelStudioSync {
    catalog: Catalog,
    client: LabelStudioClient,
    root_url: String,
    laser_projects: ProjectPair,
    headtail_projects: ProjectPair,
    bad_task_links_path: PathBuf,
    interval: Duration,
    trigger: Arc<Notify>,
    metrics: Arc<Metrics>,
}

impl LabelStudioSync {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Catalog,
        client: LabelStudioClient,
        root_url: String,
        laser_projects: ProjectPair,
        headtail_projects: ProjectPair,
        bad_task_links_path: PathBuf,
        interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            catalog,
            client,
            root_url: root_url.trim_end_matches('/').to_string(),
            laser_projects,
            headtail_projects,
            bad_task_links_path,
            interval,
            trigger: Arc::new(Notify::new()),
            metrics,
        }
    }

    /// Run-now signal; shared with the sync control endpoint.
    pub fn trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.trigger)
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "label sync worker started, interval {}s",
                self.interval.as_secs()
            );
            loop {
                match next_wake(self.interval, &self.trigger, &mut shutdown).await {
                    Wake::Shutdown => break,
                    Wake::Interval | Wake::Triggered => {}
                }
                self.run_pass().await;
            }
            info!("label sync worker stopped");
        })
    }

    /// Sync all four projects; each failure is logged and isolated.
    pub async fn run_pass(&self) {
        let _ = std::fs::remove_file(&self.bad_task_links_path);

        let laser = [
            (Priority::High, self.laser_projects.high),
            (Priority::Low, self.laser_projects.low),
        ];
        for (priority, project) in laser {
            if let Err(err) = self.sync_laser_project(priority, project).await {
                error!("syncing laser project {project} failed: {err}");
            }
        }

        let headtail = [
            (Priority::High, self.headtail_projects.high),
            (Priority::Low, self.headtail_projects.low),
        ];
        for (priority, project) in headtail {
            if let Err(err) = self.sync_headtail_project(priority, project).await {
                error!("syncing head/tail project {project} failed: {err}");
            }
        }
    }

    /// Remember a partially labeled task for operator review.
    fn record_bad_task_link(&self, project: i64, task_id: i64) {
        let line = format!(
            "https://{}/projects/{project}/data?task={task_id}\n",
            self.client.host()
        );
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.bad_task_links_path)
            .and_then(|mut handle| std::io::Write::write_all(&mut handle, line.as_bytes()));
        if let Err(err) = result {
            warn!(
                "failed to append to {}: {err}",
                self.bad_task_links_path.display()
            );
        }
    }

    fn mark_synced(&self, project: i64) {
        let label = project.to_string();
        self.metrics
            .last_label_sync
            .with_label_values(&[label.as_str()])
            .set(Utc::now().timestamp());
    }

    async fn sync_laser_project(&self, priority: Priority, project: i64) -> Result<()> {
        // Register a task for every laser frame that has no label row yet.
        let frames = self.catalog.frames_needing_laser_labels(priority).await?;
        for checksum in frames {
            let url = format!("{}/api/v1/data/laser_jpeg/{checksum}", self.root_url);
            match self.client.import_task(project, &url).await {
                Ok(task_id) => self.catalog.insert_laser_label(&checksum, task_id).await?,
                Err(err) => warn!("task import for {checksum} failed: {err}"),
            }
        }

        // Pull completed annotations back.
        for task in self.client.export_tasks(project).await? {
            let Some(result) = task
                .annotations
                .first()
                .and_then(|annotation| annotation.result.first())
            else {
                continue;
            };
            let (x, y) = result.pixel();
            self.catalog.update_laser_label_by_task(task.id, x, y).await?;
        }
        self.mark_synced(project);
        Ok(())
    }

    async fn sync_headtail_project(&self, priority: Priority, project: i64) -> Result<()> {
        let frames = self.catalog.frames_needing_headtail_labels(priority).await?;
        for checksum in frames {
            let url = format!("{}/api/v1/data/preprocess_jpeg/{checksum}", self.root_url);
            match self.client.import_task(project, &url).await {
                Ok(task_id) => self.catalog.insert_headtail_label(&checksum, task_id).await?,
                Err(err) => warn!("task import for {checksum} failed: {err}"),
            }
        }

        for task in self.client.export_tasks(project).await? {
            match headtail_points(&task) {
                HeadTail::Complete { head, tail } => {
                    self.catalog
                        .update_headtail_label_by_task(task.id, head, tail)
                        .await?;
                }
                HeadTail::Partial => {
                    self.record_bad_task_link(project, task.id);
                }
                HeadTail::Unlabeled => {}
            }
        }
        self.mark_synced(project);
        Ok(())
    }
}

/// Interpret a head/tail task's first annotation: both keypoints, some, or
/// none.
fn headtail_points(task: &ExportedTask) -> HeadTail {
    let Some(annotation) = task.annotations.first() else {
        return HeadTail::Unlabeled;
    };
    let mut points: HashMap<&str, (i32, i32)> = HashMap::new();
    for result in &annotation.result {
        if let Some(label) = result.label() {
            points.insert(label, result.pixel());
        }
    }
    match (points.get(HEAD_LABEL), points.get(TAIL_LABEL)) {
        (Some(&head), Some(&tail)) => HeadTail::Complete { head, tail },
        (None, None) => HeadTail::Unlabeled,
        _ => HeadTail::Partial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(labels: &[(&str, f64, f64)]) -> ExportedTask {
        let results: Vec<serde_json::Value> = labels
            .iter()
            .map(|(label, x, y)| {
                serde_json::json!({
                    "original_width": 1000,
                    "original_height": 500,
                    "value": {"x": x, "y": y, "keypointlabels": [label]}
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({
            "id": 5,
            "data": {"img": "https://svc/api/v1/data/preprocess_jpeg/abcd"},
            "annotations": [{"result": results}]
        }))
        .unwrap()
    }

    #[test]
    fn complete_pairs_resolve_to_pixels() {
        let task = task(&[("Snout", 10.0, 20.0), ("Fork", 90.0, 80.0)]);
        assert_eq!(
            headtail_points(&task),
            HeadTail::Complete {
                head: (100, 100),
                tail: (900, 400),
            }
        );
    }

    #[test]
    fn partial_annotations_are_flagged() {
        let task = task(&[("Snout", 10.0, 20.0)]);
        assert_eq!(headtail_points(&task), HeadTail::Partial);
    }

    #[test]
    fn unannotated_tasks_are_skipped() {
        let task: ExportedTask = serde_json::from_value(serde_json::json!({
            "id": 6,
            "data": {"img": "https://svc/x"},
            "annotations": []
        }))
        .unwrap();
        assert_eq!(headtail_points(&task), HeadTail::Unlabeled);
    }
}
