//! Discovery pipeline.
//!
//! One background worker brings the catalog to a fixed point against the
//! filesystem contents of the configured data roots. A pass runs five stages
//! in sequence: image discovery, dive consolidation, camera serial
//! resolution, image dates, and canonical-dive camera assignment. The worker
//! is level-triggered (run-now signal), auto-triggers on its interval, and
//! checks for shutdown between stages.

mod checksum;
mod exif;

pub use checksum::{dive_checksum, file_md5};
pub use exif::{ExifError, camera_serials, extract_image_date};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use benthos_config::{DataPathEntry, LogSettings};
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::error::{CoreError, Result};
use crate::metrics::Metrics;
use crate::worker::{Wake, next_wake};

/// Raw image suffix, matched case-insensitively.
const RAW_SUFFIX: &str = "orf";
/// Stage A existence-probe batch size.
const DISCOVERY_BATCH: usize = 128;
/// Stage C serial-resolution batch size.
const CAMERA_SN_BATCH: i64 = 1024;
/// Stage D date-extraction batch size.
const IMAGE_DATE_BATCH: i64 = 128;

#[derive(Debug)]
pub struct Crawler {
    catalog: Catalog,
    roots: Vec<DataPathEntry>,
    exiftool_path: PathBuf,
    logs: LogSettings,
    interval: Duration,
    trigger: Arc<Notify>,
    metrics: Arc<Metrics>,
}

impl Crawler {
    pub fn new(
        catalog: Catalog,
        roots: Vec<DataPathEntry>,
        exiftool_path: PathBuf,
        logs: LogSettings,
        interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            catalog,
            roots,
            exiftool_path,
            logs,
            interval,
            trigger: Arc::new(Notify::new()),
            metrics,
        }
    }

    /// Run-now signal; shared with the discovery control endpoint.
    pub fn trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.trigger)
    }

    /// Start the worker. A failing pass is logged and retried on the next
    /// interval; per-image failures never abort a pass.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "discovery worker started, interval {}s, {} data roots",
                self.interval.as_secs(),
                self.roots.len()
            );
            loop {
                match next_wake(self.interval, &self.trigger, &mut shutdown).await {
                    Wake::Shutdown => break,
                    Wake::Interval | Wake::Triggered => {}
                }
                if let Err(err) = self.run_pass(&shutdown).await {
                    error!("discovery pass failed: {err}");
                }
            }
            info!("discovery worker stopped");
        })
    }

    fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
        *shutdown.borrow()
    }

    /// One full pass over all stages. Public so an operator tool can run a
    /// single pass synchronously.
    pub async fn run_pass(&self, shutdown: &watch::Receiver<bool>) -> Result<()> {
        for root in &self.roots {
            self.discover_dives(root).await?;
            if Self::stopping(shutdown) {
                return Ok(());
            }
        }

        self.consolidate_dives().await?;
        if Self::stopping(shutdown) {
            return Ok(());
        }

        self.compute_camera_sns().await?;
        if Self::stopping(shutdown) {
            return Ok(());
        }

        self.image_dates().await?;
        if Self::stopping(shutdown) {
            return Ok(());
        }

        self.process_canonical_dives().await
    }

    /// Stage A: register unknown raw files under one data root.
    async fn discover_dives(&self, root: &DataPathEntry) -> Result<()> {
        let mount = root.mount.clone();
        let files = tokio::task::spawn_blocking(move || enumerate_raw_images(&mount))
            .await
            .map_err(|err| CoreError::Internal(err.to_string()))?;
        let data_path = unc_string(&root.unc_path);

        for batch in files.chunks(DISCOVERY_BATCH) {
            let relatives: Vec<String> = batch
                .iter()
                .filter_map(|file| relative_posix(file, &root.mount))
                .collect();
            self.metrics
                .images_processed
                .with_label_values(&["discover_dives"])
                .inc_by(relatives.len() as u64);

            // One round trip tells us which paths are already registered;
            // known paths are skipped with no file I/O.
            let known = self.catalog.known_image_paths(&data_path, &relatives).await?;

            for (file, relative) in batch.iter().zip(&relatives) {
                if known.contains(relative) {
                    continue;
                }
                let file = file.clone();
                let digest = tokio::task::spawn_blocking(move || file_md5(&file))
                    .await
                    .map_err(|err| CoreError::Internal(err.to_string()))?;
                let digest = match digest {
                    Ok(digest) => digest,
                    Err(err) => {
                        warn!("failed to checksum {relative}: {err}");
                        continue;
                    }
                };

                let dive = parent_posix(relative);
                self.catalog.insert_dive_path(&dive, root.priority).await?;
                self.catalog
                    .insert_image(relative, &dive, &digest, &data_path)
                    .await?;
                self.metrics.images_added.inc();
            }
        }
        Ok(())
    }

    /// Stage B: dive checksums, then canonical-dive promotion. The insert
    /// statements are executed and also appended to the operator review file.
    async fn consolidate_dives(&self) -> Result<()> {
        for dive in self.catalog.all_dive_paths().await? {
            let members = self.catalog.dive_members(&dive).await?;
            let digest = dive_checksum(
                members
                    .iter()
                    .map(|(path, checksum)| (file_name(path), checksum.as_str())),
            );
            self.catalog.update_dive_checksum(&dive, &digest).await?;
        }

        let insert_log = self.logs.dive_insert_sql();
        let _ = std::fs::remove_file(&insert_log);

        let mut promoted = 0i64;
        for digest in self.catalog.unpromoted_dive_checksums().await? {
            let Some(candidate) = self.catalog.candidate_dive_by_checksum(&digest).await? else {
                continue;
            };
            if self
                .catalog
                .insert_canonical_dive(&digest, &candidate.path, candidate.date)
                .await?
            {
                append_line(
                    &insert_log,
                    &format!(
                        "INSERT INTO canonical_dives (checksum, path, date) \
                         VALUES ('{}', '{}', {});",
                        digest,
                        candidate.path,
                        candidate
                            .date
                            .map(|date| format!("'{date}'"))
                            .unwrap_or_else(|| "NULL".to_string()),
                    ),
                );
                promoted += 1;
            }
        }
        self.metrics.new_canonical_dives.set(promoted);
        info!("dive consolidation promoted {promoted} canonical dives");
        Ok(())
    }

    /// Stage C: resolve camera serial numbers through the metadata tool.
    async fn compute_camera_sns(&self) -> Result<()> {
        let mut attempted: HashSet<String> = HashSet::new();
        loop {
            let rows = self.catalog.images_without_camera_sn(CAMERA_SN_BATCH).await?;
            self.metrics
                .query_result_length
                .with_label_values(&["select_images_without_camerasn"])
                .observe(rows.len() as f64);
            let fresh: Vec<_> = rows
                .into_iter()
                .filter(|row| attempted.insert(row.checksum.clone()))
                .collect();
            if fresh.is_empty() {
                return Ok(());
            }
            self.metrics
                .images_processed
                .with_label_values(&["camera_sns"])
                .inc_by(fresh.len() as u64);

            let mut by_local: HashMap<PathBuf, String> = HashMap::new();
            let mut paths = Vec::new();
            for row in &fresh {
                let Some(local) = self.local_image_path(&row.data_path, &row.path) else {
                    warn!("no mount for data root {}", row.data_path);
                    continue;
                };
                by_local.insert(local.clone(), row.checksum.clone());
                paths.push(local);
            }

            let serials = camera_serials(&self.exiftool_path, &paths).await?;
            for (local, serial) in serials {
                if let Some(checksum) = by_local.get(&local) {
                    self.catalog.update_image_camera_sn(checksum, &serial).await?;
                }
            }
        }
    }

    /// Stage D: per-image capture timestamps, then per-dive date rollups.
    async fn image_dates(&self) -> Result<()> {
        let mut failed: HashMap<String, ExifError> = HashMap::new();
        loop {
            let rows = self.catalog.images_without_date(IMAGE_DATE_BATCH).await?;
            self.metrics
                .query_result_length
                .with_label_values(&["select_next_image_for_date"])
                .observe(rows.len() as f64);
            if rows.is_empty() {
                break;
            }
            let fresh: Vec<(String, PathBuf)> = rows
                .into_iter()
                .filter(|row| !failed.contains_key(&row.checksum))
                .filter_map(|row| {
                    self.local_image_path(&row.data_path, &row.path)
                        .map(|local| (row.checksum, local))
                })
                .collect();
            if fresh.is_empty() {
                break;
            }

            let extracted = tokio::task::spawn_blocking(move || {
                fresh
                    .into_iter()
                    .map(|(checksum, local)| {
                        let result = extract_image_date(&local);
                        (checksum, result)
                    })
                    .collect::<Vec<_>>()
            })
            .await
            .map_err(|err| CoreError::Internal(err.to_string()))?;

            let mut updated = 0u64;
            for (checksum, result) in extracted {
                match result {
                    Ok(date) => {
                        self.catalog.update_image_date(&checksum, date).await?;
                        updated += 1;
                    }
                    Err(err) => {
                        failed.insert(checksum, err);
                    }
                }
            }
            self.metrics
                .images_processed
                .with_label_values(&["image_dates"])
                .inc_by(updated);
        }

        // Timestamps are in place; roll them up per dive.
        for dive in self.catalog.all_dive_paths().await? {
            let member_dates = self.catalog.dive_member_dates(&dive).await?;
            let dates: Vec<DateTime<Utc>> =
                member_dates.iter().copied().flatten().collect();
            if dates.is_empty() {
                warn!("dive {dive} has no dated images");
                continue;
            }
            let invalid_image = dates.len() != member_dates.len();
            let distinct: BTreeSet<_> = dates.iter().map(|date| date.date_naive()).collect();
            let multiple_date = distinct.len() > 1;

            let mean_ts = dates.iter().map(|date| date.timestamp()).sum::<i64>() as f64
                / dates.len() as f64;
            let Some(mean) = DateTime::from_timestamp(mean_ts as i64, 0) else {
                warn!("dive {dive} has an out-of-range mean timestamp");
                continue;
            };
            self.catalog
                .update_dive_dates(&dive, mean.date_naive(), invalid_image, multiple_date)
                .await?;
        }

        // Leave the failures where an operator will find them.
        let report: Vec<String> = failed
            .iter()
            .map(|(checksum, err)| format!("{checksum}: {err}"))
            .collect();
        write_lines(&self.logs.failed_images(), &report);
        Ok(())
    }

    /// Stage E: assign the camera of each canonical dive when unambiguous.
    async fn process_canonical_dives(&self) -> Result<()> {
        let mut multiple_camera_dives: Vec<String> = Vec::new();
        for path in self.catalog.canonical_dive_paths().await? {
            let cameras = self.catalog.cameras_for_dive(&path).await?;
            match cameras.as_slice() {
                [] => continue,
                [camera] => {
                    self.catalog
                        .update_canonical_dive_camera(&path, *camera)
                        .await?;
                }
                _ => multiple_camera_dives.push(path),
            }
        }
        write_lines(&self.logs.multiple_camera_dives(), &multiple_camera_dives);
        Ok(())
    }

    fn local_image_path(&self, data_path: &str, relative: &str) -> Option<PathBuf> {
        self.roots
            .iter()
            .find(|root| unc_string(&root.unc_path) == data_path)
            .map(|root| root.mount.join(relative))
    }
}

/// All raw image files under a root, path-sorted for stable batching.
fn enumerate_raw_images(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(RAW_SUFFIX))
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn unc_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Path relative to a base, with forward slashes.
fn relative_posix(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|component| component.as_os_str().to_str().unwrap_or_default())
        .collect();
    Some(parts.join("/"))
}

fn parent_posix(relative: &str) -> String {
    match relative.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

fn file_name(relative: &str) -> &str {
    relative.rsplit_once('/').map_or(relative, |(_, name)| name)
}

fn append_line(path: &Path, line: &str) {
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut handle| writeln!(handle, "{line}"));
    if let Err(err) = result {
        warn!("failed to append to {}: {err}", path.display());
    }
}

fn write_lines(path: &Path, lines: &[String]) {
    let contents = lines
        .iter()
        .map(|line| format!("{line}\n"))
        .collect::<String>();
    if let Err(err) = std::fs::write(path, contents) {
        warn!("failed to write {}: {err}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn enumeration_matches_suffix_case_insensitively() {
        let root = TempDir::new().unwrap();
        let dive = root.path().join("2024-07/dive1");
        std::fs::create_dir_all(&dive).unwrap();
        std::fs::write(dive.join("AAA.ORF"), b"a").unwrap();
        std::fs::write(dive.join("bbb.orf"), b"b").unwrap();
        std::fs::write(dive.join("notes.txt"), b"n").unwrap();
        std::fs::write(root.path().join("top.Orf"), b"t").unwrap();

        let files = enumerate_raw_images(root.path());
        let names: Vec<String> = files
            .iter()
            .filter_map(|file| relative_posix(file, root.path()))
            .collect();
        assert_eq!(
            names,
            vec!["2024-07/dive1/AAA.ORF", "2024-07/dive1/bbb.orf", "top.Orf"]
        );
    }

    #[test]
    fn relative_path_helpers() {
        assert_eq!(parent_posix("2024-07/dive1/AAA.ORF"), "2024-07/dive1");
        assert_eq!(parent_posix("AAA.ORF"), "");
        assert_eq!(file_name("2024-07/dive1/AAA.ORF"), "AAA.ORF");
        assert_eq!(file_name("AAA.ORF"), "AAA.ORF");
    }

    #[test]
    fn unc_strings_use_forward_slashes() {
        assert_eq!(
            unc_string(Path::new("//nas/reef_2024")),
            "//nas/reef_2024"
        );
    }
}
