//! Size-bounded local staging cache.
//!
//! Files on the slow network mounts are copied to UUID-named files in a
//! local cache directory. The source-to-staged mapping is persisted to a
//! JSON index after every mutation so a restart reuses prior stagings.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::metrics::Metrics;

const INDEX_FILE: &str = "cache_map.json";

#[derive(Debug, Default)]
struct CacheState {
    map: HashMap<PathBuf, PathBuf>,
    occupied: u64,
    /// Sources with an in-flight staging copy.
    pending: HashSet<PathBuf>,
}

#[derive(Debug)]
struct CacheInner {
    cache_dir: PathBuf,
    index_path: PathBuf,
    max_bytes: u64,
    state: Mutex<CacheState>,
    /// Held for the duration of an eviction sweep; `try_lock` keeps the
    /// sweep single-flight.
    evict_lock: Mutex<()>,
    metrics: OnceLock<Arc<Metrics>>,
}

#[derive(Debug, Clone)]
pub struct FileCache {
    inner: Arc<CacheInner>,
}

impl FileCache {
    /// Open the cache, reloading the persisted index. Stale index entries
    /// whose staged file disappeared are dropped.
    pub async fn open(cache_dir: &Path, max_bytes: u64) -> Result<Self> {
        tokio::fs::create_dir_all(cache_dir).await?;
        let index_path = cache_dir.join(INDEX_FILE);

        let mut state = CacheState::default();
        if index_path.is_file() {
            let contents = tokio::fs::read(&index_path).await?;
            let entries: Vec<(PathBuf, PathBuf)> = serde_json::from_slice(&contents)
                .unwrap_or_else(|err| {
                    warn!("discarding unreadable cache index: {err}");
                    Vec::new()
                });
            for (source, staged) in entries {
                match tokio::fs::metadata(&staged).await {
                    Ok(meta) => {
                        state.occupied += meta.len();
                        state.map.insert(source, staged);
                    }
                    Err(_) => debug!("dropping stale cache entry for {}", source.display()),
                }
            }
        }

        Ok(Self {
            inner: Arc::new(CacheInner {
                cache_dir: cache_dir.to_path_buf(),
                index_path,
                max_bytes,
                state: Mutex::new(state),
                evict_lock: Mutex::new(()),
                metrics: OnceLock::new(),
            }),
        })
    }

    /// Attach the service metrics so occupancy is observable.
    pub fn attach_metrics(&self, metrics: Arc<Metrics>) {
        let _ = self.inner.metrics.set(metrics);
        // Report the occupancy restored from the index.
        let cache = self.clone();
        tokio::spawn(async move {
            let occupied = cache.inner.state.lock().await.occupied;
            cache.record_occupancy(occupied);
        });
    }

    fn record_occupancy(&self, occupied: u64) {
        if let Some(metrics) = self.inner.metrics.get() {
            metrics.cache_occupancy_bytes.set(occupied as i64);
        }
    }

    /// Staged path for a source if present. A miss schedules staging in the
    /// background and returns the source path unchanged, so callers always
    /// have something readable.
    pub async fn get(&self, source: &Path) -> PathBuf {
        let mut state = self.inner.state.lock().await;
        if let Some(staged) = state.map.get(source) {
            return staged.clone();
        }
        if state.pending.insert(source.to_path_buf()) {
            let cache = self.clone();
            let source = source.to_path_buf();
            tokio::spawn(async move {
                if let Err(err) = cache.add(&source).await {
                    warn!("failed to stage {}: {err}", source.display());
                }
            });
        }
        source.to_path_buf()
    }

    /// Copy a source into the cache and record the mapping. Triggers an
    /// eviction sweep when the budget is reached.
    pub async fn add(&self, source: &Path) -> Result<()> {
        if self.contains(source).await {
            self.inner.state.lock().await.pending.remove(source);
            return Ok(());
        }

        let staged = self.inner.cache_dir.join(Uuid::new_v4().to_string());
        let copy_result = tokio::fs::copy(source, &staged).await;

        let mut state = self.inner.state.lock().await;
        state.pending.remove(source);
        let copied = copy_result?;
        state.map.insert(source.to_path_buf(), staged);
        state.occupied += copied;
        let occupied = state.occupied;
        self.persist(&state).await?;
        drop(state);
        self.record_occupancy(occupied);

        if occupied >= self.inner.max_bytes {
            self.evict().await;
        }
        Ok(())
    }

    pub async fn contains(&self, source: &Path) -> bool {
        self.inner.state.lock().await.map.contains_key(source)
    }

    /// Unlink a staged file and update occupancy.
    pub async fn remove(&self, source: &Path) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let Some(staged) = state.map.remove(source) else {
            return Err(crate::error::CoreError::NotFound(format!(
                "{} is not cached",
                source.display()
            )));
        };
        let size = tokio::fs::metadata(&staged)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        state.occupied = state.occupied.saturating_sub(size);
        tokio::fs::remove_file(&staged).await?;
        let occupied = state.occupied;
        self.persist(&state).await?;
        drop(state);
        self.record_occupancy(occupied);
        Ok(())
    }

    pub async fn occupied(&self) -> u64 {
        self.inner.state.lock().await.occupied
    }

    /// Evict entries in ascending last-access order until below budget.
    async fn evict(&self) {
        // Another sweep already running covers this add.
        let Ok(_guard) = self.inner.evict_lock.try_lock() else {
            return;
        };

        loop {
            let victim = {
                let state = self.inner.state.lock().await;
                if state.occupied < self.inner.max_bytes {
                    break;
                }
                let mut entries: Vec<(PathBuf, SystemTime)> = Vec::new();
                for (source, staged) in &state.map {
                    let accessed = std::fs::metadata(staged)
                        .and_then(|meta| meta.accessed())
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    entries.push((source.clone(), accessed));
                }
                entries.into_iter().min_by_key(|(_, accessed)| *accessed)
            };

            let Some((source, _)) = victim else {
                break;
            };
            debug!("evicting {} from cache", source.display());
            if let Err(err) = self.remove(&source).await {
                warn!("eviction of {} failed: {err}", source.display());
                break;
            }
        }
    }

    async fn persist(&self, state: &CacheState) -> Result<()> {
        let entries: Vec<(&PathBuf, &PathBuf)> = state.map.iter().collect();
        let contents = serde_json::to_vec(&entries)
            .map_err(|err| crate::error::CoreError::Internal(err.to_string()))?;
        tokio::fs::write(&self.inner.index_path, contents).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn write_source(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, contents).await.unwrap();
        path
    }

    #[tokio::test]
    async fn add_get_remove_round_trip() {
        let sources = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let cache = FileCache::open(cache_dir.path(), 1 << 20).await.unwrap();

        let source = write_source(&sources, "a.orf", b"raw bytes").await;
        assert!(!cache.contains(&source).await);

        cache.add(&source).await.unwrap();
        assert!(cache.contains(&source).await);
        assert_eq!(cache.occupied().await, 9);

        let staged = cache.get(&source).await;
        assert_ne!(staged, source);
        assert_eq!(tokio::fs::read(&staged).await.unwrap(), b"raw bytes");

        cache.remove(&source).await.unwrap();
        assert!(!cache.contains(&source).await);
        assert_eq!(cache.occupied().await, 0);
        assert!(cache.remove(&source).await.is_err());
    }

    #[tokio::test]
    async fn miss_returns_source_and_schedules_staging() {
        let sources = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let cache = FileCache::open(cache_dir.path(), 1 << 20).await.unwrap();

        let source = write_source(&sources, "b.orf", b"payload").await;
        let returned = cache.get(&source).await;
        assert_eq!(returned, source);

        // The background staging task completes shortly after.
        for _ in 0..50 {
            if cache.contains(&source).await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(cache.contains(&source).await);
    }

    #[tokio::test]
    async fn eviction_drops_least_recently_accessed() {
        let sources = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let first = write_source(&sources, "first.orf", &[0u8; 512]).await;
        let second = write_source(&sources, "second.orf", &[0u8; 128]).await;

        // Budget equals the first file's size, so staging it saturates the
        // cache and each sweep runs until occupancy drops below budget.
        let cache = FileCache::open(cache_dir.path(), 512).await.unwrap();
        cache.add(&first).await.unwrap();
        cache.add(&second).await.unwrap();

        assert!(!cache.contains(&first).await);
        assert!(cache.contains(&second).await);
        assert!(cache.occupied().await < 512);

        // A subsequent get on the evicted file falls back to the source.
        assert_eq!(cache.get(&first).await, first);
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let sources = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let source = write_source(&sources, "c.orf", b"12345").await;

        {
            let cache = FileCache::open(cache_dir.path(), 1 << 20).await.unwrap();
            cache.add(&source).await.unwrap();
        }

        let cache = FileCache::open(cache_dir.path(), 1 << 20).await.unwrap();
        assert!(cache.contains(&source).await);
        assert_eq!(cache.occupied().await, 5);
    }
}
