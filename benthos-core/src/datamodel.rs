//! Access to raw files and preprocessed artifacts on the network stores.
//!
//! Catalog rows record UNC paths; this layer maps them onto the local
//! mounts, caps read sizes, and stages slow reads through the file cache.

use std::path::{Path, PathBuf};

use benthos_config::{DataModelSettings, DataPathEntry};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::FileCache;
use crate::catalog::Catalog;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct DataModel {
    catalog: Catalog,
    cache: FileCache,
    mounts: Vec<DataPathEntry>,
    max_load_size: u64,
    preprocess_store: PathBuf,
    laser_store: PathBuf,
    debug_store: PathBuf,
}

impl DataModel {
    pub fn new(
        catalog: Catalog,
        cache: FileCache,
        mounts: Vec<DataPathEntry>,
        settings: &DataModelSettings,
    ) -> Self {
        Self {
            catalog,
            cache,
            mounts,
            max_load_size: settings.max_load_size,
            preprocess_store: settings.preprocess_jpg_store.clone(),
            laser_store: settings.preprocess_laser_jpg_store.clone(),
            debug_store: settings.debug_data_store.clone(),
        }
    }

    /// Map a UNC path onto its local mount.
    pub fn map_local_path(&self, unc_path: &Path) -> Result<PathBuf> {
        let matching: Vec<&DataPathEntry> = self
            .mounts
            .iter()
            .filter(|entry| unc_path.starts_with(&entry.unc_path))
            .collect();
        if matching.is_empty() {
            return Err(CoreError::Mount(unc_path.display().to_string()));
        }
        if matching.len() > 1 {
            warn!("multiple mounts match {}", unc_path.display());
        }
        let entry = matching[0];
        let relative = unc_path
            .strip_prefix(&entry.unc_path)
            .map_err(|_| CoreError::Mount(unc_path.display().to_string()))?;
        let local = entry.mount.join(relative);
        debug!("mapped {} to {}", unc_path.display(), local.display());
        Ok(local)
    }

    /// Read a local file, capped at the configured load size.
    async fn read_capped(&self, path: &Path) -> Result<Vec<u8>> {
        let file = tokio::fs::File::open(path).await.map_err(|_| {
            CoreError::NotFound(format!("{} not found", path.display()))
        })?;
        let mut contents = Vec::new();
        file.take(self.max_load_size).read_to_end(&mut contents).await?;
        Ok(contents)
    }

    /// Raw bytes for a registered checksum, staged through the cache.
    pub async fn raw_file_bytes(&self, checksum: &str) -> Result<Vec<u8>> {
        let unc_path = self
            .catalog
            .raw_unc_path(checksum)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("{checksum} is not a known checksum")))?;
        let local = self.map_local_path(Path::new(&unc_path))?;
        let staged = self.cache.get(&local).await;
        self.read_capped(&staged).await
    }

    /// Lens calibration package for a camera.
    pub async fn lens_cal_bytes(&self, camera_id: i32) -> Result<Vec<u8>> {
        let unc_path = self
            .catalog
            .lens_cal_unc_path(camera_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("{camera_id} is not a known camera")))?;
        let local = self.map_local_path(Path::new(&unc_path))?;
        self.read_capped(&local).await
    }

    fn artifact_unc_path(store: &Path, checksum: &str) -> PathBuf {
        store.join(format!("{checksum}.JPG"))
    }

    async fn require_known_checksum(&self, checksum: &str) -> Result<()> {
        self.catalog
            .raw_unc_path(checksum)
            .await?
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("{checksum} is not a known checksum")))
    }

    pub async fn preprocess_jpeg(&self, checksum: &str) -> Result<Vec<u8>> {
        self.require_known_checksum(checksum).await?;
        let unc = Self::artifact_unc_path(&self.preprocess_store, checksum);
        let local = self.map_local_path(&unc)?;
        self.read_capped(&local).await
    }

    pub async fn put_preprocess_jpeg(&self, checksum: &str, data: &[u8]) -> Result<()> {
        self.require_known_checksum(checksum).await?;
        let unc = Self::artifact_unc_path(&self.preprocess_store, checksum);
        let local = self.map_local_path(&unc)?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&local, data).await?;
        self.catalog
            .update_preprocess_jpeg_path(checksum, &unc.to_string_lossy())
            .await
    }

    pub async fn laser_jpeg(&self, checksum: &str) -> Result<Vec<u8>> {
        self.require_known_checksum(checksum).await?;
        let unc = Self::artifact_unc_path(&self.laser_store, checksum);
        let local = self.map_local_path(&unc)?;
        self.read_capped(&local).await
    }

    pub async fn put_laser_jpeg(&self, checksum: &str, data: &[u8]) -> Result<()> {
        self.require_known_checksum(checksum).await?;
        let unc = Self::artifact_unc_path(&self.laser_store, checksum);
        let local = self.map_local_path(&unc)?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&local, data).await?;
        self.catalog
            .update_laser_jpeg_path(checksum, &unc.to_string_lossy())
            .await
    }

    pub async fn delete_laser_jpeg(&self, checksum: &str) -> Result<()> {
        self.require_known_checksum(checksum).await?;
        let unc = Self::artifact_unc_path(&self.laser_store, checksum);
        let local = self.map_local_path(&unc)?;
        match tokio::fs::remove_file(&local).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        self.catalog.clear_laser_jpeg_path(checksum).await
    }

    /// Store a worker's debug archive under its job id.
    pub async fn put_debug_blob(&self, id: Uuid, data: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.debug_store).await?;
        let path = self.debug_store.join(format!("{id}.zip"));
        tokio::fs::write(&path, data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use benthos_config::DataModelSettings;
    use benthos_model::Priority;
    use sqlx::postgres::PgPoolOptions;
    use tempfile::TempDir;

    use super::*;

    async fn test_model(mounts: Vec<DataPathEntry>, max_load_size: u64) -> (DataModel, TempDir) {
        let cache_dir = TempDir::new().unwrap();
        let cache = FileCache::open(cache_dir.path(), 1 << 20).await.unwrap();
        // No queries run in these tests, so a lazy pool suffices.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .unwrap();
        let settings = DataModelSettings {
            max_load_size,
            preprocess_jpg_store: PathBuf::from("//nas/preprocess"),
            preprocess_laser_jpg_store: PathBuf::from("//nas/laser"),
            debug_data_store: cache_dir.path().join("debug"),
        };
        let model = DataModel::new(Catalog::from_pool(pool), cache, mounts, &settings);
        (model, cache_dir)
    }

    #[tokio::test]
    async fn maps_unc_paths_onto_mounts() {
        let mount = TempDir::new().unwrap();
        let (model, _guard) = test_model(
            vec![DataPathEntry {
                unc_path: PathBuf::from("//nas/reef_2024"),
                mount: mount.path().to_path_buf(),
                priority: Priority::Low,
            }],
            1024,
        )
        .await;

        let local = model
            .map_local_path(Path::new("//nas/reef_2024/dive1/AAA.ORF"))
            .unwrap();
        assert_eq!(local, mount.path().join("dive1/AAA.ORF"));

        let err = model
            .map_local_path(Path::new("//nas/other/dive1/AAA.ORF"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Mount(_)));
    }

    #[tokio::test]
    async fn reads_are_capped_at_max_load_size() {
        let mount = TempDir::new().unwrap();
        let (model, _guard) = test_model(
            vec![DataPathEntry {
                unc_path: PathBuf::from("//nas/reef_2024"),
                mount: mount.path().to_path_buf(),
                priority: Priority::Low,
            }],
            4,
        )
        .await;

        let file = mount.path().join("big.bin");
        tokio::fs::write(&file, b"0123456789").await.unwrap();
        let contents = model.read_capped(&file).await.unwrap();
        assert_eq!(contents, b"0123");

        let missing = model.read_capped(&mount.path().join("gone.bin")).await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn debug_blobs_land_in_the_debug_store() {
        let mount = TempDir::new().unwrap();
        let (model, guard) = test_model(
            vec![DataPathEntry {
                unc_path: PathBuf::from("//nas/reef_2024"),
                mount: mount.path().to_path_buf(),
                priority: Priority::Low,
            }],
            1024,
        )
        .await;

        let id = Uuid::new_v4();
        model.put_debug_blob(id, b"PK\x03\x04").await.unwrap();
        let stored = guard.path().join("debug").join(format!("{id}.zip"));
        assert_eq!(tokio::fs::read(stored).await.unwrap(), b"PK\x03\x04");
    }
}
