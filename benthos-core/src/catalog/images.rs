use std::collections::HashSet;

use benthos_model::FrameMetadata;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::Catalog;
use crate::error::Result;

/// Where a registered image lives on the network store.
#[derive(Debug, Clone, FromRow)]
pub struct ImageLocation {
    pub checksum: String,
    pub data_path: String,
    pub path: String,
}

#[derive(Debug, FromRow)]
struct FrameRow {
    checksum: String,
    path: String,
    dive: String,
    data_path: String,
    camera_sn: Option<String>,
    camera_id: Option<i32>,
    date: Option<DateTime<Utc>>,
    preprocess_jpeg_path: Option<String>,
    laser_jpeg_path: Option<String>,
}

impl From<FrameRow> for FrameMetadata {
    fn from(row: FrameRow) -> Self {
        FrameMetadata {
            checksum: row.checksum,
            path: row.path,
            dive: row.dive,
            data_path: row.data_path,
            camera_sn: row.camera_sn,
            camera_id: row.camera_id,
            date: row.date,
            preprocess_jpeg_path: row.preprocess_jpeg_path,
            laser_jpeg_path: row.laser_jpeg_path,
        }
    }
}

impl Catalog {
    /// Which of the given relative paths under a data root are already
    /// registered. One round trip per discovery batch.
    pub async fn known_image_paths(
        &self,
        data_path: &str,
        paths: &[String],
    ) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT path FROM images WHERE data_path = $1 AND path = ANY($2)",
        )
        .bind(data_path)
        .bind(paths)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    pub async fn insert_image(
        &self,
        path: &str,
        dive: &str,
        checksum: &str,
        data_path: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO images (checksum, path, dive, data_path)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(checksum)
        .bind(path)
        .bind(dive)
        .bind(data_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn images_without_camera_sn(&self, limit: i64) -> Result<Vec<ImageLocation>> {
        let rows = sqlx::query_as::<_, ImageLocation>(
            r#"
            SELECT checksum, data_path, path
            FROM images
            WHERE camera_sn IS NULL
            ORDER BY checksum
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update_image_camera_sn(&self, checksum: &str, camera_sn: &str) -> Result<()> {
        sqlx::query("UPDATE images SET camera_sn = $1 WHERE checksum = $2")
            .bind(camera_sn)
            .bind(checksum)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn images_without_date(&self, limit: i64) -> Result<Vec<ImageLocation>> {
        let rows = sqlx::query_as::<_, ImageLocation>(
            r#"
            SELECT checksum, data_path, path
            FROM images
            WHERE date IS NULL
            ORDER BY checksum
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update_image_date(&self, checksum: &str, date: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE images SET date = $1 WHERE checksum = $2")
            .bind(date)
            .bind(checksum)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Full UNC path of the raw file behind a checksum.
    pub async fn raw_unc_path(&self, checksum: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT data_path || '/' || path FROM images WHERE checksum = $1",
        )
        .bind(checksum)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn update_preprocess_jpeg_path(
        &self,
        checksum: &str,
        unc_path: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE images SET preprocess_jpeg_path = $1 WHERE checksum = $2")
            .bind(unc_path)
            .bind(checksum)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_laser_jpeg_path(&self, checksum: &str, unc_path: &str) -> Result<()> {
        sqlx::query("UPDATE images SET laser_jpeg_path = $1 WHERE checksum = $2")
            .bind(unc_path)
            .bind(checksum)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear_laser_jpeg_path(&self, checksum: &str) -> Result<()> {
        sqlx::query("UPDATE images SET laser_jpeg_path = NULL WHERE checksum = $1")
            .bind(checksum)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn frame_metadata(&self, checksum: &str) -> Result<Option<FrameMetadata>> {
        let row = sqlx::query_as::<_, FrameRow>(
            r#"
            SELECT i.checksum, i.path, i.dive, i.data_path, i.camera_sn,
                   c.idx AS camera_id, i.date,
                   i.preprocess_jpeg_path, i.laser_jpeg_path
            FROM images i
            LEFT JOIN cameras c ON c.serial_number = i.camera_sn
            WHERE i.checksum = $1
            "#,
        )
        .bind(checksum)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FrameMetadata::from))
    }
}
