use benthos_model::{DiveMetadata, DiveSummary, Priority};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

use super::Catalog;
use crate::error::Result;

/// Representative dive for a checksum not yet promoted.
#[derive(Debug, Clone, FromRow)]
pub struct CandidateDive {
    pub path: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, FromRow)]
struct DiveRow {
    path: String,
    checksum: Option<String>,
    date: Option<NaiveDate>,
    invalid_image: bool,
    multiple_date: bool,
    priority: String,
}

impl From<DiveRow> for DiveSummary {
    fn from(row: DiveRow) -> Self {
        let priority = match row.priority.as_str() {
            "high" => Priority::High,
            _ => Priority::Low,
        };
        DiveSummary {
            path: row.path,
            checksum: row.checksum,
            date: row.date,
            invalid_image: row.invalid_image,
            multiple_date: row.multiple_date,
            priority,
        }
    }
}

impl Catalog {
    /// Register a dive with the priority of its data root. Re-registration
    /// refreshes the priority, so the root listing stays authoritative.
    pub async fn insert_dive_path(&self, path: &str, priority: Priority) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dives (path, priority)
            VALUES ($1, $2)
            ON CONFLICT (path) DO UPDATE SET priority = EXCLUDED.priority
            "#,
        )
        .bind(path)
        .bind(priority.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn all_dive_paths(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT path FROM dives ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    /// Member images of a dive, path-sorted, as `(path, checksum)` pairs.
    pub async fn dive_members(&self, dive: &str) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT path, checksum FROM images WHERE dive = $1 ORDER BY path",
        )
        .bind(dive)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update_dive_checksum(&self, path: &str, checksum: &str) -> Result<()> {
        sqlx::query("UPDATE dives SET checksum = $1 WHERE path = $2")
            .bind(checksum)
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Dive checksums present on dives but absent from `canonical_dives`.
    pub async fn unpromoted_dive_checksums(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT d.checksum
            FROM dives d
            WHERE d.checksum IS NOT NULL
              AND NOT EXISTS (
                  SELECT 1 FROM canonical_dives c WHERE c.checksum = d.checksum
              )
            ORDER BY d.checksum
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    /// The stable representative for a dive checksum: lowest path wins.
    pub async fn candidate_dive_by_checksum(
        &self,
        checksum: &str,
    ) -> Result<Option<CandidateDive>> {
        let row = sqlx::query_as::<_, CandidateDive>(
            "SELECT path, date FROM dives WHERE checksum = $1 ORDER BY path LIMIT 1",
        )
        .bind(checksum)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Returns true when the row was actually inserted.
    pub async fn insert_canonical_dive(
        &self,
        checksum: &str,
        path: &str,
        date: Option<NaiveDate>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO canonical_dives (checksum, path, date)
            VALUES ($1, $2, $3)
            ON CONFLICT (checksum) DO NOTHING
            "#,
        )
        .bind(checksum)
        .bind(path)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Representative paths of all canonical dives.
    pub async fn canonical_dive_paths(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT path FROM canonical_dives ORDER BY path")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    /// Distinct camera ids across a dive's member images.
    pub async fn cameras_for_dive(&self, dive: &str) -> Result<Vec<i32>> {
        let rows: Vec<(i32,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT c.idx
            FROM images i
            JOIN cameras c ON c.serial_number = i.camera_sn
            WHERE i.dive = $1
            ORDER BY c.idx
            "#,
        )
        .bind(dive)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    pub async fn update_canonical_dive_camera(&self, path: &str, camera_idx: i32) -> Result<()> {
        sqlx::query("UPDATE canonical_dives SET camera_idx = $1 WHERE path = $2")
            .bind(camera_idx)
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Capture timestamps of a dive's members, missing ones included.
    pub async fn dive_member_dates(&self, dive: &str) -> Result<Vec<Option<DateTime<Utc>>>> {
        let rows: Vec<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT date FROM images WHERE dive = $1")
                .bind(dive)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    pub async fn update_dive_dates(
        &self,
        path: &str,
        date: NaiveDate,
        invalid_image: bool,
        multiple_date: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE dives
            SET date = $1, invalid_image = $2, multiple_date = $3
            WHERE path = $4
            "#,
        )
        .bind(date)
        .bind(invalid_image)
        .bind(multiple_date)
        .bind(path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Canonical dive by checksum, with the member frames of its
    /// representative dive.
    pub async fn dive_metadata(&self, checksum: &str) -> Result<Option<DiveMetadata>> {
        #[derive(FromRow)]
        struct CanonicalRow {
            checksum: String,
            path: String,
            date: Option<NaiveDate>,
            camera_idx: Option<i32>,
        }

        let row = sqlx::query_as::<_, CanonicalRow>(
            "SELECT checksum, path, date, camera_idx FROM canonical_dives WHERE checksum = $1",
        )
        .bind(checksum)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let frames: Vec<(String,)> = sqlx::query_as(
            "SELECT checksum FROM images WHERE dive = $1 ORDER BY path",
        )
        .bind(&row.path)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(DiveMetadata {
            checksum: row.checksum,
            path: row.path,
            date: row.date,
            camera_id: row.camera_idx,
            frames: frames.into_iter().map(|frame| frame.0).collect(),
        }))
    }

    pub async fn list_dive_summaries(&self) -> Result<Vec<DiveSummary>> {
        let rows = sqlx::query_as::<_, DiveRow>(
            r#"
            SELECT path, checksum, date, invalid_image, multiple_date, priority
            FROM dives
            ORDER BY path
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DiveSummary::from).collect())
    }
}
