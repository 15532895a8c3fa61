use benthos_model::{JobStatus, JobType, Priority};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use super::Catalog;
use crate::error::Result;

/// One candidate job: the frames of a single dive/camera grouping.
#[derive(Debug, Clone, FromRow)]
pub struct PoolRow {
    pub dive: String,
    pub camera_idx: i32,
    pub checksums: Vec<String>,
}

/// Head/tail candidates: frames with no plain preprocessed JPEG yet and no
/// live head/tail claim. `FOR UPDATE SKIP LOCKED` keeps concurrent batch
/// calls disjoint.
const SELECT_HEADTAIL_CANDIDATES: &str = r#"
    SELECT t.dive, t.camera_idx, ARRAY_AGG(t.checksum) AS checksums
    FROM (
        SELECT i.checksum, i.dive, c.idx AS camera_idx
        FROM images i
        JOIN dives d ON d.path = i.dive
        JOIN cameras c ON c.serial_number = i.camera_sn
        WHERE d.priority = $1
          AND i.headtail_job IS NULL
          AND i.preprocess_jpeg_path IS NULL
        ORDER BY i.dive, i.path
        LIMIT $2
        FOR UPDATE OF i SKIP LOCKED
    ) AS t
    GROUP BY t.dive, t.camera_idx
    ORDER BY t.dive
"#;

/// Laser candidates: frames with no laser JPEG yet and no live laser claim.
const SELECT_LASER_CANDIDATES: &str = r#"
    SELECT t.dive, t.camera_idx, ARRAY_AGG(t.checksum) AS checksums
    FROM (
        SELECT i.checksum, i.dive, c.idx AS camera_idx
        FROM images i
        JOIN dives d ON d.path = i.dive
        JOIN cameras c ON c.serial_number = i.camera_sn
        WHERE d.priority = $1
          AND i.preprocess_job IS NULL
          AND i.laser_jpeg_path IS NULL
        ORDER BY i.dive, i.path
        LIMIT $2
        FOR UPDATE OF i SKIP LOCKED
    ) AS t
    GROUP BY t.dive, t.camera_idx
    ORDER BY t.dive
"#;

impl Catalog {
    /// Select up to `limit` claimable frames for one pool, grouped per
    /// dive/camera. Runs on the batch transaction so the row locks hold
    /// until the claims commit.
    pub async fn next_preprocess_candidates(
        &self,
        conn: &mut PgConnection,
        job_type: JobType,
        priority: Priority,
        limit: i64,
    ) -> Result<Vec<PoolRow>> {
        let statement = match job_type {
            JobType::Preprocess => SELECT_HEADTAIL_CANDIDATES,
            JobType::PreprocessWithLaser => SELECT_LASER_CANDIDATES,
        };
        let rows = sqlx::query_as::<_, PoolRow>(statement)
            .bind(priority.as_str())
            .bind(limit)
            .fetch_all(conn)
            .await?;
        Ok(rows)
    }

    pub async fn insert_job(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
        worker: &str,
        origin: &str,
        job_type: JobType,
        expiration: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, worker, origin, job_type, expiration, job_status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(job_id)
        .bind(worker)
        .bind(origin)
        .bind(job_type.as_str())
        .bind(expiration)
        .bind(JobStatus::Pending.code())
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Claim frames for a laser job.
    pub async fn update_preprocess_job(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
        checksums: &[String],
    ) -> Result<()> {
        sqlx::query("UPDATE images SET preprocess_job = $1 WHERE checksum = ANY($2)")
            .bind(job_id)
            .bind(checksums)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Claim frames for a head/tail job.
    pub async fn update_headtail_preprocess_job(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
        checksums: &[String],
    ) -> Result<()> {
        sqlx::query("UPDATE images SET headtail_job = $1 WHERE checksum = ANY($2)")
            .bind(job_id)
            .bind(checksums)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Move a job out of an open state. Returns false when the row is
    /// missing or already terminal; terminal rows never transition again.
    pub async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        progress: Option<i16>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET job_status = $2, progress = COALESCE($3, progress)
            WHERE job_id = $1 AND job_status IN (0, 1)
            "#,
        )
        .bind(job_id)
        .bind(status.code())
        .bind(progress)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn job_type(&self, job_id: Uuid) -> Result<Option<JobType>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT job_type FROM jobs WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((name,)) => name
                .parse()
                .map(Some)
                .map_err(crate::error::CoreError::Internal),
            None => Ok(None),
        }
    }

    /// Release the laser-claim on a cancelled or expired job's frames.
    pub async fn cancel_preprocess_job(&self, conn: &mut PgConnection, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE images SET preprocess_job = NULL WHERE preprocess_job = $1")
            .bind(job_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Release the head/tail claim on a cancelled or expired job's frames.
    pub async fn cancel_headtail_preprocess_job(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
    ) -> Result<()> {
        sqlx::query("UPDATE images SET headtail_job = NULL WHERE headtail_job = $1")
            .bind(job_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Open jobs whose lease has lapsed.
    pub async fn expired_jobs(&self) -> Result<Vec<(Uuid, String)>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT job_id, job_type
            FROM jobs
            WHERE job_status IN (0, 1) AND expiration < NOW()
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_job_expired(&self, conn: &mut PgConnection, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET job_status = $2 WHERE job_id = $1 AND job_status IN (0, 1)",
        )
        .bind(job_id)
        .bind(JobStatus::Expired.code())
        .execute(conn)
        .await?;
        Ok(())
    }

    /// A job id is valid iff the jobs table holds a matching row, any status.
    pub async fn job_exists(&self, job_id: Uuid) -> Result<bool> {
        let row: Option<(i16,)> =
            sqlx::query_as("SELECT job_status FROM jobs WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }
}
