use benthos_model::{LaserPoint, Priority};
use sqlx::FromRow;

use super::Catalog;
use crate::error::Result;

impl Catalog {
    /// Frames with a laser JPEG but no laser label row yet, for one priority
    /// tier. These are the tasks the sync worker registers remotely.
    pub async fn frames_needing_laser_labels(&self, priority: Priority) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT i.checksum
            FROM images i
            JOIN dives d ON d.path = i.dive
            LEFT JOIN laser_labels l ON l.checksum = i.checksum
            WHERE i.laser_jpeg_path IS NOT NULL
              AND l.checksum IS NULL
              AND d.priority = $1
            ORDER BY i.checksum
            "#,
        )
        .bind(priority.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    /// Frames with a preprocessed JPEG but no head/tail label row yet.
    pub async fn frames_needing_headtail_labels(
        &self,
        priority: Priority,
    ) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT i.checksum
            FROM images i
            JOIN dives d ON d.path = i.dive
            LEFT JOIN headtail_labels l ON l.checksum = i.checksum
            WHERE i.preprocess_jpeg_path IS NOT NULL
              AND l.checksum IS NULL
              AND d.priority = $1
            ORDER BY i.checksum
            "#,
        )
        .bind(priority.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    pub async fn insert_laser_label(&self, checksum: &str, task_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO laser_labels (checksum, task_id)
            VALUES ($1, $2)
            ON CONFLICT (checksum) DO NOTHING
            "#,
        )
        .bind(checksum)
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_headtail_label(&self, checksum: &str, task_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO headtail_labels (checksum, task_id)
            VALUES ($1, $2)
            ON CONFLICT (checksum) DO NOTHING
            "#,
        )
        .bind(checksum)
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_laser_label_by_task(&self, task_id: i64, x: i32, y: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE laser_labels
            SET x = $2, y = $3, complete = TRUE
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(x)
        .bind(y)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_headtail_label_by_task(
        &self,
        task_id: i64,
        head: (i32, i32),
        tail: (i32, i32),
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE headtail_labels
            SET head_x = $2, head_y = $3, tail_x = $4, tail_y = $5, complete = TRUE
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(head.0)
        .bind(head.1)
        .bind(tail.0)
        .bind(tail.1)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Completed laser keypoint for a frame, if one has come back from the
    /// annotation service.
    pub async fn laser_label(&self, checksum: &str) -> Result<Option<LaserPoint>> {
        #[derive(FromRow)]
        struct Row {
            task_id: i64,
            x: i32,
            y: i32,
        }

        let row = sqlx::query_as::<_, Row>(
            r#"
            SELECT task_id, x, y
            FROM laser_labels
            WHERE checksum = $1 AND x IS NOT NULL AND y IS NOT NULL
            "#,
        )
        .bind(checksum)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| LaserPoint {
            task_id: row.task_id,
            x: row.x,
            y: row.y,
        }))
    }

    /// Returns true when a row was removed.
    pub async fn delete_headtail_label(&self, checksum: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM headtail_labels WHERE checksum = $1")
            .bind(checksum)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
