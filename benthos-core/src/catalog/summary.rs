use super::Catalog;
use crate::error::Result;

/// Tables counted by the summary worker.
pub const SUMMARY_TABLES: &[&str] = &[
    "images",
    "dives",
    "canonical_dives",
    "cameras",
    "jobs",
    "laser_labels",
    "headtail_labels",
];

impl Catalog {
    /// Row counts per catalog table.
    pub async fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let mut counts = Vec::with_capacity(SUMMARY_TABLES.len());
        for table in SUMMARY_TABLES {
            // Table names come from the static list above, never from input.
            let query = format!("SELECT COUNT(*) FROM {table}");
            let (count,): (i64,) = sqlx::query_as(&query).fetch_one(&self.pool).await?;
            counts.push((*table, count));
        }
        Ok(counts)
    }

    /// Job counts grouped by status code.
    pub async fn job_status_counts(&self) -> Result<Vec<(i16, i64)>> {
        let rows: Vec<(i16, i64)> = sqlx::query_as(
            "SELECT job_status, COUNT(*) FROM jobs GROUP BY job_status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
