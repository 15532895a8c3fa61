use super::Catalog;
use crate::error::Result;

impl Catalog {
    /// UNC path of the lens calibration package for a camera.
    pub async fn lens_cal_unc_path(&self, camera_id: i32) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT lens_cal_path FROM cameras WHERE idx = $1")
                .bind(camera_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|r| r.0))
    }
}
