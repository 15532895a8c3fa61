use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::Priority;

/// Catalog row for a single frame as returned by the metadata endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub checksum: String,
    pub path: String,
    pub dive: String,
    pub data_path: String,
    pub camera_sn: Option<String>,
    pub camera_id: Option<i32>,
    pub date: Option<DateTime<Utc>>,
    pub preprocess_jpeg_path: Option<String>,
    pub laser_jpeg_path: Option<String>,
}

/// Canonical dive with its member frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiveMetadata {
    pub checksum: String,
    pub path: String,
    pub date: Option<NaiveDate>,
    pub camera_id: Option<i32>,
    pub frames: Vec<String>,
}

/// One row of the dive listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiveSummary {
    pub path: String,
    pub checksum: Option<String>,
    pub date: Option<NaiveDate>,
    pub invalid_image: bool,
    pub multiple_date: bool,
    pub priority: Priority,
}

/// Laser keypoint label as served to workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaserPoint {
    pub task_id: i64,
    pub x: i32,
    pub y: i32,
}
