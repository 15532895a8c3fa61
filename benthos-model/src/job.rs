use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a job lease.
///
/// The numeric codes are persisted in the `jobs` table and are part of the
/// external contract; do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending = 0,
    InProgress = 1,
    Cancelled = 2,
    Failed = 3,
    Expired = 4,
}

impl JobStatus {
    /// Persistence code stored in the catalog.
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(JobStatus::Pending),
            1 => Some(JobStatus::InProgress),
            2 => Some(JobStatus::Cancelled),
            3 => Some(JobStatus::Failed),
            4 => Some(JobStatus::Expired),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
            JobStatus::Expired => "expired",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "cancelled" => Ok(JobStatus::Cancelled),
            "failed" => Ok(JobStatus::Failed),
            "expired" => Ok(JobStatus::Expired),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Kind of preprocessing a worker performs for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Produce the plain preprocessed JPEG used for head/tail labeling.
    Preprocess,
    /// Produce the laser-annotated JPEG used for laser labeling.
    PreprocessWithLaser,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Preprocess => "preprocess",
            JobType::PreprocessWithLaser => "preprocess_with_laser",
        }
    }
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preprocess" => Ok(JobType::Preprocess),
            "preprocess_with_laser" => Ok(JobType::PreprocessWithLaser),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

/// Dive priority, which orders the candidate pools during batch issue and
/// selects the labeling project a frame is registered with.
///
/// A dive inherits the priority of the data root it was discovered under;
/// roots without an explicit priority are low.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Low => "low",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issued job as it appears in the batch response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job UUID, serialized without hyphens on the wire.
    #[serde(rename = "jobId", with = "uuid::serde::simple")]
    pub job_id: Uuid,
    /// Checksums of the member frames.
    #[serde(rename = "frameIds")]
    pub frame_ids: Vec<String>,
    #[serde(rename = "cameraId")]
    pub camera_id: i32,
    pub operation: JobType,
    #[serde(rename = "diveId")]
    pub dive_id: String,
}

/// Response body of a batch retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDocument {
    pub jobs: Vec<JobRecord>,
}

impl JobDocument {
    pub fn frame_count(&self) -> usize {
        self.jobs.iter().map(|job| job.frame_ids.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_contractual() {
        let expected = [
            (JobStatus::Pending, 0),
            (JobStatus::InProgress, 1),
            (JobStatus::Cancelled, 2),
            (JobStatus::Failed, 3),
            (JobStatus::Expired, 4),
        ];
        for (status, code) in expected {
            assert_eq!(status.code(), code);
            assert_eq!(JobStatus::from_code(code), Some(status));
        }
        assert_eq!(JobStatus::from_code(5), None);
    }

    #[test]
    fn status_round_trips_through_names() {
        for status in [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Cancelled,
            JobStatus::Failed,
            JobStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Expired.is_terminal());
    }

    #[test]
    fn job_id_serializes_without_hyphens() {
        let record = JobRecord {
            job_id: Uuid::nil(),
            frame_ids: vec!["aa".into()],
            camera_id: 3,
            operation: JobType::Preprocess,
            dive_id: "2024-07/dive1".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["jobId"], "00000000000000000000000000000000");
        assert_eq!(json["operation"], "preprocess");
        assert_eq!(json["diveId"], "2024-07/dive1");
    }

    #[test]
    fn frame_count_sums_over_jobs() {
        let doc = JobDocument {
            jobs: vec![
                JobRecord {
                    job_id: Uuid::new_v4(),
                    frame_ids: vec!["a".into(), "b".into()],
                    camera_id: 1,
                    operation: JobType::PreprocessWithLaser,
                    dive_id: "d1".into(),
                },
                JobRecord {
                    job_id: Uuid::new_v4(),
                    frame_ids: vec!["c".into()],
                    camera_id: 2,
                    operation: JobType::Preprocess,
                    dive_id: "d2".into(),
                },
            ],
        };
        assert_eq!(doc.frame_count(), 3);
    }
}
