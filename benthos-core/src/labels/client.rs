use serde::Deserialize;

use crate::error::{CoreError, Result};

/// Minimal client for the annotation service: task import and project
/// export are the only calls this service makes.
#[derive(Debug, Clone)]
pub struct LabelStudioClient {
    http: reqwest::Client,
    base_url: String,
    host: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ImportResponse {
    #[serde(default)]
    task_ids: Vec<i64>,
}

/// One exported task with its (possibly empty) annotations.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportedTask {
    pub id: i64,
    pub data: TaskData,
    #[serde(default)]
    pub annotations: Vec<TaskAnnotation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskData {
    pub img: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskAnnotation {
    #[serde(default)]
    pub result: Vec<KeypointResult>,
}

/// Keypoint annotations come back in percent of the original image.
#[derive(Debug, Clone, Deserialize)]
pub struct KeypointResult {
    pub original_width: f64,
    pub original_height: f64,
    pub value: KeypointValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeypointValue {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub keypointlabels: Vec<String>,
}

impl KeypointResult {
    /// Percent coordinates converted to pixels.
    pub fn pixel(&self) -> (i32, i32) {
        (
            (self.value.x / 100.0 * self.original_width) as i32,
            (self.value.y / 100.0 * self.original_height) as i32,
        )
    }

    pub fn label(&self) -> Option<&str> {
        self.value.keypointlabels.first().map(String::as_str)
    }
}

impl LabelStudioClient {
    pub fn new(host: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("https://{host}"),
            host: host.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn upstream(err: reqwest::Error) -> CoreError {
        CoreError::Upstream(err.to_string())
    }

    /// Create one task whose image URL resolves back to this service.
    /// Returns the new task id.
    pub async fn import_task(&self, project_id: i64, image_url: &str) -> Result<i64> {
        let response = self
            .http
            .post(format!("{}/api/projects/{project_id}/import", self.base_url))
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&serde_json::json!([{ "data": { "img": image_url } }]))
            .send()
            .await
            .map_err(Self::upstream)?;
        if !response.status().is_success() {
            return Err(CoreError::Upstream(format!(
                "task import into project {project_id} failed with {}",
                response.status()
            )));
        }
        let body: ImportResponse = response.json().await.map_err(Self::upstream)?;
        body.task_ids.first().copied().ok_or_else(|| {
            CoreError::Upstream(format!("project {project_id} import returned no task id"))
        })
    }

    /// Full JSON export of a project.
    pub async fn export_tasks(&self, project_id: i64) -> Result<Vec<ExportedTask>> {
        let response = self
            .http
            .get(format!("{}/api/projects/{project_id}/export", self.base_url))
            .query(&[("exportType", "JSON")])
            .header("Authorization", format!("Token {}", self.api_key))
            .send()
            .await
            .map_err(Self::upstream)?;
        if !response.status().is_success() {
            return Err(CoreError::Upstream(format!(
                "export of project {project_id} failed with {}",
                response.status()
            )));
        }
        response.json().await.map_err(Self::upstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_parses_keypoints() {
        let raw = r#"[
            {
                "id": 771,
                "data": {"img": "https://svc/api/v1/data/laser_jpeg/0123abcd"},
                "annotations": [
                    {
                        "result": [
                            {
                                "original_width": 4000,
                                "original_height": 3000,
                                "value": {"x": 50.0, "y": 25.0, "keypointlabels": ["Laser"]}
                            }
                        ]
                    }
                ]
            },
            {"id": 772, "data": {"img": "https://svc/api/v1/data/laser_jpeg/ffff"}}
        ]"#;
        let tasks: Vec<ExportedTask> = serde_json::from_str(raw).unwrap();
        assert_eq!(tasks.len(), 2);
        let result = &tasks[0].annotations[0].result[0];
        assert_eq!(result.pixel(), (2000, 750));
        assert_eq!(result.label(), Some("Laser"));
        assert!(tasks[1].annotations.is_empty());
    }
}
