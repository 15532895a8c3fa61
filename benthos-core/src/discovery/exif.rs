//! Image metadata extraction: EXIF capture timestamps in-process, camera
//! serial numbers through the configured external metadata tool.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::error::{CoreError, Result};

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Why a capture timestamp could not be extracted. Failures are observable
/// per image and excluded from dive date aggregation.
#[derive(Debug, Error)]
pub enum ExifError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF parse error: {0}")]
    Parse(#[from] exif::Error),

    #[error("no DateTime tag")]
    MissingDateTime,

    #[error("bad DateTime value: {0}")]
    BadDateTime(String),
}

/// EXIF capture timestamp of an image. Camera clocks are UTC in the field.
pub fn extract_image_date(path: &Path) -> std::result::Result<DateTime<Utc>, ExifError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader)?;
    let field = exif
        .get_field(exif::Tag::DateTime, exif::In::PRIMARY)
        .ok_or(ExifError::MissingDateTime)?;

    let text = match &field.value {
        exif::Value::Ascii(values) if !values.is_empty() => {
            String::from_utf8_lossy(&values[0]).trim().to_string()
        }
        other => return Err(ExifError::BadDateTime(format!("{other:?}"))),
    };
    let naive = NaiveDateTime::parse_from_str(&text, EXIF_DATETIME_FORMAT)
        .map_err(|_| ExifError::BadDateTime(text.clone()))?;
    Ok(naive.and_utc())
}

#[derive(Debug, Deserialize)]
struct ExiftoolEntry {
    #[serde(rename = "SourceFile")]
    source_file: PathBuf,
    #[serde(rename = "SerialNumber")]
    serial_number: Option<SerialValue>,
}

/// exiftool reports serials as numbers or strings depending on the camera.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SerialValue {
    Number(i64),
    Text(String),
}

impl SerialValue {
    fn into_string(self) -> String {
        match self {
            SerialValue::Number(n) => n.to_string(),
            SerialValue::Text(s) => s,
        }
    }
}

/// Camera serial numbers for a batch of files, via `exiftool -json`.
/// Files the tool reports no serial for are absent from the result.
pub async fn camera_serials(
    exiftool: &Path,
    paths: &[PathBuf],
) -> Result<HashMap<PathBuf, String>> {
    if paths.is_empty() {
        return Ok(HashMap::new());
    }

    let output = tokio::process::Command::new(exiftool)
        .arg("-json")
        .arg("-SerialNumber")
        .args(paths)
        .output()
        .await?;

    // exiftool exits non-zero when any file is unreadable but still emits
    // entries for the rest; parse whatever came back.
    let entries: Vec<ExiftoolEntry> = serde_json::from_slice(&output.stdout).map_err(|err| {
        CoreError::Internal(format!("unparseable exiftool output: {err}"))
    })?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            entry
                .serial_number
                .map(|serial| (entry.source_file, serial.into_string()))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn missing_exif_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not an image").unwrap();
        assert!(extract_image_date(file.path()).is_err());
    }

    #[test]
    fn exiftool_entries_parse_numbers_and_strings() {
        let raw = r#"[
            {"SourceFile": "/mnt/reef/d1/AAA.ORF", "SerialNumber": 12345},
            {"SourceFile": "/mnt/reef/d1/BBB.ORF", "SerialNumber": "BHQ501"},
            {"SourceFile": "/mnt/reef/d1/CCC.ORF"}
        ]"#;
        let entries: Vec<ExiftoolEntry> = serde_json::from_str(raw).unwrap();
        let serials: HashMap<PathBuf, String> = entries
            .into_iter()
            .filter_map(|e| e.serial_number.map(|s| (e.source_file, s.into_string())))
            .collect();
        assert_eq!(serials.len(), 2);
        assert_eq!(serials[Path::new("/mnt/reef/d1/AAA.ORF")], "12345");
        assert_eq!(serials[Path::new("/mnt/reef/d1/BBB.ORF")], "BHQ501");
    }
}
