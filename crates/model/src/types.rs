use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::MetaError;

/// A single file captured for upload.
///
/// `relative_path` uses `/` as separator on every platform. It either
/// starts with a top-level directory segment (`site1/a.jpg`) or equals
/// `name` for files collected without folder context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub relative_path: String,
    pub size: u64,
    pub mime_type: String,
    /// Local path the transport reads the bytes from.
    pub source: PathBuf,
}

/// Validated session metadata, frozen before an upload session starts.
///
/// Constructed only through [`SessionMeta::new`]; the fields stay
/// private so a session can never run with unvalidated metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    user: String,
    camera: String,
    date: String,
    task: String,
}

impl SessionMeta {
    /// Validates and freezes metadata for a session.
    ///
    /// Every field is trimmed and must be non-empty; `date` must parse
    /// as `YYYY-MM-DD`.
    pub fn new(user: &str, camera: &str, date: &str, task: &str) -> Result<Self, MetaError> {
        let user = required(user, "user")?;
        let camera = required(camera, "camera")?;
        let date = required(date, "date")?;
        let task = required(task, "task")?;

        if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
            return Err(MetaError::InvalidDate(date));
        }

        Ok(Self {
            user,
            camera,
            date,
            task,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn task(&self) -> &str {
        &self.task
    }
}

fn required(value: &str, field: &'static str) -> Result<String, MetaError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MetaError::Missing(field));
    }
    Ok(trimmed.to_string())
}
