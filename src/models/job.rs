use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::FetchdError;
use crate::models::FetchOutcome;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    None,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub remote_source: String,
    pub local_path: String,
    pub public_path: String,
    #[serde(default)]
    pub period_minutes: u64,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_status: JobStatus,
    pub last_message: Option<String>,
}

impl Job {
    /// Build a fresh job record with no fetch history.
    pub fn new(id: Uuid, new: NewJob, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            remote_source: new.remote_source.trim().to_string(),
            local_path: new.local_path.trim().to_string(),
            public_path: new.public_path.trim().to_string(),
            period_minutes: new.period_minutes,
            created_at,
            last_run_at: None,
            last_status: JobStatus::None,
            last_message: None,
        }
    }

    /// Replace the user-supplied definition, keeping identity and fetch history.
    pub fn redefine(&self, new: NewJob) -> Self {
        Self {
            last_run_at: self.last_run_at,
            last_status: self.last_status,
            last_message: self.last_message.clone(),
            ..Job::new(self.id, new, self.created_at)
        }
    }

    /// Write the status triple of one fetch attempt.
    pub fn apply_outcome(&mut self, outcome: &FetchOutcome, at: DateTime<Utc>) {
        self.last_run_at = Some(at);
        self.last_status = if outcome.ok {
            JobStatus::Success
        } else {
            JobStatus::Error
        };
        self.last_message = Some(outcome.message.clone());
    }

    pub fn is_recurring(&self) -> bool {
        self.period_minutes > 0
    }

    /// Whether this job is exposed under `requested`. Leading slashes are
    /// ignored on both sides.
    pub fn serves(&self, requested: &str) -> bool {
        self.public_path.trim_start_matches('/') == requested.trim_start_matches('/')
    }
}

/// A job definition as submitted by a client.
///
/// The older download-config field names (`url`, `serve_url`, `period`)
/// are accepted as aliases. Required fields default to
/// empty so that a missing field surfaces as a validation error rather than a
/// deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NewJob {
    #[serde(default, alias = "url")]
    pub remote_source: String,
    #[serde(default)]
    pub local_path: String,
    #[serde(default, alias = "serve_url")]
    pub public_path: String,
    #[serde(default, alias = "period")]
    pub period_minutes: u64,
}

/// Validate a NewJob before creation or replacement.
pub fn validate_new_job(job: &NewJob) -> Result<(), FetchdError> {
    for (field, value) in [
        ("remote_source", &job.remote_source),
        ("local_path", &job.local_path),
        ("public_path", &job.public_path),
    ] {
        if value.trim().is_empty() {
            return Err(FetchdError::Validation(format!(
                "Missing required field: {}",
                field
            )));
        }
    }

    validate_local_path(job.local_path.trim())?;

    Ok(())
}

/// `local_path` is joined onto the storage root, so it must stay beneath it.
fn validate_local_path(local_path: &str) -> Result<(), FetchdError> {
    for component in Path::new(local_path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(FetchdError::Validation(format!(
                    "local_path '{}' must not contain '..'",
                    local_path
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(FetchdError::Validation(format!(
                    "local_path '{}' must be relative",
                    local_path
                )));
            }
        }
    }
    Ok(())
}
