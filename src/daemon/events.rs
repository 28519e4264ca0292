use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::FetchTrigger;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum JobEvent {
    JobChanged {
        job_id: Uuid,
        change: JobChangeKind,
        timestamp: DateTime<Utc>,
    },
    FetchStarted {
        job_id: Uuid,
        trigger: FetchTrigger,
        timestamp: DateTime<Utc>,
    },
    FetchFinished {
        job_id: Uuid,
        trigger: FetchTrigger,
        ok: bool,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::JobChanged { job_id, .. }
            | JobEvent::FetchStarted { job_id, .. }
            | JobEvent::FetchFinished { job_id, .. } => *job_id,
        }
    }

    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::JobChanged { .. } => "job_changed",
            JobEvent::FetchStarted { .. } => "fetch_started",
            JobEvent::FetchFinished { .. } => "fetch_finished",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum JobChangeKind {
    Added,
    Replaced,
    Removed,
}
