pub mod jobs;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{FetchOutcome, Job, NewJob};

/// Source of truth for job records.
///
/// Implementations serialize every mutation, so a status write from a fetch
/// can never interleave with an API write to the same record. Listing order is
/// creation order and is stable for a given store state.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn list_jobs(&self) -> Result<Vec<Job>>;
    async fn get_job(&self, id: Uuid) -> Result<Option<Job>>;
    /// Allocate a fresh id and persist a new job with no fetch history.
    async fn create_job(&self, new: NewJob, created_at: DateTime<Utc>) -> Result<Job>;
    /// Insert `job`, or overwrite the record with the same id in place.
    async fn upsert_job(&self, job: Job) -> Result<()>;
    /// Swap the definition of an existing job, keeping its history.
    async fn replace_job(&self, id: Uuid, new: NewJob) -> Result<Job>;
    async fn delete_job(&self, id: Uuid) -> Result<()>;
    /// Write one fetch attempt's status triple. Returns `None` if the job no
    /// longer exists.
    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: &FetchOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<Job>>;
}
