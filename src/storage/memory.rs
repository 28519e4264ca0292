use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::FetchdError;
use crate::models::{FetchOutcome, Job, NewJob};
use crate::storage::JobStore;

/// Non-durable `JobStore` used as a test double.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<Vec<Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: Uuid) -> anyhow::Error {
    FetchdError::NotFound(format!("Job with id '{}' not found", id)).into()
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn list_jobs(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.read().await.clone())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.iter().find(|j| j.id == id).cloned())
    }

    async fn create_job(&self, new: NewJob, created_at: DateTime<Utc>) -> Result<Job> {
        let job = Job::new(Uuid::now_v7(), new, created_at);
        self.jobs.write().await.push(job.clone());
        Ok(job)
    }

    async fn upsert_job(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job,
            None => jobs.push(job),
        }
        Ok(())
    }

    async fn replace_job(&self, id: Uuid, new: NewJob) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| not_found(id))?;
        *job = job.redefine(new);
        Ok(job.clone())
    }

    async fn delete_job(&self, id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let idx = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| not_found(id))?;
        jobs.remove(idx);
        Ok(())
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: &FetchOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        let mut jobs = self.jobs.write().await;
        Ok(jobs.iter_mut().find(|j| j.id == id).map(|job| {
            job.apply_outcome(outcome, at);
            job.clone()
        }))
    }
}
