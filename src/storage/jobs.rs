use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::FetchdError;
use crate::models::{FetchOutcome, Job, NewJob};
use crate::storage::JobStore;

/// `JobStore` persisted as a single `jobs.json` array.
///
/// The in-memory copy is only replaced after the new state has been written
/// and renamed into place, so readers never observe state that is not on disk.
pub struct JsonJobStore {
    file_path: PathBuf,
    cache: RwLock<Vec<Job>>,
}

impl JsonJobStore {
    /// Create a new JsonJobStore, loading existing data from disk if present.
    ///
    /// If `jobs.json` is corrupted (invalid JSON), creates a backup at
    /// `jobs.json.bak`, logs a warning, and starts with an empty job list.
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .context("Failed to create data directory")?;

        let file_path = data_dir.join("jobs.json");

        let jobs = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path)
                .await
                .context("Failed to read jobs.json")?;
            match serde_json::from_str::<Vec<Job>>(&content) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(
                        "jobs.json is corrupted ({}), creating backup and starting empty",
                        e
                    );
                    let backup_path = data_dir.join("jobs.json.bak");
                    if let Err(backup_err) = tokio::fs::copy(&file_path, &backup_path).await {
                        tracing::error!(
                            "Failed to create backup of corrupted jobs.json: {}",
                            backup_err
                        );
                    }
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        tracing::debug!("Loaded {} job(s) from {}", jobs.len(), file_path.display());

        Ok(Self {
            file_path,
            cache: RwLock::new(jobs),
        })
    }

    /// Durably write `jobs` to disk: write and fsync a .tmp file, then
    /// rename it over the real file.
    async fn persist(&self, jobs: &[Job]) -> Result<(), FetchdError> {
        let tmp_path = self.file_path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(jobs)?;

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.file_path).await?;

        Ok(())
    }

    /// Persist `next`, then publish it as the current state.
    async fn commit(&self, current: &mut Vec<Job>, next: Vec<Job>) -> Result<()> {
        if let Err(e) = self.persist(&next).await {
            tracing::error!("Failed to persist {}: {}", self.file_path.display(), e);
            return Err(e.into());
        }
        *current = next;
        Ok(())
    }
}

fn not_found(id: Uuid) -> anyhow::Error {
    FetchdError::NotFound(format!("Job with id '{}' not found", id)).into()
}

#[async_trait]
impl JobStore for JsonJobStore {
    async fn list_jobs(&self) -> Result<Vec<Job>> {
        let cache = self.cache.read().await;
        Ok(cache.clone())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let cache = self.cache.read().await;
        Ok(cache.iter().find(|j| j.id == id).cloned())
    }

    async fn create_job(&self, new: NewJob, created_at: DateTime<Utc>) -> Result<Job> {
        let mut cache = self.cache.write().await;

        let job = Job::new(Uuid::now_v7(), new, created_at);
        let mut next = cache.clone();
        next.push(job.clone());
        self.commit(&mut cache, next).await?;

        Ok(job)
    }

    async fn upsert_job(&self, job: Job) -> Result<()> {
        let mut cache = self.cache.write().await;

        let mut next = cache.clone();
        match next.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job,
            None => next.push(job),
        }
        self.commit(&mut cache, next).await
    }

    async fn replace_job(&self, id: Uuid, new: NewJob) -> Result<Job> {
        let mut cache = self.cache.write().await;

        let idx = cache
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| not_found(id))?;

        let replaced = cache[idx].redefine(new);
        let mut next = cache.clone();
        next[idx] = replaced.clone();
        self.commit(&mut cache, next).await?;

        Ok(replaced)
    }

    async fn delete_job(&self, id: Uuid) -> Result<()> {
        let mut cache = self.cache.write().await;

        let idx = cache
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| not_found(id))?;

        let mut next = cache.clone();
        next.remove(idx);
        self.commit(&mut cache, next).await
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: &FetchOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        let mut cache = self.cache.write().await;

        let Some(idx) = cache.iter().position(|j| j.id == id) else {
            return Ok(None);
        };

        let mut next = cache.clone();
        next[idx].apply_outcome(outcome, at);
        let updated = next[idx].clone();
        self.commit(&mut cache, next).await?;

        Ok(Some(updated))
    }
}
