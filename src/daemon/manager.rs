use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::daemon::events::{JobChangeKind, JobEvent};
use crate::daemon::executor::Executor;
use crate::daemon::scheduler::{Clock, Scheduler};
use crate::errors::FetchdError;
use crate::fetcher::{resolve_local_path, Fetcher};
use crate::models::job::validate_new_job;
use crate::models::{FetchOutcome, FetchTrigger, Job, NewJob};
use crate::storage::JobStore;

/// The operations exposed to clients, composed from the store, the
/// scheduler and the fetch executor. Keeps the persisted jobs and the live
/// timers in step.
pub struct JobManager {
    job_store: Arc<dyn JobStore>,
    /// Held across each store mutation and its timer change.
    definitions: Mutex<()>,
    executor: Arc<Executor>,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<JobEvent>,
    storage_root: PathBuf,
}

impl JobManager {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        event_tx: broadcast::Sender<JobEvent>,
        storage_root: PathBuf,
    ) -> Self {
        let executor = Arc::new(Executor::new(
            Arc::clone(&job_store),
            fetcher,
            Arc::clone(&clock),
            event_tx.clone(),
        ));
        let scheduler = Scheduler::new(Arc::clone(&executor));
        Self {
            job_store,
            definitions: Mutex::new(()),
            executor,
            scheduler,
            clock,
            event_tx,
            storage_root,
        }
    }

    /// Install timers for the jobs already in the store.
    pub async fn start(&self) -> Result<usize> {
        let installed = self.scheduler.restore(self.job_store.as_ref()).await?;
        tracing::info!("Scheduler started with {} recurring job(s)", installed);
        Ok(installed)
    }

    /// Cancel every timer. In-flight fetches run to completion.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.job_store.list_jobs().await
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Job> {
        self.job_store
            .get_job(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn create_job(&self, new: NewJob) -> Result<Job> {
        validate_new_job(&new)?;

        let _guard = self.definitions.lock().await;
        let job = self.job_store.create_job(new, self.clock.now()).await?;
        if job.is_recurring() {
            self.scheduler.schedule(job.id, job.period_minutes);
        }

        tracing::info!(
            "Job {} created ({} -> {})",
            job.id,
            job.remote_source,
            job.public_path
        );
        self.notify(job.id, JobChangeKind::Added);
        Ok(job)
    }

    /// Redefine an existing job under the same id. The timer follows the new
    /// period: replaced, installed or removed.
    pub async fn replace_job(&self, id: Uuid, new: NewJob) -> Result<Job> {
        validate_new_job(&new)?;

        let _guard = self.definitions.lock().await;
        let job = self.job_store.replace_job(id, new).await?;
        self.scheduler.schedule(job.id, job.period_minutes);

        tracing::info!("Job {} replaced", job.id);
        self.notify(job.id, JobChangeKind::Replaced);
        Ok(job)
    }

    /// Remove the job, then its timer. Deletion succeeds whether or not a
    /// timer existed.
    pub async fn delete_job(&self, id: Uuid) -> Result<()> {
        let _guard = self.definitions.lock().await;
        self.job_store.delete_job(id).await?;
        self.scheduler.unschedule(id);

        tracing::info!("Job {} deleted", id);
        self.notify(id, JobChangeKind::Removed);
        Ok(())
    }

    /// Fetch now and wait for the result.
    ///
    /// The attempt runs on its own task, so it completes and is recorded even
    /// if the caller stops waiting.
    pub async fn trigger(&self, id: Uuid) -> Result<FetchOutcome> {
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move { executor.run(id, FetchTrigger::Manual).await })
            .await
            .context("Manual fetch task failed")??
            .ok_or_else(|| not_found(id))
    }

    /// Find the local file exposed under `requested`.
    ///
    /// Jobs are scanned in store order and the first whose public path
    /// matches wins, even when several jobs share a public path. This is a
    /// linear scan per request.
    pub async fn resolve_public_path(&self, requested: &str) -> Result<PathBuf> {
        let jobs = self.job_store.list_jobs().await?;
        let Some(job) = jobs.iter().find(|j| j.serves(requested)) else {
            return Err(FetchdError::NotFound(format!(
                "Serve path '{}' not configured",
                requested
            ))
            .into());
        };

        let path = resolve_local_path(&self.storage_root, &job.local_path);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(FetchdError::NotFound(format!("File not found for '{}'", requested)).into()),
        }
    }

    fn notify(&self, job_id: Uuid, change: JobChangeKind) {
        let _ = self.event_tx.send(JobEvent::JobChanged {
            job_id,
            change,
            timestamp: self.clock.now(),
        });
    }
}

fn not_found(id: Uuid) -> anyhow::Error {
    FetchdError::NotFound(format!("Job with id '{}' not found", id)).into()
}
