use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::daemon::events::JobEvent;
use crate::daemon::scheduler::Clock;
use crate::fetcher::Fetcher;
use crate::models::{FetchOutcome, FetchTrigger};
use crate::storage::JobStore;

/// Runs one fetch attempt for a job and records its outcome.
///
/// Shared by scheduled fires and manual triggers so both update the store
/// identically.
pub struct Executor {
    job_store: Arc<dyn JobStore>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl Executor {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        event_tx: broadcast::Sender<JobEvent>,
    ) -> Self {
        Self {
            job_store,
            fetcher,
            clock,
            event_tx,
        }
    }

    /// Fetch job `id` and write the status triple back.
    ///
    /// Returns `Ok(None)` when the job does not exist. If the job is deleted
    /// while the fetch is in flight the outcome is still returned but not
    /// recorded anywhere. Only a store failure is an error.
    pub async fn run(&self, id: Uuid, trigger: FetchTrigger) -> Result<Option<FetchOutcome>> {
        let Some(job) = self.job_store.get_job(id).await? else {
            return Ok(None);
        };

        let _ = self.event_tx.send(JobEvent::FetchStarted {
            job_id: id,
            trigger,
            timestamp: self.clock.now(),
        });

        let outcome = self
            .fetcher
            .fetch(&job.remote_source, &job.local_path)
            .await;
        let finished_at = self.clock.now();

        if outcome.ok {
            tracing::info!("Fetch for job {} succeeded: {}", id, outcome.message);
        } else {
            tracing::warn!("Fetch for job {} failed: {}", id, outcome.message);
        }

        if self
            .job_store
            .record_outcome(id, &outcome, finished_at)
            .await?
            .is_none()
        {
            tracing::info!("Job {} was deleted during fetch, outcome discarded", id);
        }

        let _ = self.event_tx.send(JobEvent::FetchFinished {
            job_id: id,
            trigger,
            ok: outcome.ok,
            message: outcome.message.clone(),
            timestamp: finished_at,
        });

        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::scheduler::FakeClock;
    use crate::fetcher::{MockFetchConfig, MockFetcher};
    use crate::models::{JobStatus, NewJob};
    use crate::storage::memory::InMemoryJobStore;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    struct Harness {
        store: Arc<InMemoryJobStore>,
        fetcher: Arc<MockFetcher>,
        clock: Arc<FakeClock>,
        executor: Executor,
        events: broadcast::Receiver<JobEvent>,
        _tmp: TempDir,
    }

    fn harness(fetcher: impl FnOnce(std::path::PathBuf) -> MockFetcher) -> Harness {
        let tmp = TempDir::new().expect("tmp");
        let store = Arc::new(InMemoryJobStore::new());
        let fetcher = Arc::new(fetcher(tmp.path().to_path_buf()));
        let clock = Arc::new(FakeClock::new(
            Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap(),
        ));
        let (event_tx, events) = broadcast::channel(64);
        let executor = Executor::new(
            store.clone(),
            fetcher.clone(),
            clock.clone(),
            event_tx,
        );
        Harness {
            store,
            fetcher,
            clock,
            executor,
            events,
            _tmp: tmp,
        }
    }

    fn new_job() -> NewJob {
        NewJob {
            remote_source: "mock://report".to_string(),
            local_path: "reports/latest.pdf".to_string(),
            public_path: "latest.pdf".to_string(),
            period_minutes: 0,
        }
    }

    #[tokio::test]
    async fn test_run_records_success() {
        let h = harness(|root| MockFetcher::with_body(root, b"%PDF"));
        let job = h.store.create_job(new_job(), h.clock.now()).await.expect("create");
        h.clock.advance(chrono::Duration::minutes(3));

        let outcome = h
            .executor
            .run(job.id, FetchTrigger::Manual)
            .await
            .expect("run")
            .expect("job exists");

        assert!(outcome.ok);
        let stored = h.store.get_job(job.id).await.expect("get").expect("found");
        assert_eq!(stored.last_status, JobStatus::Success);
        assert_eq!(stored.last_message.as_deref(), Some(outcome.message.as_str()));
        assert_eq!(
            stored.last_run_at,
            Some(Utc.with_ymd_and_hms(2025, 6, 15, 10, 3, 0).unwrap())
        );
        assert_eq!(h.fetcher.sources(), vec!["mock://report".to_string()]);
    }

    #[tokio::test]
    async fn test_run_records_failure() {
        let h = harness(|root| MockFetcher::with_error(root, "connection refused"));
        let job = h.store.create_job(new_job(), h.clock.now()).await.expect("create");

        let outcome = h
            .executor
            .run(job.id, FetchTrigger::Scheduled)
            .await
            .expect("run")
            .expect("job exists");

        assert!(!outcome.ok);
        let stored = h.store.get_job(job.id).await.expect("get").expect("found");
        assert_eq!(stored.last_status, JobStatus::Error);
        assert_eq!(stored.last_message, Some(outcome.message));
    }

    #[tokio::test]
    async fn test_run_unknown_job_does_nothing() {
        let h = harness(|root| MockFetcher::with_body(root, b"x"));

        let result = h
            .executor
            .run(Uuid::now_v7(), FetchTrigger::Scheduled)
            .await
            .expect("run");

        assert!(result.is_none());
        assert_eq!(h.fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_run_emits_started_and_finished() {
        let mut h = harness(|root| MockFetcher::with_body(root, b"x"));
        let job = h.store.create_job(new_job(), h.clock.now()).await.expect("create");

        h.executor
            .run(job.id, FetchTrigger::Manual)
            .await
            .expect("run");

        match h.events.recv().await.expect("started") {
            JobEvent::FetchStarted { job_id, trigger, .. } => {
                assert_eq!(job_id, job.id);
                assert_eq!(trigger, FetchTrigger::Manual);
            }
            other => panic!("Expected FetchStarted, got: {:?}", other),
        }
        match h.events.recv().await.expect("finished") {
            JobEvent::FetchFinished { ok, .. } => assert!(ok),
            other => panic!("Expected FetchFinished, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_job_deleted_mid_fetch_is_not_recreated() {
        let h = harness(|root| {
            MockFetcher::new(
                root,
                MockFetchConfig {
                    body: b"slow".to_vec(),
                    error: None,
                    delay_ms: 100,
                },
            )
        });
        let job = h.store.create_job(new_job(), h.clock.now()).await.expect("create");

        let store = h.store.clone();
        let id = job.id;
        let deleter = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            store.delete_job(id).await.expect("delete");
        });

        let outcome = h
            .executor
            .run(job.id, FetchTrigger::Manual)
            .await
            .expect("run")
            .expect("job existed at start");
        deleter.await.expect("join");

        assert!(outcome.ok);
        assert!(h.store.get_job(job.id).await.expect("get").is_none());
    }
}
