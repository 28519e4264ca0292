use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::daemon::executor::Executor;
use crate::models::FetchTrigger;
use crate::storage::JobStore;

// ---------------------------------------------------------------------------
// Clock trait + implementations
// ---------------------------------------------------------------------------

/// Trait for abstracting time, enabling deterministic testing.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real clock backed by system time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for deterministic testing. Time only advances when told to.
/// Uses std::sync::RwLock (not tokio) so it can be called from both sync
/// and async contexts.
pub struct FakeClock {
    time: Arc<std::sync::RwLock<DateTime<Utc>>>,
}

impl FakeClock {
    /// Create a FakeClock pinned to the given instant.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(std::sync::RwLock::new(time)),
        }
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.write().unwrap() = time;
    }

    /// Advance the clock by a chrono::Duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut t = self.time.write().unwrap();
        *t += duration;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Recurring fetch timers, one per job with a non-zero period.
///
/// The scheduler holds no job state of its own: each tick looks the job up in
/// the store through the [`Executor`], so a job deleted between ticks is simply
/// skipped. Every tick spawns its own task, so a slow fetch never holds back
/// this job's next tick or any other job's timer.
pub struct Scheduler {
    executor: Arc<Executor>,
    timers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            executor,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Install a timer firing every `period_minutes`, first one period from
    /// now. Replaces any timer already installed for `id`. A zero period
    /// removes the timer.
    pub fn schedule(&self, id: Uuid, period_minutes: u64) {
        if period_minutes == 0 {
            self.unschedule(id);
            return;
        }

        let period = Duration::from_secs(period_minutes.saturating_mul(60));
        let mut timers = self.timers.lock().unwrap();
        let handle = tokio::spawn(run_timer(Arc::clone(&self.executor), id, period));
        if let Some(previous) = timers.insert(id, handle) {
            previous.abort();
            tracing::debug!("Replaced timer for job {}", id);
        }
        tracing::info!("Scheduled job {} every {} minute(s)", id, period_minutes);
    }

    /// Remove the timer for `id`. Idempotent: returns whether a timer existed.
    /// A fetch already in flight is allowed to finish.
    pub fn unschedule(&self, id: Uuid) -> bool {
        match self.timers.lock().unwrap().remove(&id) {
            Some(handle) => {
                handle.abort();
                tracing::info!("Unscheduled job {}", id);
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, id: Uuid) -> bool {
        self.timers.lock().unwrap().contains_key(&id)
    }

    pub fn scheduled_count(&self) -> usize {
        self.timers.lock().unwrap().len()
    }

    /// Install timers for every recurring job in the store. Returns how many
    /// were installed.
    pub async fn restore(&self, job_store: &dyn JobStore) -> Result<usize> {
        let jobs = job_store.list_jobs().await?;
        let mut installed = 0;
        for job in jobs.iter().filter(|j| j.is_recurring()) {
            self.schedule(job.id, job.period_minutes);
            installed += 1;
        }
        Ok(installed)
    }

    /// Cancel every pending timer.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock().unwrap();
        let count = timers.len();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        if count > 0 {
            tracing::info!("Scheduler stopped, {} timer(s) cancelled", count);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_timer(executor: Arc<Executor>, id: Uuid, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            match executor.run(id, FetchTrigger::Scheduled).await {
                Ok(Some(_)) => {}
                Ok(None) => tracing::debug!("Timer fired for missing job {}, skipping", id),
                Err(e) => tracing::error!("Scheduled fetch for job {} failed: {:#}", id, e),
            }
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
