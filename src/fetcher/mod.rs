//! Retrieval of remote resources into the managed storage root.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::models::{DaemonConfig, FetchOutcome};

/// Performs one fetch of `remote_source` into `local_path` (relative to the
/// storage root). Every failure is reported through the outcome; an
/// implementation never returns an error or panics past this boundary.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, remote_source: &str, local_path: &str) -> FetchOutcome;
}

/// Join a job's `local_path` onto the storage root.
pub fn resolve_local_path(storage_root: &Path, local_path: &str) -> PathBuf {
    storage_root.join(local_path.trim_start_matches('/'))
}

// --- HTTP implementation ---

pub struct HttpFetcher {
    client: reqwest::Client,
    storage_root: PathBuf,
}

impl HttpFetcher {
    pub fn new(storage_root: PathBuf, config: &DaemonConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("fetchd/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            storage_root,
        })
    }

    /// Stream the response body to `dest` chunk by chunk. A file that was
    /// partially written before a failure is left in place.
    async fn download(&self, remote_source: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(remote_source)
            .send()
            .await
            .with_context(|| format!("GET {} failed", remote_source))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {} returned HTTP {}", remote_source, status);
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.with_context(|| format!("Failed reading body of {}", remote_source))?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", dest.display()))?;

        Ok(written)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, remote_source: &str, local_path: &str) -> FetchOutcome {
        let dest = resolve_local_path(&self.storage_root, local_path);
        match self.download(remote_source, &dest).await {
            Ok(bytes) => {
                tracing::debug!("Fetched {} ({} bytes)", remote_source, bytes);
                FetchOutcome::success(format!(
                    "Downloaded {} bytes to {}",
                    bytes,
                    dest.display()
                ))
            }
            Err(e) => {
                tracing::debug!("Fetch of {} failed: {:#}", remote_source, e);
                FetchOutcome::failure(format!("{:#}", e))
            }
        }
    }
}

// --- Mock implementation for testing ---

#[derive(Debug, Clone, Default)]
pub struct MockFetchConfig {
    /// Bytes written to the destination on success.
    pub body: Vec<u8>,
    /// When set, every fetch fails with this message and writes nothing.
    pub error: Option<String>,
    pub delay_ms: u64,
}

/// `Fetcher` that writes canned bytes under the storage root and records
/// every call.
pub struct MockFetcher {
    storage_root: PathBuf,
    config: Arc<Mutex<MockFetchConfig>>,
    calls: AtomicUsize,
    sources: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new(storage_root: PathBuf, config: MockFetchConfig) -> Self {
        Self {
            storage_root,
            config: Arc::new(Mutex::new(config)),
            calls: AtomicUsize::new(0),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn with_body(storage_root: PathBuf, body: &[u8]) -> Self {
        Self::new(
            storage_root,
            MockFetchConfig {
                body: body.to_vec(),
                ..Default::default()
            },
        )
    }

    pub fn with_error(storage_root: PathBuf, error: &str) -> Self {
        Self::new(
            storage_root,
            MockFetchConfig {
                error: Some(error.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn with_delay(storage_root: PathBuf, body: &[u8], delay_ms: u64) -> Self {
        Self::new(
            storage_root,
            MockFetchConfig {
                body: body.to_vec(),
                error: None,
                delay_ms,
            },
        )
    }

    pub fn set_config(&self, config: MockFetchConfig) {
        *self.config.lock().unwrap() = config;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, remote_source: &str, local_path: &str) -> FetchOutcome {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.sources.lock().unwrap().push(remote_source.to_string());
        let config = self.config.lock().unwrap().clone();

        if config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
        }

        if let Some(error) = config.error {
            return FetchOutcome::failure(format!("attempt {}: {}", attempt, error));
        }

        let dest = resolve_local_path(&self.storage_root, local_path);
        if let Some(parent) = dest.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return FetchOutcome::failure(e.to_string());
            }
        }
        match tokio::fs::write(&dest, &config.body).await {
            Ok(()) => FetchOutcome::success(format!(
                "attempt {}: wrote {} bytes to {}",
                attempt,
                config.body.len(),
                dest.display()
            )),
            Err(e) => FetchOutcome::failure(e.to_string()),
        }
    }
}
