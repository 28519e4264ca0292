use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Directory every job's `local_path` is resolved against.
    /// Defaults to `{data_dir}/downloads`.
    #[serde(default)]
    pub storage_root: Option<PathBuf>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Overall per-fetch timeout; 0 disables it.
    #[serde(default)]
    pub request_timeout_secs: u64,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8378
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_broadcast_capacity() -> usize {
    1024
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: None,
            storage_root: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: 0,
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl DaemonConfig {
    /// The effective storage root, given the resolved data directory.
    pub fn storage_root_for(&self, data_dir: &std::path::Path) -> PathBuf {
        self.storage_root
            .clone()
            .unwrap_or_else(|| data_dir.join("downloads"))
    }
}
