use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// HTTP server and persistence configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Directory holding the task journal (`tasks.wal`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Upper bound on the graceful connection drain at shutdown.
    #[serde(default = "default_shutdown_wait_secs")]
    pub shutdown_wait_secs: u64,
}

impl ServerConfig {
    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_secs(self.shutdown_wait_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_dir: default_data_dir(),
            shutdown_wait_secs: default_shutdown_wait_secs(),
        }
    }
}

/// Download pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Root under which all task destination directories are resolved.
    #[serde(default = "default_downloads_root")]
    pub downloads_root: PathBuf,
    /// Worker pool size; floored at 1.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Concurrent downloads per host; 0 disables the limiter.
    #[serde(default = "default_host_concurrency")]
    pub host_concurrency: usize,
    #[serde(default = "default_client_timeout_secs")]
    pub client_timeout_secs: u64,
    /// Per-file attempt budget; floored at 1.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl FetchConfig {
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            downloads_root: default_downloads_root(),
            workers: default_workers(),
            host_concurrency: default_host_concurrency(),
            client_timeout_secs: default_client_timeout_secs(),
            retries: default_retries(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_shutdown_wait_secs() -> u64 {
    20
}

fn default_downloads_root() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_workers() -> usize {
    4
}

fn default_host_concurrency() -> usize {
    2
}

fn default_client_timeout_secs() -> u64 {
    60
}

fn default_retries() -> u32 {
    3
}
