//! HTTP download of a single file with retries and atomic publish.
//!
//! The fetcher is stateless across calls: all retry budget lives inside
//! [`Fetcher::fetch`]. Bodies are streamed to a `dest + ".part"` staging
//! file and renamed into place on success, so readers never observe a
//! partial payload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::limiter::HostLimiter;
use crate::task::host_key;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("http {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("download failed for an unknown reason")]
    Unknown,
}

impl FetchError {
    /// Transient errors are worth another attempt; everything else is
    /// permanent. 4xx is permanent: it signals a bad URL or client problem,
    /// not a transient condition.
    pub fn is_retriable(&self) -> bool {
        match self {
            FetchError::Transport(_)
            | FetchError::Stream(_)
            | FetchError::DeadlineExceeded => true,
            FetchError::Status(code) => (500..600).contains(code),
            _ => false,
        }
    }
}

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub client_timeout: Duration,
    pub retries: u32,
    pub host_concurrency: usize,
}

/// HTTP downloader shared by all workers.
pub struct Fetcher {
    client: reqwest::Client,
    limiter: HostLimiter,
    retries: u32,
}

impl Fetcher {
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(options.client_timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            limiter: HostLimiter::new(options.host_concurrency),
            retries: options.retries.max(1),
        })
    }

    /// Downloads `url` to `dest`, returning the bytes written.
    ///
    /// Acquires a per-host slot for the whole call, then attempts up to the
    /// configured retry budget with exponential backoff starting at 500 ms.
    /// The caller bounds the entire call (slot wait, transfers, backoff
    /// sleeps) with an outer deadline; every suspension point here is
    /// cancellable.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let host = host_key(&parsed)
            .ok_or_else(|| FetchError::InvalidUrl(format!("no host in {url}")))?;
        let _slot = self.limiter.acquire(&host).await;

        let mut backoff = INITIAL_BACKOFF;
        let mut last_error: Option<FetchError> = None;

        for attempt in 1..=self.retries {
            match self.attempt(&parsed, dest).await {
                Ok(written) => {
                    if attempt > 1 {
                        debug!(url, attempt, written, "download succeeded after retry");
                    }
                    return Ok(written);
                }
                Err(error) if error.is_retriable() => {
                    warn!(url, attempt, %error, "download attempt failed");
                    last_error = Some(error);
                    if attempt < self.retries {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error.unwrap_or(FetchError::Unknown))
    }

    /// One GET attempt: stage, classify, stream, publish.
    async fn attempt(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = staging_path(dest);
        let mut out = tokio::fs::File::create(&staging).await?;

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(error) => {
                discard_staging(&staging).await;
                return Err(FetchError::Transport(error.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            // Dropping the response discards the body.
            discard_staging(&staging).await;
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    discard_staging(&staging).await;
                    return Err(FetchError::Stream(error.to_string()));
                }
            };
            if let Err(error) = out.write_all(&chunk).await {
                discard_staging(&staging).await;
                return Err(FetchError::Stream(error.to_string()));
            }
            written += chunk.len() as u64;
        }

        if let Err(error) = out.flush().await {
            discard_staging(&staging).await;
            return Err(FetchError::Stream(error.to_string()));
        }
        drop(out);

        if let Err(error) = tokio::fs::rename(&staging, dest).await {
            discard_staging(&staging).await;
            return Err(FetchError::Stream(format!("rename: {error}")));
        }

        Ok(written)
    }
}

fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

async fn discard_staging(staging: &Path) {
    let _ = tokio::fs::remove_file(staging).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Hits(Arc<AtomicUsize>);

    impl Hits {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fetcher(retries: u32) -> Fetcher {
        Fetcher::new(FetchOptions {
            client_timeout: Duration::from_secs(5),
            retries,
            host_concurrency: 0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn success_writes_file_and_removes_staging() {
        let hits = Hits::default();
        let app = Router::new()
            .route(
                "/a.bin",
                get(|State(hits): State<Hits>| async move {
                    hits.0.fetch_add(1, Ordering::SeqCst);
                    "payload"
                }),
            )
            .with_state(hits.clone());
        let base = serve(app).await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.bin");
        let written = fetcher(3).fetch(&format!("{base}/a.bin"), &dest).await.unwrap();

        assert_eq!(written, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
        assert!(!staging_path(&dest).exists());
        assert_eq!(hits.count(), 1);
    }

    #[tokio::test]
    async fn client_error_fails_without_retry() {
        let hits = Hits::default();
        let app = Router::new()
            .route(
                "/gone",
                get(|State(hits): State<Hits>| async move {
                    hits.0.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NOT_FOUND
                }),
            )
            .with_state(hits.clone());
        let base = serve(app).await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("gone");
        let err = fetcher(3).fetch(&format!("{base}/gone"), &dest).await.unwrap_err();

        assert!(matches!(err, FetchError::Status(404)));
        assert_eq!(hits.count(), 1);
        assert!(!dest.exists());
        assert!(!staging_path(&dest).exists());
    }

    #[tokio::test]
    async fn server_error_retries_until_success() {
        let hits = Hits::default();
        let app = Router::new()
            .route(
                "/flaky",
                get(|State(hits): State<Hits>| async move {
                    let n = hits.0.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(StatusCode::INTERNAL_SERVER_ERROR)
                    } else {
                        Ok("ok")
                    }
                }),
            )
            .with_state(hits.clone());
        let base = serve(app).await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("flaky");
        let written = fetcher(3).fetch(&format!("{base}/flaky"), &dest).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(hits.count(), 3);
        assert_eq!(std::fs::read(&dest).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn retries_exhaust_with_last_error() {
        let hits = Hits::default();
        let app = Router::new()
            .route(
                "/down",
                get(|State(hits): State<Hits>| async move {
                    hits.0.fetch_add(1, Ordering::SeqCst);
                    StatusCode::SERVICE_UNAVAILABLE
                }),
            )
            .with_state(hits.clone());
        let base = serve(app).await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("down");
        let err = fetcher(2).fetch(&format!("{base}/down"), &dest).await.unwrap_err();

        assert!(matches!(err, FetchError::Status(503)));
        assert_eq!(hits.count(), 2);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn transport_error_is_retriable_and_reported() {
        // Nothing listens on this port; connection is refused immediately.
        let dir = TempDir::new().unwrap();
        let err = fetcher(2)
            .fetch("http://127.0.0.1:9/never", &dir.path().join("never"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
