//! Per-host download concurrency limiter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Caps the number of simultaneous downloads per origin host.
///
/// Each host gets a lazily-created semaphore of `capacity` permits; the map
/// itself is guarded by a mutex so first-use from concurrent workers is
/// safe. A capacity of zero disables limiting entirely.
pub struct HostLimiter {
    capacity: usize,
    pools: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for a slot on `host` and returns the permit, released on drop.
    ///
    /// Returns `None` when the limiter is disabled. There is no timeout
    /// here; cancellation happens through the caller's deadline.
    pub async fn acquire(&self, host: &str) -> Option<OwnedSemaphorePermit> {
        if self.capacity == 0 {
            return None;
        }

        let semaphore = {
            let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(pools.entry(host.to_string()).or_insert_with(|| {
                debug!(host, capacity = self.capacity, "created host pool");
                Arc::new(Semaphore::new(self.capacity))
            }))
        };

        // The semaphore is never closed, so acquire can only fail if the
        // runtime is shutting down; treat that as unlimited.
        semaphore.acquire_owned().await.ok()
    }
}
