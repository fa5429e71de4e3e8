//! Observability stubs (in-process counters)

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the fetch pipeline, recorded by the coordinator and its
/// workers.
#[derive(Debug, Default)]
pub struct Metrics {
    tasks_accepted: AtomicU64,
    files_completed: AtomicU64,
    files_failed: AtomicU64,
    retries_scheduled: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_accepted(&self) {
        self.tasks_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_completed(&self) {
        self.files_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A file reached terminal FAILED (retries exhausted or permanent error).
    pub fn file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_accepted: self.tasks_accepted.load(Ordering::Relaxed),
            files_completed: self.files_completed.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub tasks_accepted: u64,
    pub files_completed: u64,
    pub files_failed: u64,
    pub retries_scheduled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.task_accepted();
        metrics.file_completed();
        metrics.file_completed();
        metrics.file_failed();
        metrics.retry_scheduled();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_accepted, 1);
        assert_eq!(snapshot.files_completed, 2);
        assert_eq!(snapshot.files_failed, 1);
        assert_eq!(snapshot.retries_scheduled, 1);
    }
}
