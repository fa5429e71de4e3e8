//! Task registry, worker pool, and lifecycle.
//!
//! The coordinator owns every mutable piece of the pipeline: the in-memory
//! task map (single writer lock), the journal, the dispatcher, the fetcher,
//! and the worker tasks. All task/file mutations happen under the write
//! lock; readers get deep copies so HTTP handlers never observe a task
//! mid-mutation.

mod paths;
mod worker;

pub(crate) use paths::unique_path;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::{Dispatcher, Job};
use crate::fetcher::{FetchError, FetchOptions, Fetcher};
use crate::journal::{Journal, JournalError};
use crate::observability::Metrics;
use crate::task::{FileState, Task};

/// Intake buffers producers (HTTP handlers, retrying workers) block on.
const INTAKE_BUFFER: usize = 10_000;
/// Output buffer workers consume from; overflow spills to the backlog.
const OUTPUT_BUFFER: usize = 1_024;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("http client error: {0}")]
    Fetcher(#[from] FetchError),
}

pub struct Coordinator {
    config: Arc<Config>,
    journal: Journal,
    tasks: RwLock<HashMap<String, Task>>,
    dispatcher: Dispatcher,
    fetcher: Fetcher,
    metrics: Arc<Metrics>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Coordinator {
    /// Builds the pipeline: creates the data and download directories,
    /// opens the journal, replays it, and only then starts the workers so
    /// recovered jobs cannot race recovery itself.
    pub async fn new(
        config: Arc<Config>,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<Self>, CoordinatorError> {
        std::fs::create_dir_all(&config.server.data_dir)?;
        std::fs::create_dir_all(&config.fetch.downloads_root)?;

        let journal = Journal::open(&config.server.data_dir)?;
        let dispatcher = Dispatcher::new(INTAKE_BUFFER, OUTPUT_BUFFER);
        // One HTTP attempt per job execution: the per-file retry budget is
        // tracked by the worker state machine, so every attempt is a
        // journaled, observable transition.
        let fetcher = Fetcher::new(FetchOptions {
            client_timeout: config.fetch.client_timeout(),
            retries: 1,
            host_concurrency: config.fetch.host_concurrency,
        })?;

        let coordinator = Arc::new(Self {
            config,
            journal,
            tasks: RwLock::new(HashMap::new()),
            dispatcher,
            fetcher,
            metrics,
            workers: std::sync::Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        coordinator.recover().await?;
        coordinator.spawn_workers();
        Ok(coordinator)
    }

    /// Registers a task, journals it, and enqueues all pending files.
    /// Enqueueing may block under intake backpressure.
    pub async fn add_task(&self, task: Task) {
        let jobs = pending_jobs(&task);
        let snapshot = task.clone();
        {
            let mut tasks = self.tasks.write().await;
            tasks.insert(task.id.clone(), task);
        }
        self.append_journal(&snapshot);
        self.metrics.task_accepted();
        info!(
            task_id = %snapshot.id,
            files = snapshot.total,
            label = %snapshot.label,
            "task accepted"
        );

        for job in jobs {
            self.dispatcher.enqueue(job).await;
        }
    }

    /// Deep copy of one task, if known.
    pub async fn get_task(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Deep copies of all tasks; order is unspecified.
    pub async fn list_tasks(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    pub fn set_drain(&self, on: bool) {
        self.dispatcher.set_drain(on);
    }

    pub fn is_drain(&self) -> bool {
        self.dispatcher.is_drain()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Cooperative shutdown: stop the dispatcher, let every worker finish
    /// its in-flight job (including the final journal write), then flush
    /// the journal. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("coordinator closing");
        self.dispatcher.close();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }

        if let Err(error) = self.journal.close() {
            warn!(%error, "journal close failed");
        }
        info!("coordinator closed");
    }

    fn spawn_workers(self: &Arc<Self>) {
        let count = self.config.fetch.workers.max(1);
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        for worker_id in 0..count {
            let coordinator = Arc::clone(self);
            workers.push(tokio::spawn(worker::worker_loop(coordinator, worker_id)));
        }
        info!(count, "workers started");
    }

    /// Replays the journal into the registry. Files that were RUNNING at
    /// crash time restart as PENDING with cleared error and timestamps;
    /// every pending file is re-enqueued. Recovery does not journal; the
    /// existing records already describe the state.
    async fn recover(&self) -> Result<(), CoordinatorError> {
        let recovered = self.journal.recover()?;
        if recovered.is_empty() {
            return Ok(());
        }
        info!(count = recovered.len(), "recovering tasks from journal");

        let mut jobs = Vec::new();
        {
            let mut tasks = self.tasks.write().await;
            for (id, mut task) in recovered {
                for file in &mut task.files {
                    if file.state == FileState::Running {
                        file.reset_pending();
                    }
                }
                task.recompute_status();
                jobs.extend(pending_jobs(&task));
                tasks.insert(id, task);
            }
        }

        let resumed = jobs.len();
        for job in jobs {
            self.dispatcher.enqueue(job).await;
        }
        if resumed > 0 {
            info!(jobs = resumed, "re-enqueued pending files from recovery");
        }
        Ok(())
    }

    /// Best-effort append: persistence failures degrade recovery but must
    /// not block progress, so they are logged and swallowed.
    fn append_journal(&self, task: &Task) {
        if let Err(error) = self.journal.append_task(task) {
            warn!(task_id = %task.id, %error, "journal append failed");
        }
    }
}

fn pending_jobs(task: &Task) -> Vec<Job> {
    task.files
        .iter()
        .enumerate()
        .filter(|(_, file)| file.state == FileState::Pending)
        .map(|(index, file)| Job {
            task_id: task.id.clone(),
            file_index: index,
            host: file.host.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, FetchConfig, ServerConfig};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Arc<Config> {
        Arc::new(Config {
            server: ServerConfig {
                data_dir: dir.path().join("data"),
                ..ServerConfig::default()
            },
            fetch: FetchConfig {
                downloads_root: dir.path().join("downloads"),
                workers: 1,
                retries: 1,
                client_timeout_secs: 2,
                ..FetchConfig::default()
            },
        })
    }

    #[tokio::test]
    async fn add_and_get_return_deep_copies() {
        let dir = TempDir::new().unwrap();
        let coordinator = Coordinator::new(test_config(&dir), Arc::new(Metrics::new()))
            .await
            .unwrap();
        coordinator.set_drain(true); // keep files untouched while we look

        let task = Task::new("x", "", &["http://example.com/a".to_string()], 1).unwrap();
        let id = task.id.clone();
        coordinator.add_task(task).await;

        let mut copy = coordinator.get_task(&id).await.unwrap();
        copy.label = "mutated".to_string();
        assert_eq!(coordinator.get_task(&id).await.unwrap().label, "x");

        assert_eq!(coordinator.list_tasks().await.len(), 1);
        assert!(coordinator.get_task("missing").await.is_none());
        coordinator.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent_and_stops_workers() {
        let dir = TempDir::new().unwrap();
        let coordinator = Coordinator::new(test_config(&dir), Arc::new(Metrics::new()))
            .await
            .unwrap();
        coordinator.close().await;
        coordinator.close().await;
    }
}
