//! Worker loop: claim a job, fetch, record the outcome, maybe retry.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::dispatch::Job;
use crate::fetcher::FetchError;
use crate::task::FileState;

use super::{unique_path, Coordinator};

/// Consumes jobs until the dispatcher's output channel closes. Channel
/// closure is only observed between jobs, so an in-flight download always
/// finishes and journals its terminal transition before the worker exits.
pub(super) async fn worker_loop(coordinator: Arc<Coordinator>, worker_id: usize) {
    debug!(worker_id, "worker started");
    while let Some(job) = coordinator.dispatcher.next_job().await {
        run_job(&coordinator, worker_id, job).await;
    }
    debug!(worker_id, "worker stopped");
}

async fn run_job(coordinator: &Coordinator, worker_id: usize, job: Job) {
    // Start phase: claim the file under the write lock. Stale jobs (unknown
    // task, index out of range, file no longer pending) are discarded.
    let (snapshot, url, filename, dest_dir) = {
        let mut tasks = coordinator.tasks.write().await;
        let Some(task) = tasks.get_mut(&job.task_id) else {
            return;
        };
        let Some(file) = task.files.get_mut(job.file_index) else {
            return;
        };
        if file.state != FileState::Pending {
            return;
        }
        file.mark_running(Utc::now());
        let url = file.url.clone();
        let filename = file.filename.clone();
        task.recompute_status();
        (task.clone(), url, filename, task.dest_dir.clone())
    };
    coordinator.append_journal(&snapshot);

    // Destination: <downloads_root>/<dest_dir or task id>/<filename>, made
    // collision-free at write time.
    let dir = if dest_dir.is_empty() {
        coordinator.config.fetch.downloads_root.join(&job.task_id)
    } else {
        coordinator.config.fetch.downloads_root.join(&dest_dir)
    };
    let dest = unique_path(&dir.join(&filename));

    debug!(worker_id, task_id = %job.task_id, file_index = job.file_index, url = %url, "fetching");

    // The outer deadline backstops the client timeout across retries and
    // backoff sleeps.
    let deadline = coordinator.config.fetch.client_timeout() * 2;
    let result = match tokio::time::timeout(deadline, coordinator.fetcher.fetch(&url, &dest)).await
    {
        Ok(result) => result,
        Err(_) => Err(FetchError::DeadlineExceeded),
    };

    // Completion phase: record the terminal attempt.
    let (snapshot, retry_job) = {
        let mut tasks = coordinator.tasks.write().await;
        let Some(task) = tasks.get_mut(&job.task_id) else {
            return;
        };
        let Some(file) = task.files.get_mut(job.file_index) else {
            return;
        };

        file.attempts += 1;
        let now = Utc::now();
        let retry = match &result {
            Ok(written) => {
                file.mark_done(*written, now);
                coordinator.metrics.file_completed();
                false
            }
            Err(error) => {
                warn!(
                    task_id = %job.task_id,
                    file_index = job.file_index,
                    attempts = file.attempts,
                    %error,
                    "file download failed"
                );
                let retriable = error.is_retriable();
                file.mark_failed(error.to_string(), now);
                // Permanent failures (4xx and the like) are terminal even
                // with budget remaining.
                retriable && file.attempts < file.max_attempts
            }
        };
        if result.is_err() && !retry {
            coordinator.metrics.file_failed();
        }
        task.recompute_status();
        (task.clone(), retry)
    };
    coordinator.append_journal(&snapshot);

    if retry_job {
        // Reset to pending first and journal it, so the file is recoverable
        // even when the re-enqueue is skipped during shutdown.
        let snapshot = {
            let mut tasks = coordinator.tasks.write().await;
            let Some(task) = tasks.get_mut(&job.task_id) else {
                return;
            };
            let Some(file) = task.files.get_mut(job.file_index) else {
                return;
            };
            file.reset_pending();
            task.recompute_status();
            task.clone()
        };
        coordinator.append_journal(&snapshot);
        coordinator.metrics.retry_scheduled();

        if !coordinator.dispatcher.is_closed() {
            coordinator.dispatcher.enqueue(job).await;
        }
    }
}
