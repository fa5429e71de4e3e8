use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::filename::{basename, sanitize_filename};
use super::id::new_task_id;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("links must be non-empty")]
    EmptyLinks,

    #[error("invalid link: {0}")]
    InvalidLink(String),
}

/// Aggregated status of a task, derived from its file states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Partial,
}

/// State of a single file within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileState {
    Pending,
    Running,
    Done,
    Failed,
}

/// One URL of a task and everything recorded about downloading it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileItem {
    pub url: String,
    pub filename: String,
    pub state: FileState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub bytes_downloaded: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub host: String,
}

impl FileItem {
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.state = FileState::Running;
        self.error.clear();
        self.started_at = Some(now);
    }

    pub fn mark_done(&mut self, bytes: u64, now: DateTime<Utc>) {
        self.state = FileState::Done;
        self.error.clear();
        self.bytes_downloaded = bytes;
        self.finished_at = Some(now);
    }

    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.state = FileState::Failed;
        self.error = error;
        self.finished_at = Some(now);
    }

    /// Returns the file to the queueable state, clearing the error and
    /// timestamps. Used both for retries and for crash recovery.
    pub fn reset_pending(&mut self) {
        self.state = FileState::Pending;
        self.error.clear();
        self.started_at = None;
        self.finished_at = None;
    }
}

/// A submitted download batch. Aggregates are derived; call
/// [`Task::recompute_status`] after any file transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub dest_dir: String,
    pub status: TaskStatus,
    pub files: Vec<FileItem>,

    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub pending: usize,
    pub running: usize,
    pub retries_total: u64,
}

impl Task {
    /// Builds a task from a list of links.
    ///
    /// Every link must parse as an absolute URL with a host; the filename is
    /// the sanitized basename of the URL path. Files start pending with
    /// `max_attempts` as their retry budget. `dest_dir` is stored as given;
    /// it is resolved against the downloads root when a file is fetched.
    pub fn new(
        label: &str,
        dest_dir: &str,
        links: &[String],
        max_attempts: u32,
    ) -> Result<Self, TaskError> {
        if links.is_empty() {
            return Err(TaskError::EmptyLinks);
        }

        let mut files = Vec::with_capacity(links.len());
        for link in links {
            let url =
                Url::parse(link).map_err(|_| TaskError::InvalidLink(link.clone()))?;
            let host = host_key(&url).ok_or_else(|| TaskError::InvalidLink(link.clone()))?;

            files.push(FileItem {
                url: link.clone(),
                filename: sanitize_filename(basename(url.path())),
                state: FileState::Pending,
                error: String::new(),
                attempts: 0,
                max_attempts,
                bytes_downloaded: 0,
                started_at: None,
                finished_at: None,
                host,
            });
        }

        let mut task = Task {
            id: new_task_id(),
            label: label.to_string(),
            created_at: Utc::now(),
            dest_dir: dest_dir.to_string(),
            status: TaskStatus::Pending,
            files,
            total: 0,
            done: 0,
            failed: 0,
            pending: 0,
            running: 0,
            retries_total: 0,
        };
        task.recompute_status();
        Ok(task)
    }

    /// Recomputes the aggregate counters from the file census and derives
    /// the task status:
    /// all done → COMPLETE; all failed → FAILED; any running → RUNNING;
    /// done and failed present with nothing left → PARTIAL; else PENDING.
    pub fn recompute_status(&mut self) {
        let total = self.files.len();
        let (mut done, mut failed, mut pending, mut running) = (0, 0, 0, 0);
        let mut retries: u64 = 0;

        for file in &self.files {
            match file.state {
                FileState::Done => done += 1,
                FileState::Failed => failed += 1,
                FileState::Pending => pending += 1,
                FileState::Running => running += 1,
            }
            retries += u64::from(file.attempts);
        }

        self.total = total;
        self.done = done;
        self.failed = failed;
        self.pending = pending;
        self.running = running;
        self.retries_total = retries;

        self.status = if total > 0 && done == total {
            TaskStatus::Complete
        } else if total > 0 && failed == total {
            TaskStatus::Failed
        } else if running > 0 {
            TaskStatus::Running
        } else if done > 0 && failed > 0 && pending == 0 && running == 0 {
            TaskStatus::Partial
        } else {
            TaskStatus::Pending
        };
    }
}

/// Limiter key for a URL: `host` or `host:port` when a port is present.
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if host.is_empty() {
        return None;
    }
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_states(states: &[FileState]) -> Task {
        let links: Vec<String> = (0..states.len())
            .map(|i| format!("http://example.com/f{i}.bin"))
            .collect();
        let mut task = Task::new("t", "", &links, 3).unwrap();
        for (file, state) in task.files.iter_mut().zip(states) {
            file.state = *state;
        }
        task.recompute_status();
        task
    }

    #[test]
    fn new_task_rejects_empty_links() {
        let err = Task::new("x", "", &[], 3).unwrap_err();
        assert!(matches!(err, TaskError::EmptyLinks));
    }

    #[test]
    fn new_task_rejects_invalid_links() {
        for bad in ["not a url", "relative/path", "mailto:me@example.com"] {
            let err = Task::new("x", "", &[bad.to_string()], 3).unwrap_err();
            assert!(matches!(err, TaskError::InvalidLink(_)), "accepted {bad:?}");
        }
    }

    #[test]
    fn new_task_derives_filename_and_host() {
        let links = vec!["http://files.example.com:8081/pkgs/tool.tar.gz?v=2".to_string()];
        let task = Task::new("", "", &links, 3).unwrap();
        assert_eq!(task.files[0].filename, "tool.tar.gz");
        assert_eq!(task.files[0].host, "files.example.com:8081");
        assert_eq!(task.files[0].state, FileState::Pending);
        assert_eq!(task.files[0].max_attempts, 3);
    }

    #[test]
    fn root_path_yields_file() {
        let task = Task::new("", "", &["http://example.com/".to_string()], 1).unwrap();
        assert_eq!(task.files[0].filename, "file");
    }

    #[test]
    fn status_derivation_rules() {
        use FileState::*;
        assert_eq!(task_with_states(&[Done, Done]).status, TaskStatus::Complete);
        assert_eq!(task_with_states(&[Failed, Failed]).status, TaskStatus::Failed);
        assert_eq!(task_with_states(&[Done, Running]).status, TaskStatus::Running);
        assert_eq!(task_with_states(&[Done, Failed]).status, TaskStatus::Partial);
        assert_eq!(task_with_states(&[Done, Pending]).status, TaskStatus::Pending);
        assert_eq!(
            task_with_states(&[Pending, Pending]).status,
            TaskStatus::Pending
        );
    }

    #[test]
    fn aggregates_match_census() {
        use FileState::*;
        let task = task_with_states(&[Done, Failed, Pending, Running, Done]);
        assert_eq!(task.total, 5);
        assert_eq!(task.done, 2);
        assert_eq!(task.failed, 1);
        assert_eq!(task.pending, 1);
        assert_eq!(task.running, 1);
        assert_eq!(
            task.done + task.failed + task.pending + task.running,
            task.total
        );
    }

    #[test]
    fn retries_total_sums_attempts() {
        let mut task = task_with_states(&[FileState::Done, FileState::Done]);
        task.files[0].attempts = 2;
        task.files[1].attempts = 1;
        task.recompute_status();
        assert_eq!(task.retries_total, 3);
    }

    #[test]
    fn reset_pending_clears_bookkeeping() {
        let mut task = task_with_states(&[FileState::Failed]);
        task.files[0].error = "http 500".to_string();
        task.files[0].started_at = Some(Utc::now());
        task.files[0].finished_at = Some(Utc::now());

        task.files[0].reset_pending();
        task.recompute_status();

        assert_eq!(task.files[0].state, FileState::Pending);
        assert!(task.files[0].error.is_empty());
        assert!(task.files[0].started_at.is_none());
        assert!(task.files[0].finished_at.is_none());
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn states_serialize_as_wire_words() {
        let task = task_with_states(&[FileState::Done]);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "COMPLETE");
        assert_eq!(json["files"][0]["state"], "DONE");
        // Cleared optional fields stay off the wire.
        assert!(json["files"][0].get("error").is_none());
    }
}
