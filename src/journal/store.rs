use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::task::Task;

use super::error::Result;

const WAL_FILE: &str = "tasks.wal";
const RECORD_UPSERT: &str = "upsert_task";

/// Lines longer than this are skipped during recovery.
const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Serialize)]
struct WalAppend<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    task: &'a Task,
}

#[derive(Deserialize)]
struct WalRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    task: Option<Task>,
}

/// File-backed journal of task snapshots.
///
/// One instance is the single writer for its file; appends are serialized
/// through an internal mutex. Recovery reads through a separate handle and
/// never mutates the file.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl Journal {
    /// Opens (or creates) `<data_dir>/tasks.wal` for appending.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        let path = data_dir.join(WAL_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "journal opened");

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::with_capacity(64 * 1024, file)),
        })
    }

    /// Appends one upsert record for `task` and flushes the buffer so the
    /// bytes reach the OS before returning.
    pub fn append_task(&self, task: &Task) -> Result<()> {
        let record = WalAppend {
            kind: RECORD_UPSERT,
            task,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.write_all(&line)?;
        writer.flush()?;
        debug!(task_id = %task.id, status = ?task.status, "journaled task snapshot");
        Ok(())
    }

    /// Replays the journal and returns the last snapshot per task id.
    ///
    /// Lines that fail to parse, records of other types, and oversized lines
    /// are skipped; the scan itself is read-only.
    pub fn recover(&self) -> Result<HashMap<String, Task>> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::with_capacity(64 * 1024, file);

        let mut tasks: HashMap<String, Task> = HashMap::new();
        let mut line: Vec<u8> = Vec::new();
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            if line.len() > MAX_LINE_BYTES {
                warn!(bytes = line.len(), "skipping oversized journal line");
                continue;
            }
            let Ok(record) = serde_json::from_slice::<WalRecord>(&line) else {
                continue;
            };
            if record.kind != RECORD_UPSERT {
                continue;
            }
            if let Some(task) = record.task {
                tasks.insert(task.id.clone(), task);
            }
        }

        Ok(tasks)
    }

    /// Flushes any buffered appends.
    pub fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.flush()?;
        Ok(())
    }
}
