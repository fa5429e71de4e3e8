//! Task data model: a submitted batch of URLs and its per-file download state.
//!
//! A [`Task`] is created once per submission and mutated only by the
//! coordinator; everything observable about it (aggregates, derived status)
//! is recomputed from the per-file states on every transition.

mod filename;
mod id;
mod model;

pub use filename::sanitize_filename;
pub use id::new_task_id;
pub use model::{host_key, FileItem, FileState, Task, TaskError, TaskStatus};
