//! Collision-free destination paths.

use std::path::{Path, PathBuf};

/// Returns `base` if free, otherwise the first free `name-N.ext` for
/// N in 1..=9999, otherwise `base` with a literal `-dup` suffix (a
/// last-resort non-unique name for a pathological directory).
pub(crate) fn unique_path(base: &Path) -> PathBuf {
    if !base.exists() {
        return base.to_path_buf();
    }

    let parent = base.parent().unwrap_or_else(|| Path::new(""));
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let ext = base.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 1usize..10_000 {
        let name = match &ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
    }

    let mut fallback = base.as_os_str().to_os_string();
    fallback.push("-dup");
    PathBuf::from(fallback)
}
