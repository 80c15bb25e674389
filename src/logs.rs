//! Discovery of the server's rotating log files.
//!
//! The server opens a new log file on every start, so "the current log" is
//! always the newest file matching `<dir>/*.<extension>`. Both the tailer
//! and the identity ingestion go through these helpers.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Lists log files in `dir` with the given extension, oldest first.
///
/// Files are ordered by creation time. Platforms or filesystems without a
/// birth time fall back to the modification time.
pub fn log_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        extension.trim_start_matches('.')
    );

    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in glob::glob(&pattern).with_context(|| format!("Invalid log pattern: {pattern}"))? {
        // Entries that vanish between listing and stat are rotation noise.
        let Ok(path) = entry else { continue };
        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((created, path));
    }

    found.sort();
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Returns the newest log file in `dir`, or `None` if there is none yet.
pub fn newest_log_file(dir: &Path, extension: &str) -> Result<Option<PathBuf>> {
    Ok(log_files(dir, extension)?.pop())
}
