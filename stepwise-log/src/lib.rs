//! # stepwise-log
//!
//! Durable, human-readable transcript log for a single task run.
//!
//! The log holds one line per transcript entry and is rewritten in full after
//! every round, so the file on disk always mirrors the decision state that
//! drives the next round:
//!
//! ```text
//! [Mon Oct 19 10:02:11 2026] [user] List the python files under src...
//! [Mon Oct 19 10:02:13 2026] [assistant] <FunctionCallBegin>{"name":"GlobTool",...
//! ```

use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of characters of each entry kept in the log line.
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("failed to create log directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write run log {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A single transcript entry as seen by the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub content: String,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Utc>, kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind: kind.into(),
            content: content.into(),
        }
    }
}

/// Append-only run log that is flushed by rewriting the whole file.
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    path: PathBuf,
}

impl TranscriptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve `<log_dir>/<log_name>/fork<F>_side<S>.log`, creating the
    /// directory if it does not exist yet.
    pub fn for_run(
        log_dir: &Path,
        log_name: &str,
        fork: u32,
        side: u32,
    ) -> Result<Self, RunLogError> {
        let dir = log_dir.join(log_name);
        fs::create_dir_all(&dir).map_err(|source| RunLogError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self::new(dir.join(format!("fork{fork}_side{side}.log"))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file content with one line per entry.
    pub fn rewrite<'a, I>(&self, entries: I) -> Result<(), RunLogError>
    where
        I: IntoIterator<Item = &'a LogEntry>,
    {
        let mut buffer = String::new();
        for entry in entries {
            buffer.push_str(&format_line(entry, DEFAULT_PREVIEW_CHARS));
            buffer.push('\n');
        }
        fs::write(&self.path, buffer).map_err(|source| RunLogError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Render one entry. Whitespace runs (including newlines) collapse to a single
/// space so an entry never spans more than one line.
pub fn format_line(entry: &LogEntry, preview_chars: usize) -> String {
    let single_line = entry.content.split_whitespace().collect::<Vec<_>>().join(" ");
    let preview: String = single_line.chars().take(preview_chars).collect();
    format!(
        "[{}] [{}] {}...",
        entry.timestamp.format("%a %b %e %H:%M:%S %Y"),
        entry.kind,
        preview
    )
}
