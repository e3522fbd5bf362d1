// src/utils/log.rs

//! Append-only run journal.
//!
//! Every entry is mirrored to the `log` facade and appended as one JSON line
//! of `{timestamp, message}`. Writing is best-effort: a failed append is
//! reported through `log::warn!` and never reaches the caller.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

/// Best-effort append-only log sink.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    path: Option<PathBuf>,
}

impl Journal {
    /// Journal appending to the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Journal that only forwards to the `log` facade.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Record an informational message.
    pub fn record(&self, message: &str) {
        log::info!("{message}");
        self.append(message);
    }

    /// Record a failure.
    pub fn failure(&self, message: &str) {
        log::error!("{message}");
        self.append(message);
    }

    fn append(&self, message: &str) {
        let Some(path) = &self.path else {
            return;
        };
        let entry = JournalEntry {
            timestamp: Local::now(),
            message: message.to_string(),
        };
        if let Err(e) = Self::write_line(path, &entry) {
            log::warn!("Journal write to {} failed: {}", path.display(), e);
        }
    }

    fn write_line(path: &Path, entry: &JournalEntry) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read all entries back; a missing file yields an empty journal.
    pub fn entries(&self) -> Result<Vec<JournalEntry>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }
}
