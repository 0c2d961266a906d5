//! Append-only activity log rendered by the console.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub status: LogStatus,
    pub method: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(status: LogStatus, method: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            method: method.into(),
            message: message.into(),
        }
    }
}

/// Entries retained unless configured otherwise.
pub const DEFAULT_RETENTION: usize = 1_000;

/// Shared, insertion-ordered log. Clones share the same entries.
///
/// Only the newest `retention` entries are kept; older ones fall off the
/// front. Nothing else removes entries except [`ActivityLog::clear`].
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    retention: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            retention: retention.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        // entries are plain data, a poisoned lock still holds a usable vec
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn push(&self, entry: LogEntry) {
        match entry.status {
            LogStatus::Success | LogStatus::Info => {
                info!(method = %entry.method, status = ?entry.status, "{}", entry.message)
            }
            LogStatus::Warning => warn!(method = %entry.method, "{}", entry.message),
            LogStatus::Error => error!(method = %entry.method, "{}", entry.message),
        }
        let mut entries = self.lock();
        while entries.len() >= self.retention {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn record(&self, status: LogStatus, method: &str, message: impl Into<String>) {
        self.push(LogEntry::new(status, method, message));
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
