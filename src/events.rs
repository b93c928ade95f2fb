//! In-memory event log for the control plane.
//!
//! Holds noteworthy diagnostics (capture-file decode failures, subscriber
//! evictions, engine rejections) for display in observing clients. Appends
//! are broadcast on the `events` resource; the log itself is bounded and
//! purely in-memory.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of retained entries. Older entries are dropped.
pub const EVENT_LOG_CAPACITY: usize = 4096;

/// Severity of an event-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug-level message.
    Debug,
    /// Informational message.
    Info,
    /// Warning message.
    Warn,
    /// Error message.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// One entry in the event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLogEntry {
    /// Monotonically increasing entry id.
    pub id: u64,
    /// Human-readable message.
    pub message: String,
    /// Severity.
    pub level: LogLevel,
}

/// Bounded in-memory event log.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: VecDeque<EventLogEntry>,
    next_id: u64,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, returning a clone of it for broadcast.
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) -> EventLogEntry {
        self.next_id += 1;
        let entry = EventLogEntry {
            id: self.next_id,
            message: message.into(),
            level,
        };
        self.entries.push_back(entry.clone());
        if self.entries.len() > EVENT_LOG_CAPACITY {
            self.entries.pop_front();
        }
        entry
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &EventLogEntry> {
        self.entries.iter()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_increasing_ids() {
        let mut log = EventLog::new();
        let a = log.push(LogLevel::Info, "first");
        let b = log.push(LogLevel::Warn, "second");
        assert!(b.id > a.id);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut log = EventLog::new();
        for i in 0..(EVENT_LOG_CAPACITY + 10) {
            log.push(LogLevel::Debug, format!("entry {i}"));
        }
        assert_eq!(log.len(), EVENT_LOG_CAPACITY);
        let first = log.entries().next().unwrap();
        assert_eq!(first.message, "entry 10");
    }

    #[test]
    fn test_level_display() {
        assert_eq!(format!("{}", LogLevel::Error), "error");
        assert_eq!(format!("{}", LogLevel::Info), "info");
    }
}
