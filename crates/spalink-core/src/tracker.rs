// ── Error tracking ──
//
// Central collector for non-fatal failures across subsystems. Keeps a
// bounded FIFO of structured entries plus per-category counters; the
// bus publisher and the status command read it. Nothing in here ever
// aborts the host process.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use strum::Display;

const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Gateway,
    Command,
    Verification,
    Sweep,
    Bus,
    Config,
    StateSync,
}

/// Single tracked failure with its context.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
    pub code: Option<&'static str>,
    /// Structured context: requested vs. observed values, attempt
    /// counts, unit coordinates.
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Bounded in-memory error collector shared across the engine.
pub struct ErrorTracker {
    entries: Mutex<VecDeque<TrackedError>>,
    capacity: usize,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn track(
        &self,
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: impl Into<String>,
        code: Option<&'static str>,
        details: Option<Value>,
    ) {
        let entry = TrackedError {
            category,
            severity,
            message: message.into(),
            code,
            details,
            timestamp: Utc::now(),
        };
        let mut entries = self.entries.lock().expect("error tracker poisoned");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent entries, newest last.
    pub fn recent(&self, limit: usize) -> Vec<TrackedError> {
        let entries = self.entries.lock().expect("error tracker poisoned");
        entries
            .iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    pub fn count_for(&self, category: ErrorCategory) -> usize {
        let entries = self.entries.lock().expect("error tracker poisoned");
        entries.iter().filter(|e| e.category == category).count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("error tracker poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_eviction_at_capacity() {
        let tracker = ErrorTracker::with_capacity(2);
        for i in 0..3 {
            tracker.track(
                ErrorCategory::Gateway,
                ErrorSeverity::Warning,
                format!("e{i}"),
                None,
                None,
            );
        }
        let recent = tracker.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "e1");
        assert_eq!(recent[1].message, "e2");
    }

    #[test]
    fn counts_by_category() {
        let tracker = ErrorTracker::new();
        tracker.track(
            ErrorCategory::Verification,
            ErrorSeverity::Error,
            "mismatch",
            Some("VERIFY_TIMEOUT"),
            None,
        );
        tracker.track(
            ErrorCategory::Bus,
            ErrorSeverity::Warning,
            "publish failed",
            None,
            None,
        );
        assert_eq!(tracker.count_for(ErrorCategory::Verification), 1);
        assert_eq!(tracker.count_for(ErrorCategory::Sweep), 0);
    }
}
