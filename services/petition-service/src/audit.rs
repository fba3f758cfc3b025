//! Structured audit trail for the coordinator
//!
//! Every vote outcome and every degraded write is reported through an
//! [`AuditSink`]. Production wiring forwards to `tracing` under the `audit`
//! target; tests use [`RecordingAuditSink`] to assert on what was emitted.

use parking_lot::Mutex;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            AuditLevel::Debug => "debug",
            AuditLevel::Info => "info",
            AuditLevel::Warn => "warn",
            AuditLevel::Error => "error",
        };
        f.write_str(level)
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, level: AuditLevel, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, level: AuditLevel, message: &str) {
        match level {
            AuditLevel::Debug => tracing::debug!(target: "audit", "{}", message),
            AuditLevel::Info => tracing::info!(target: "audit", "{}", message),
            AuditLevel::Warn => tracing::warn!(target: "audit", "{}", message),
            AuditLevel::Error => tracing::error!(target: "audit", "{}", message),
        }
    }
}

/// In-memory sink that keeps every entry
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<(AuditLevel, String)>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(AuditLevel, String)> {
        self.entries.lock().clone()
    }

    /// True if some entry at `level` contains `needle`
    pub fn contains(&self, level: AuditLevel, needle: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }

    pub fn count(&self, level: AuditLevel) -> usize {
        self.entries.lock().iter().filter(|(l, _)| *l == level).count()
    }
}

impl AuditSink for RecordingAuditSink {
    fn emit(&self, level: AuditLevel, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}
