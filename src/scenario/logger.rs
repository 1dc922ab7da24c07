//! Logging collaborator.
//!
//! The scenario calls its logger after the write lock is released, once per
//! transmission, once per audit entry and once per failure.

use parking_lot::Mutex;
use tracing::{error, info};

use super::audit::AuditEntry;
use super::changes::ScenarioDataChanges;
use crate::error::ApsError;

/// Receiver of audit, exception and transmission records.
pub trait ScenarioLogger: Send + Sync + std::fmt::Debug {
    fn log_audit(&self, entry: &AuditEntry);

    fn log_exception(&self, transmission: i32, error: &ApsError);

    fn log_transmission(&self, transmission: i32, version: u64, changes: &ScenarioDataChanges);
}

/// Emits every record as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl ScenarioLogger for TracingLogger {
    fn log_audit(&self, entry: &AuditEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => info!(target: "u_aps::audit", object = ?entry.object_type, id = entry.id, %json),
            Err(e) => error!(target: "u_aps::audit", id = entry.id, error = %e, "audit entry not rendered"),
        }
    }

    fn log_exception(&self, transmission: i32, error: &ApsError) {
        error!(transmission, handleable = error.is_handleable(), %error, "transmission failed");
    }

    fn log_transmission(&self, transmission: i32, version: u64, changes: &ScenarioDataChanges) {
        info!(transmission, version, changed = changes.len(), "transmission applied");
    }
}

/// One record kept by [`MemoryLogger`].
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Audit(AuditEntry),
    Exception { transmission: i32, message: String },
    Transmission { transmission: i32, version: u64, changed: usize },
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                LogRecord::Audit(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl ScenarioLogger for MemoryLogger {
    fn log_audit(&self, entry: &AuditEntry) {
        self.records.lock().push(LogRecord::Audit(entry.clone()));
    }

    fn log_exception(&self, transmission: i32, error: &ApsError) {
        self.records.lock().push(LogRecord::Exception {
            transmission,
            message: error.to_string(),
        });
    }

    fn log_transmission(&self, transmission: i32, version: u64, changes: &ScenarioDataChanges) {
        self.records.lock().push(LogRecord::Transmission {
            transmission,
            version,
            changed: changes.len(),
        });
    }
}
