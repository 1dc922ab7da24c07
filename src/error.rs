//! Error types.
//!
//! Two families matter to callers:
//!
//! - **Handleable** errors ([`ValidationError`], [`LockTimeout`]) are raised
//!   before any mutation becomes visible. The caller may retry, degrade or
//!   surface them to a user.
//! - **Fatal** errors ([`DesyncError`], [`SimulationError`], [`CodecError`])
//!   abort the enclosing run or session. A simulation error inside a
//!   transmission rolls the scenario back to its pre-transmission state.

use std::time::Duration;

use thiserror::Error;

use crate::models::Ticks;
pub use crate::validation::{ValidationError, ValidationErrorKind};

/// Crate-level result alias.
pub type ApsResult<T> = Result<T, ApsError>;

/// Any error the engine reports.
#[derive(Debug, Error)]
pub enum ApsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    LockTimeout(#[from] LockTimeout),
    #[error(transparent)]
    Desync(#[from] DesyncError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("nothing to undo")]
    NothingToUndo,
}

impl ApsError {
    /// Whether the error is recoverable at the API boundary.
    pub fn is_handleable(&self) -> bool {
        matches!(self, ApsError::Validation(_) | ApsError::LockTimeout(_))
    }
}

/// Which side of the scenario lock timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

/// A timed lock acquisition did not succeed in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{mode:?} lock not acquired within {timeout:?}")]
pub struct LockTimeout {
    pub mode: LockMode,
    pub timeout: Duration,
}

/// Client and server scenario checksums diverged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scenario desynchronized: expected checksum {expected}, found {actual}")]
pub struct DesyncError {
    pub expected: String,
    pub actual: String,
}

/// Internal failure during a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("event at {time} scheduled before clock {clock}")]
    EventBeforeClock { time: Ticks, clock: Ticks },
    #[error("dangling reference: {0}")]
    DanglingReference(String),
    #[error("customization hook failed: {0}")]
    Hook(String),
    #[error("internal simulation error: {0}")]
    Internal(String),
}

/// Failure encoding or decoding versioned binary data.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed header")]
    BadHeader,
    #[error("unique id mismatch: expected {expected}, found {found}")]
    UniqueIdMismatch { expected: i32, found: i32 },
    #[error("unsupported version {found} for type {unique_id} (newest known {supported})")]
    UnsupportedVersion {
        unique_id: i32,
        found: u32,
        supported: u32,
    },
    #[error("unknown transmission type {0}")]
    UnknownType(i32),
    #[error("payload: {0}")]
    Payload(#[from] bincode::Error),
}

/// Invalid engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration value `{field}`: {reason}")]
    Value { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handleable_classification() {
        let validation: ApsError =
            ValidationError::new(ValidationErrorKind::InvalidArgument, "bad").into();
        assert!(validation.is_handleable());

        let timeout: ApsError = LockTimeout {
            mode: LockMode::Write,
            timeout: Duration::from_millis(5),
        }
        .into();
        assert!(timeout.is_handleable());

        let desync: ApsError = DesyncError {
            expected: "a".into(),
            actual: "b".into(),
        }
        .into();
        assert!(!desync.is_handleable());
        assert!(!ApsError::NothingToUndo.is_handleable());
    }

    #[test]
    fn test_messages() {
        let err = SimulationError::EventBeforeClock { time: 5, clock: 10 };
        assert_eq!(err.to_string(), "event at 5 scheduled before clock 10");

        let err = CodecError::UniqueIdMismatch {
            expected: 1004,
            found: 1005,
        };
        assert!(err.to_string().contains("1004"));
    }
}
