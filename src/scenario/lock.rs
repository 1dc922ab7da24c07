//! Timed multi-reader/single-writer lock.
//!
//! There is no untimed acquisition: every read or write names its timeout
//! and fails with [`LockTimeout`] rather than blocking forever.

use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::config::LockConfig;
use crate::error::{LockMode, LockTimeout};

/// Guards one value with timed read and write acquisition.
#[derive(Debug, Default)]
pub struct ScenarioLock<T> {
    inner: RwLock<T>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl<T> ScenarioLock<T> {
    pub fn new(value: T, config: &LockConfig) -> Self {
        Self {
            inner: RwLock::new(value),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        }
    }

    /// Acquires a read view within the configured timeout.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, T>, LockTimeout> {
        self.read_for(self.read_timeout)
    }

    /// Acquires the write view within the configured timeout.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, T>, LockTimeout> {
        self.write_for(self.write_timeout)
    }

    pub fn read_for(&self, timeout: Duration) -> Result<RwLockReadGuard<'_, T>, LockTimeout> {
        self.inner.try_read_for(timeout).ok_or_else(|| {
            warn!(?timeout, "read lock timed out");
            LockTimeout {
                mode: LockMode::Read,
                timeout,
            }
        })
    }

    pub fn write_for(&self, timeout: Duration) -> Result<RwLockWriteGuard<'_, T>, LockTimeout> {
        self.inner.try_write_for(timeout).ok_or_else(|| {
            warn!(?timeout, "write lock timed out");
            LockTimeout {
                mode: LockMode::Write,
                timeout,
            }
        })
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}
