//! Engine configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! [lock]
//! read_timeout_ms = 5000
//! write_timeout_ms = 10000
//!
//! [simulation]
//! horizon_days = 365
//! sequencing_rule = "JobPriority"
//! # trial_days = 30
//!
//! [undo]
//! max_depth = 20
//!
//! [search]
//! max_parallel_trials = 0
//! candidate_sort = "TimeOnly"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::copilot::CandidateSort;
use crate::dispatching::SequencingRule;
use crate::error::ConfigError;
use crate::models::time::days;
use crate::models::Ticks;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub lock: LockConfig,
    pub simulation: SimulationConfig,
    pub undo: UndoConfig,
    pub search: SearchConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock.read_timeout_ms == 0 {
            return Err(ConfigError::Value {
                field: "lock.read_timeout_ms",
                reason: "must be positive".into(),
            });
        }
        if self.lock.write_timeout_ms == 0 {
            return Err(ConfigError::Value {
                field: "lock.write_timeout_ms",
                reason: "must be positive".into(),
            });
        }
        self.simulation.validate()
    }

    pub fn with_lock_timeouts(mut self, read_ms: u64, write_ms: u64) -> Self {
        self.lock.read_timeout_ms = read_ms;
        self.lock.write_timeout_ms = write_ms;
        self
    }

    pub fn with_simulation(mut self, simulation: SimulationConfig) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn with_undo_depth(mut self, max_depth: usize) -> Self {
        self.undo.max_depth = max_depth;
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }
}

/// Scenario lock timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 5_000,
            write_timeout_ms: 10_000,
        }
    }
}

impl LockConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Simulation options; also the per-scenario options a transmission can
/// change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Capacity expansion and scheduling horizon, in days past the clock.
    pub horizon_days: i64,
    /// Ordering of the default dispatcher.
    pub sequencing_rule: SequencingRule,
    /// Trial builds stop scheduling this many days past the clock.
    pub trial_days: Option<i64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizon_days: 365,
            sequencing_rule: SequencingRule::JobPriority,
            trial_days: None,
        }
    }
}

impl SimulationConfig {
    pub fn with_horizon_days(mut self, horizon_days: i64) -> Self {
        self.horizon_days = horizon_days;
        self
    }

    pub fn with_sequencing_rule(mut self, rule: SequencingRule) -> Self {
        self.sequencing_rule = rule;
        self
    }

    pub fn with_trial_days(mut self, trial_days: i64) -> Self {
        self.trial_days = Some(trial_days);
        self
    }

    /// Horizon length in ticks.
    pub fn horizon(&self) -> Ticks {
        days(self.horizon_days)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_days("simulation.horizon_days", self.horizon_days)?;
        if let Some(trial) = self.trial_days {
            check_days("simulation.trial_days", trial)?;
        }
        Ok(())
    }
}

/// Longest horizon or trial window accepted, in days.
pub const MAX_DAYS: i64 = 36_500;

fn check_days(field: &'static str, n: i64) -> Result<(), ConfigError> {
    if n <= 0 || n > MAX_DAYS {
        return Err(ConfigError::Value {
            field,
            reason: format!("must be in 1..={MAX_DAYS}, got {n}"),
        });
    }
    Ok(())
}

/// Undo settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// Snapshots retained; 0 disables undo.
    pub max_depth: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self { max_depth: 20 }
    }
}

/// Heuristic search settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Worker threads for trials; 0 uses the global rayon pool.
    pub max_parallel_trials: usize,
    pub candidate_sort: CandidateSort,
}

impl SearchConfig {
    pub fn with_max_parallel_trials(mut self, n: usize) -> Self {
        self.max_parallel_trials = n;
        self
    }

    pub fn with_candidate_sort(mut self, sort: CandidateSort) -> Self {
        self.candidate_sort = sort;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.lock.read_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.lock.write_timeout(), Duration::from_millis(10_000));
        assert_eq!(config.simulation.horizon_days, 365);
        assert_eq!(config.simulation.sequencing_rule, SequencingRule::JobPriority);
        assert_eq!(config.undo.max_depth, 20);
        assert_eq!(config.search.candidate_sort, CandidateSort::TimeOnly);
    }

    #[test]
    fn test_partial_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            [lock]
            write_timeout_ms = 250

            [simulation]
            sequencing_rule = "EarliestNeedDate"
            trial_days = 14

            [search]
            candidate_sort = "TimePathPreference"
            "#,
        )
        .unwrap();
        assert_eq!(config.lock.read_timeout_ms, 5_000);
        assert_eq!(config.lock.write_timeout_ms, 250);
        assert_eq!(
            config.simulation.sequencing_rule,
            SequencingRule::EarliestNeedDate
        );
        assert_eq!(config.simulation.trial_days, Some(14));
        assert_eq!(config.simulation.horizon_days, 365);
        assert_eq!(
            config.search.candidate_sort,
            CandidateSort::TimePathPreference
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("[simulation]\nhorizon_days = 0"),
            Err(ConfigError::Value {
                field: "simulation.horizon_days",
                ..
            })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[lock]\nread_timeout_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_day_counts_are_bounded() {
        assert!(matches!(
            EngineConfig::from_toml_str("[simulation]\nhorizon_days = 9223372036854775807"),
            Err(ConfigError::Value {
                field: "simulation.horizon_days",
                ..
            })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[simulation]\ntrial_days = 36501"),
            Err(ConfigError::Value {
                field: "simulation.trial_days",
                ..
            })
        ));
        let widest = SimulationConfig::default()
            .with_horizon_days(MAX_DAYS)
            .with_trial_days(MAX_DAYS);
        assert!(widest.validate().is_ok());
        assert!(widest.horizon() > 0);
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_lock_timeouts(1, 2)
            .with_undo_depth(3)
            .with_simulation(SimulationConfig::default().with_trial_days(7))
            .with_search(SearchConfig::default().with_max_parallel_trials(2));
        assert_eq!(config.lock.read_timeout_ms, 1);
        assert_eq!(config.undo.max_depth, 3);
        assert_eq!(config.simulation.trial_days, Some(7));
        assert_eq!(config.search.max_parallel_trials, 2);
    }
}
