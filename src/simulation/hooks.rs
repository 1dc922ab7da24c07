//! Customization hooks.
//!
//! A package manager may observe a simulation at fixed stages and return
//! [`ChangeableValues`] the run applies before continuing.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use super::SimulationMode;
use crate::dispatching::SequencingRule;
use crate::error::SimulationError;
use crate::models::{JobId, Schedule, Ticks};

/// Stages after which [`SimulationHooks::post_simulation_stage`] is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulationStage {
    /// Frozen-span blocks were re-committed.
    Frozen,
    /// The event loop ran to completion or its horizon.
    Dispatch,
}

/// Values a hook may change mid-run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeableValues {
    /// Job priorities used for dispatch keys created from now on. Returned
    /// from `end_of_simulation`, they are written back to the jobs.
    pub priority_overrides: BTreeMap<JobId, i32>,
    /// Replaces the sequencing rule; honored before dispatching starts.
    pub sequencing_rule: Option<SequencingRule>,
}

impl ChangeableValues {
    pub fn is_empty(&self) -> bool {
        self.priority_overrides.is_empty() && self.sequencing_rule.is_none()
    }

    pub fn with_priority(mut self, job: JobId, priority: i32) -> Self {
        self.priority_overrides.insert(job, priority);
        self
    }

    pub fn with_sequencing_rule(mut self, rule: SequencingRule) -> Self {
        self.sequencing_rule = Some(rule);
        self
    }
}

/// What a hook sees of a run.
#[derive(Debug, Clone, Copy)]
pub struct StageView<'a> {
    pub clock: Ticks,
    pub mode: SimulationMode,
    pub schedule: &'a Schedule,
}

/// Package-manager hooks; every method defaults to "no change".
pub trait SimulationHooks: Send + Sync + Debug {
    fn pre_simulation(
        &self,
        _view: StageView<'_>,
    ) -> Result<Option<ChangeableValues>, SimulationError> {
        Ok(None)
    }

    fn post_simulation_stage(
        &self,
        _stage: SimulationStage,
        _view: StageView<'_>,
    ) -> Result<Option<ChangeableValues>, SimulationError> {
        Ok(None)
    }

    fn end_of_simulation(
        &self,
        _view: StageView<'_>,
    ) -> Result<Option<ChangeableValues>, SimulationError> {
        Ok(None)
    }
}

/// Hooks that never change anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl SimulationHooks for NoHooks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeable_values_builder() {
        let v = ChangeableValues::default();
        assert!(v.is_empty());
        let v = v
            .with_priority(JobId(1), 9)
            .with_sequencing_rule(SequencingRule::Fifo);
        assert!(!v.is_empty());
        assert_eq!(v.priority_overrides[&JobId(1)], 9);
    }

    #[test]
    fn test_no_hooks_defaults() {
        let schedule = Schedule::new();
        let view = StageView {
            clock: 0,
            mode: SimulationMode::Optimize,
            schedule: &schedule,
        };
        assert_eq!(NoHooks.pre_simulation(view), Ok(None));
        assert_eq!(
            NoHooks.post_simulation_stage(SimulationStage::Frozen, view),
            Ok(None)
        );
        assert_eq!(NoHooks.end_of_simulation(view), Ok(None));
    }
}
