//! Discrete-event simulation.
//!
//! A [`Simulator`] reads the planning graph and resources of a scenario and
//! produces a fresh [`Schedule`](crate::models::Schedule). Two modes exist:
//!
//! - [`SimulationMode::Optimize`] re-sequences everything with the
//!   configured [`SequencingRule`](crate::dispatching::SequencingRule).
//! - [`SimulationMode::TimeAdjustment`] keeps the previous sequence and only
//!   recomputes times; moves and expedites use it.
//!
//! Runs are deterministic: the same inputs always yield the same schedule.

mod batching;
mod engine;
mod hooks;
mod kpi;
mod report;
mod state;

use serde::{Deserialize, Serialize};

pub use engine::{SimulationOutcome, Simulator};
pub use hooks::{ChangeableValues, NoHooks, SimulationHooks, SimulationStage, StageView};
pub use kpi::ScheduleKpi;
pub use report::{check_schedule, BlockViolation, SimulationReport};

/// How dispatchers order ready activities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulationMode {
    /// Sequence by the configured rule.
    #[default]
    Optimize,
    /// Preserve the previous schedule's order.
    TimeAdjustment,
}
