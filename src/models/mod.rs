//! Planning graph models.
//!
//! The static and semi-static structure the simulation works on:
//! `Job → ManufacturingOrder → AlternatePath → Operation → Activity`, with
//! resource requirements on operations and precedence associations between
//! operations of one path. The simulation result is a [`Schedule`] of
//! [`ResourceBlock`]s.
//!
//! # Domain Mappings
//!
//! | u-aps | Shop floor |
//! |-------|-----------|
//! | Job | Customer order |
//! | ManufacturingOrder | Work order / lot |
//! | AlternatePath | Routing alternative |
//! | Operation | Routing step |
//! | Activity | Split of a step (one schedulable piece) |
//! | ResourceBlock | Slot on a machine, cell or person |

mod activity;
mod graph;
mod ids;
mod job;
mod path;
mod resource;
mod schedule;
pub mod time;

pub use activity::{
    Activity, MoveRequest, Operation, ProductionStatus, RequirementShape, ResourceRequirement,
    Stage, StageDurations, StageUsage,
};
pub use graph::{activity_mut, operation_mut, ActivityRef, Location, PlanningIndex};
pub use ids::{
    ActivityId, BatchId, BlockId, IdGenerator, IntervalId, JobId, MoId, OperationId, PathId,
    RequirementId, ResourceId,
};
pub use job::{Job, ManufacturingOrder};
pub use path::{predecessor_release_time, AlternatePath, Association, StageBoundaries};
pub use resource::{BatchSettings, CapacityType, Resource};
pub use schedule::{ResourceBlock, Schedule, UnscheduledReason};
pub use time::Ticks;
