//! Operation and activity model.
//!
//! An operation is one routing step of an alternate path. It owns one or more
//! activities, which are the atomic units of schedulable work, and the
//! resource requirements every one of its activities must satisfy.
//!
//! # Duration Model
//!
//! Each activity consumes its primary resource through three stages, in
//! order: **setup**, **run**, **post-processing**. A fourth span,
//! **material post-processing**, does not occupy any resource but delays the
//! release of successor operations (cooling, curing, drying).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::{ActivityId, OperationId, RequirementId, ResourceId};
use super::time::Ticks;

bitflags! {
    /// Stages a capacity interval or a resource requirement covers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct StageUsage: u8 {
        const SETUP = 1 << 0;
        const RUN = 1 << 1;
        const POST_PROCESSING = 1 << 2;
        const CLEAN = 1 << 3;
        const STORAGE = 1 << 4;
    }
}

impl StageUsage {
    /// Setup, run and post-processing: what a primary requirement holds.
    pub fn production() -> Self {
        Self::SETUP | Self::RUN | Self::POST_PROCESSING
    }
}

impl Default for StageUsage {
    fn default() -> Self {
        Self::production()
    }
}

/// A resource-consuming stage of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Setup,
    Run,
    PostProcessing,
}

impl Stage {
    /// All stages in consumption order.
    pub const ALL: [Stage; 3] = [Stage::Setup, Stage::Run, Stage::PostProcessing];

    /// The usage flag an interval needs to host this stage.
    pub fn usage(self) -> StageUsage {
        match self {
            Stage::Setup => StageUsage::SETUP,
            Stage::Run => StageUsage::RUN,
            Stage::PostProcessing => StageUsage::POST_PROCESSING,
        }
    }
}

/// Stage durations of an activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDurations {
    /// Resource preparation before processing.
    pub setup: Ticks,
    /// Core processing.
    pub run: Ticks,
    /// Resource-occupying work after processing (cleaning, unloading).
    pub post_processing: Ticks,
    /// Delay before successors may consume the output; holds no resource.
    pub material_post_processing: Ticks,
}

impl StageDurations {
    pub fn new(setup: Ticks, run: Ticks, post_processing: Ticks) -> Self {
        Self {
            setup,
            run,
            post_processing,
            material_post_processing: 0,
        }
    }

    /// Run-only duration.
    pub fn run_only(run: Ticks) -> Self {
        Self::new(0, run, 0)
    }

    pub fn with_material_post_processing(mut self, ticks: Ticks) -> Self {
        self.material_post_processing = ticks;
        self
    }

    /// Span the primary resource is occupied.
    pub fn resource_span(&self) -> Ticks {
        self.setup + self.run + self.post_processing
    }

    /// Duration of one stage.
    pub fn of(&self, stage: Stage) -> Ticks {
        match stage {
            Stage::Setup => self.setup,
            Stage::Run => self.run,
            Stage::PostProcessing => self.post_processing,
        }
    }
}

/// Production progress reported from the shop floor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductionStatus {
    #[default]
    NotStarted,
    /// Setup or run has begun; the activity is in production.
    Started,
    Finished,
}

/// A resource need shared by every activity of an operation.
///
/// Exactly one requirement of an operation is primary; the primary resource
/// owns the ready-queue the activity is dispatched from. Other requirements
/// are helpers, satisfied by resources the chosen primary allows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub id: RequirementId,
    /// Resources able to satisfy the requirement.
    pub eligible: Vec<ResourceId>,
    /// Whether this is the dispatching requirement.
    pub primary: bool,
    /// Stages during which the resource is held.
    pub usage: StageUsage,
}

impl ResourceRequirement {
    /// Creates a primary requirement held for all production stages.
    pub fn primary(id: RequirementId, eligible: Vec<ResourceId>) -> Self {
        Self {
            id,
            eligible,
            primary: true,
            usage: StageUsage::production(),
        }
    }

    /// Creates a helper requirement.
    pub fn helper(id: RequirementId, eligible: Vec<ResourceId>, usage: StageUsage) -> Self {
        Self {
            id,
            eligible,
            primary: false,
            usage,
        }
    }

    pub fn is_eligible(&self, resource: ResourceId) -> bool {
        self.eligible.contains(&resource)
    }
}

/// The atomic unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    /// Owning operation.
    pub operation: OperationId,
    /// Position among activities of the same operation that are meant to run
    /// side by side.
    pub simultaneous_index: u32,
    /// Volume contributed to a batch.
    pub quantity: f64,
    pub status: ProductionStatus,
    /// Remaining run time reported for a started activity.
    pub remaining_run: Option<Ticks>,
    /// Resource the activity must stay on.
    pub locked_resource: Option<ResourceId>,
    /// Pending move/expedite placement.
    pub move_request: Option<MoveRequest>,
}

/// Target placement recorded by a move or expedite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub resource: Option<ResourceId>,
    pub time: Ticks,
    /// The target lands inside an existing batch on the resource.
    pub into_batch: bool,
}

impl Activity {
    pub fn new(id: ActivityId, operation: OperationId) -> Self {
        Self {
            id,
            operation,
            simultaneous_index: 0,
            quantity: 1.0,
            status: ProductionStatus::NotStarted,
            remaining_run: None,
            locked_resource: None,
            move_request: None,
        }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_simultaneous_index(mut self, index: u32) -> Self {
        self.simultaneous_index = index;
        self
    }

    pub fn locked_to(mut self, resource: ResourceId) -> Self {
        self.locked_resource = Some(resource);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.status == ProductionStatus::Finished
    }

    pub fn is_in_production(&self) -> bool {
        self.status == ProductionStatus::Started
    }

    /// Durations still to be scheduled.
    ///
    /// A started activity has completed its setup; its run is the reported
    /// remainder when present.
    pub fn effective_durations(&self, planned: &StageDurations) -> StageDurations {
        match self.status {
            ProductionStatus::Started => StageDurations {
                setup: 0,
                run: self.remaining_run.unwrap_or(planned.run).max(0),
                ..*planned
            },
            _ => *planned,
        }
    }
}

/// One routing step of an alternate path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub name: String,
    /// 1-based position in the routing; the move dispatcher's activity number.
    pub sequence: u32,
    /// Durations of each activity of this operation.
    pub durations: StageDurations,
    pub requirements: Vec<ResourceRequirement>,
    pub activities: BTreeMap<ActivityId, Activity>,
    /// Material for this operation arrives at this time.
    pub material_available: Option<Ticks>,
    /// Operations with equal codes and equal shapes may share a batch.
    pub batch_code: Option<String>,
}

impl Operation {
    pub fn new(id: OperationId, name: impl Into<String>, sequence: u32) -> Self {
        Self {
            id,
            name: name.into(),
            sequence,
            durations: StageDurations::default(),
            requirements: Vec::new(),
            activities: BTreeMap::new(),
            material_available: None,
            batch_code: None,
        }
    }

    pub fn with_durations(mut self, durations: StageDurations) -> Self {
        self.durations = durations;
        self
    }

    pub fn with_requirement(mut self, requirement: ResourceRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activities.insert(activity.id, activity);
        self
    }

    pub fn with_material_available(mut self, time: Ticks) -> Self {
        self.material_available = Some(time);
        self
    }

    pub fn with_batch_code(mut self, code: impl Into<String>) -> Self {
        self.batch_code = Some(code.into());
        self
    }

    /// The dispatching requirement, if any.
    pub fn primary_requirement(&self) -> Option<&ResourceRequirement> {
        self.requirements.iter().find(|r| r.primary)
    }

    /// Helper (non-primary) requirements.
    pub fn helper_requirements(&self) -> impl Iterator<Item = &ResourceRequirement> {
        self.requirements.iter().filter(|r| !r.primary)
    }

    /// Whether every activity has finished in production.
    pub fn is_finished(&self) -> bool {
        !self.activities.is_empty() && self.activities.values().all(Activity::is_finished)
    }

    /// Structural fingerprint used for batch compatibility.
    pub fn shape(&self) -> RequirementShape {
        RequirementShape {
            batch_code: self.batch_code.clone(),
            durations: self.durations,
            usages: self.requirements.iter().map(|r| (r.primary, r.usage)).collect(),
        }
    }
}

/// Requirement shape of an operation.
///
/// Two activities may share a batch only when their shapes are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementShape {
    pub batch_code: Option<String>,
    pub durations: StageDurations,
    pub usages: Vec<(bool, StageUsage)>,
}
