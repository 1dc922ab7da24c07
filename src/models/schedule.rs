//! Schedule (simulation result) model.
//!
//! A schedule is the set of resource blocks produced by one simulation run,
//! plus the per-resource dispatch order and the activities that could not be
//! placed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::activity::Stage;
use super::ids::{ActivityId, BatchId, BlockId, RequirementId, ResourceId};
use super::time::Ticks;

/// The concrete time assignment of an activity on a resource.
///
/// `[start, end)` is the span the resource is held. Stage boundaries are those
/// of the activity; a helper block may cover only some stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBlock {
    pub id: BlockId,
    pub activity: ActivityId,
    pub resource: ResourceId,
    pub requirement: RequirementId,
    pub primary: bool,
    pub start: Ticks,
    pub end: Ticks,
    /// Activity start (setup begins).
    pub activity_start: Ticks,
    pub setup_end: Ticks,
    pub run_end: Ticks,
    /// Activity end (post-processing finished).
    pub activity_end: Ticks,
    pub batch: Option<BatchId>,
}

impl ResourceBlock {
    #[inline]
    pub fn duration(&self) -> Ticks {
        self.end - self.start
    }

    /// Whether two blocks' spans intersect.
    pub fn overlaps(&self, other: &ResourceBlock) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Span of one stage of the activity.
    pub fn stage_span(&self, stage: Stage) -> (Ticks, Ticks) {
        match stage {
            Stage::Setup => (self.activity_start, self.setup_end),
            Stage::Run => (self.setup_end, self.run_end),
            Stage::PostProcessing => (self.run_end, self.activity_end),
        }
    }
}

/// Why an activity has no block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnscheduledReason {
    /// No eligible, active resource had capacity within the horizon.
    NoCapacity,
    /// The activity's constraints were never all satisfied.
    NeverReady,
    /// The alternate path's validity ended before the activity could start.
    PathValidityEnded,
    /// The run stopped at its horizon first.
    BeyondHorizon,
    /// The job is excluded from scheduling.
    NotScheduled,
}

/// The result of the latest simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub blocks: BTreeMap<BlockId, ResourceBlock>,
    /// Activities in the order each resource started them.
    pub dispatch_order: BTreeMap<ResourceId, Vec<ActivityId>>,
    pub unscheduled: BTreeMap<ActivityId, UnscheduledReason>,
    /// Clock the schedule was computed from.
    pub simulated_from: Ticks,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&mut self, block: ResourceBlock) {
        if block.primary {
            self.dispatch_order
                .entry(block.resource)
                .or_default()
                .push(block.activity);
        }
        self.blocks.insert(block.id, block);
    }

    /// Makespan: latest block end.
    pub fn makespan(&self) -> Ticks {
        self.blocks.values().map(|b| b.end).max().unwrap_or(0)
    }

    /// The primary block of an activity.
    pub fn primary_block(&self, activity: ActivityId) -> Option<&ResourceBlock> {
        self.blocks
            .values()
            .find(|b| b.activity == activity && b.primary)
    }

    /// Index of primary blocks by activity.
    pub fn primary_blocks_by_activity(&self) -> HashMap<ActivityId, &ResourceBlock> {
        self.blocks
            .values()
            .filter(|b| b.primary)
            .map(|b| (b.activity, b))
            .collect()
    }

    /// All blocks of one activity (primary and helpers).
    pub fn blocks_for_activity(&self, activity: ActivityId) -> Vec<&ResourceBlock> {
        self.blocks
            .values()
            .filter(|b| b.activity == activity)
            .collect()
    }

    /// Blocks on a resource, ordered by start.
    pub fn blocks_for_resource(&self, resource: ResourceId) -> Vec<&ResourceBlock> {
        let mut blocks: Vec<&ResourceBlock> = self
            .blocks
            .values()
            .filter(|b| b.resource == resource)
            .collect();
        blocks.sort_by_key(|b| (b.start, b.id));
        blocks
    }

    /// Busy time on a resource divided by `horizon`.
    ///
    /// Blocks of one batch count once. Returns `None` if `horizon` is zero.
    pub fn resource_utilization(&self, resource: ResourceId, horizon: Ticks) -> Option<f64> {
        if horizon <= 0 {
            return None;
        }
        Some(self.busy_time(resource) as f64 / horizon as f64)
    }

    /// Utilization for every resource that has blocks, over the makespan.
    pub fn all_utilizations(&self) -> BTreeMap<ResourceId, f64> {
        let horizon = self.makespan() - self.simulated_from;
        if horizon <= 0 {
            return BTreeMap::new();
        }
        let mut resources: Vec<ResourceId> = self.blocks.values().map(|b| b.resource).collect();
        resources.sort();
        resources.dedup();
        resources
            .into_iter()
            .map(|r| (r, self.busy_time(r) as f64 / horizon as f64))
            .collect()
    }

    fn busy_time(&self, resource: ResourceId) -> Ticks {
        let mut seen_batches = Vec::new();
        let mut busy = 0;
        for b in self.blocks.values().filter(|b| b.resource == resource) {
            if let Some(batch) = b.batch {
                if seen_batches.contains(&batch) {
                    continue;
                }
                seen_batches.push(batch);
            }
            busy += b.duration();
        }
        busy
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_scheduled(&self, activity: ActivityId) -> bool {
        self.primary_block(activity).is_some()
    }
}
