//! Run report and schedule invariant checks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::SimulationMode;
use crate::capacity::CapacityProfile;
use crate::models::{
    ActivityId, BlockId, Resource, ResourceId, Schedule, Stage, Ticks, UnscheduledReason,
};

/// Summary of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub mode: SimulationMode,
    pub clock: Ticks,
    pub events_scheduled: u64,
    pub events_processed: u64,
    pub events_cancelled: u64,
    /// Blocks re-committed inside frozen spans.
    pub frozen_blocks: usize,
    /// Trial day boundary or horizon the run stopped at, if any.
    pub stopped_at: Option<Ticks>,
    pub dispatch_order: BTreeMap<ResourceId, Vec<ActivityId>>,
    pub unscheduled: BTreeMap<ActivityId, UnscheduledReason>,
}

impl SimulationReport {
    pub fn scheduled_count(&self) -> usize {
        self.dispatch_order.values().map(Vec::len).sum()
    }
}

/// A block that breaks a schedule invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockViolation {
    /// A held stage is not covered by compatible capacity, or the block
    /// starts outside a start-permitting interval.
    Capacity(BlockId),
    /// Two blocks overlap on a finite resource outside a shared batch.
    Overlap(BlockId, BlockId),
    /// The block's resource is unknown.
    UnknownResource(BlockId),
}

/// Checks every block against its resource's capacity and occupancy.
///
/// Late-only and overtime intervals count as capacity.
pub fn check_schedule(
    schedule: &Schedule,
    resources: &BTreeMap<ResourceId, Resource>,
) -> Vec<BlockViolation> {
    let mut out = Vec::new();
    let to = schedule.makespan().max(schedule.simulated_from) + 1;
    let profiles: BTreeMap<ResourceId, CapacityProfile> = resources
        .values()
        .map(|r| (r.id, CapacityProfile::build(r, schedule.simulated_from, to)))
        .collect();

    for block in schedule.blocks.values() {
        let Some(profile) = profiles.get(&block.resource) else {
            out.push(BlockViolation::UnknownResource(block.id));
            continue;
        };
        if block.end <= block.start {
            continue;
        }
        let mut first = true;
        for stage in Stage::ALL {
            let (s, e) = block.stage_span(stage);
            if e <= s || s < block.start || e > block.end {
                continue;
            }
            if first && !profile.can_start_at(s, stage.usage(), true) {
                out.push(BlockViolation::Capacity(block.id));
                break;
            }
            first = false;
            if !profile.covers(s, e, stage.usage(), true) {
                out.push(BlockViolation::Capacity(block.id));
                break;
            }
        }
    }

    for resource in resources.values().filter(|r| r.is_finite()) {
        let blocks = schedule.blocks_for_resource(resource.id);
        for (i, a) in blocks.iter().enumerate() {
            for b in &blocks[i + 1..] {
                if b.start >= a.end {
                    break;
                }
                let same_batch = a.batch.is_some() && a.batch == b.batch;
                if a.overlaps(b) && !same_batch {
                    out.push(BlockViolation::Overlap(a.id, b.id));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::CapacityInterval;
    use crate::models::{BatchId, IntervalId, RequirementId, ResourceBlock};

    fn block(id: u64, resource: u64, start: Ticks, end: Ticks) -> ResourceBlock {
        ResourceBlock {
            id: BlockId(id),
            activity: ActivityId(id),
            resource: ResourceId(resource),
            requirement: RequirementId(1),
            primary: true,
            start,
            end,
            activity_start: start,
            setup_end: start,
            run_end: end,
            activity_end: end,
            batch: None,
        }
    }

    fn resources() -> BTreeMap<ResourceId, Resource> {
        let r = Resource::new(ResourceId(1), "M1")
            .with_interval(CapacityInterval::new(IntervalId(1), 0, 1000));
        [(r.id, r)].into_iter().collect()
    }

    #[test]
    fn test_clean_schedule() {
        let mut s = Schedule::new();
        s.add_block(block(1, 1, 0, 400));
        s.add_block(block(2, 1, 400, 900));
        assert!(check_schedule(&s, &resources()).is_empty());
    }

    #[test]
    fn test_capacity_and_overlap_violations() {
        let mut s = Schedule::new();
        s.add_block(block(1, 1, 0, 500));
        s.add_block(block(2, 1, 400, 800));
        s.add_block(block(3, 1, 900, 1200));
        s.add_block(block(4, 9, 0, 10));
        let v = check_schedule(&s, &resources());
        assert!(v.contains(&BlockViolation::Overlap(BlockId(1), BlockId(2))));
        assert!(v.contains(&BlockViolation::Capacity(BlockId(3))));
        assert!(v.contains(&BlockViolation::UnknownResource(BlockId(4))));
    }

    #[test]
    fn test_batch_members_may_overlap() {
        let mut s = Schedule::new();
        let mut a = block(1, 1, 0, 500);
        let mut b = block(2, 1, 0, 500);
        a.batch = Some(BatchId(1));
        b.batch = Some(BatchId(1));
        s.add_block(a);
        s.add_block(b);
        assert!(check_schedule(&s, &resources()).is_empty());
    }
}
