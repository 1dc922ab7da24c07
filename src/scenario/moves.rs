//! Move validation.
//!
//! A move scans the activity and every member of its batch. Each candidate
//! collects zero or more [`MoveProblems`]; candidates with problems stay
//! where they are. When no candidate survives, the whole move fails with
//! [`MoveFailure::ALL_BLOCKS_HAD_PROBLEMS`] and nothing is mutated.

use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::detail::ScenarioDetail;
use super::transmissions::ActivityMoveT;
use crate::models::{
    activity_mut, ActivityId, ActivityRef, JobId, MoveRequest, PlanningIndex, Resource,
    ResourceBlock,
};

bitflags! {
    /// Why one candidate cannot move. Problems accumulate and never abort
    /// the move on their own.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MoveProblems: u16 {
        const NOT_ELIGIBLE = 1 << 0;
        const LOCKED_TO_RESOURCE = 1 << 1;
        const IN_PRODUCTION = 1 << 2;
        const DRAG_AND_DROP_DISALLOWED = 1 << 3;
        const BATCH_INCOMPATIBLE = 1 << 4;
        const EXCEEDS_BATCH_LIMITS = 1 << 5;
        /// The activity is not on its order's current path.
        const ALTERNATE_PATH = 1 << 6;
    }
}

bitflags! {
    /// Why a whole move attempt failed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MoveFailure: u16 {
        const ACTIVITY_NOT_FOUND = 1 << 0;
        const NO_VALID_ACTIVITIES = 1 << 1;
        const RESOURCE_NOT_FOUND = 1 << 2;
        const RESOURCE_INACTIVE = 1 << 3;
        const ALL_BLOCKS_HAD_PROBLEMS = 1 << 4;
        /// The move was applied but left work unscheduled; undo to revert.
        const JOBS_FAILED_TO_SCHEDULE = 1 << 5;
    }
}

/// Result of a move attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub problems: BTreeMap<ActivityId, MoveProblems>,
    pub failure: MoveFailure,
    /// Activities whose move was applied.
    pub moved: Vec<ActivityId>,
}

impl MoveOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_empty()
    }

    fn failed(failure: MoveFailure) -> Self {
        Self {
            failure,
            ..Self::default()
        }
    }
}

/// Existing batch the move lands in.
struct BatchHost {
    shape: crate::models::RequirementShape,
    volume: f64,
    members: usize,
}

/// Scans candidates; returns the outcome and the activities that may move.
pub(crate) fn plan(detail: &ScenarioDetail, request: &ActivityMoveT) -> (MoveOutcome, Vec<ActivityId>) {
    let index = detail.index();
    if resolve(detail, &index, request.activity).is_none() {
        return (MoveOutcome::failed(MoveFailure::ACTIVITY_NOT_FOUND), Vec::new());
    }
    let target = match detail.resources.get(&request.resource) {
        None => return (MoveOutcome::failed(MoveFailure::RESOURCE_NOT_FOUND), Vec::new()),
        Some(r) if !r.active => {
            return (MoveOutcome::failed(MoveFailure::RESOURCE_INACTIVE), Vec::new())
        }
        Some(r) => r,
    };

    let candidates: Vec<ActivityRef<'_>> = batch_members(detail, request.activity)
        .into_iter()
        .filter_map(|a| resolve(detail, &index, a))
        .filter(|a| !a.activity.is_finished())
        .collect();
    if candidates.is_empty() {
        return (MoveOutcome::failed(MoveFailure::NO_VALID_ACTIVITIES), Vec::new());
    }

    let member_ids: BTreeSet<ActivityId> = candidates.iter().map(|c| c.activity.id).collect();
    let mut host = request
        .into_batch
        .then(|| batch_host(detail, &index, target, request, &member_ids))
        .flatten();

    let mut outcome = MoveOutcome::default();
    let mut accepted = Vec::new();
    for candidate in &candidates {
        let problems = problems_of(detail, candidate, target, request, host.as_ref());
        if problems.is_empty() {
            if let Some(h) = host.as_mut() {
                h.volume += candidate.activity.quantity;
                h.members += 1;
            }
            accepted.push(candidate.activity.id);
        } else {
            debug!(activity = %candidate.activity.id, ?problems, "move candidate excluded");
            outcome.problems.insert(candidate.activity.id, problems);
        }
    }
    if accepted.is_empty() {
        outcome.failure = MoveFailure::ALL_BLOCKS_HAD_PROBLEMS;
    }
    (outcome, accepted)
}

/// Records the move request on every accepted activity.
pub(crate) fn commit(detail: &mut ScenarioDetail, request: &ActivityMoveT, accepted: &[ActivityId]) {
    let index = detail.index();
    for &id in accepted {
        let Some(act) = index.activity(id).and_then(|loc| activity_mut(&mut detail.jobs, loc, id))
        else {
            continue;
        };
        act.move_request = Some(MoveRequest {
            resource: Some(request.resource),
            time: request.time,
            into_batch: request.into_batch,
        });
        if request.lock_to_resource {
            act.locked_resource = Some(request.resource);
        }
    }
}

/// Flags jobs of moved activities that now have unscheduled work.
pub(crate) fn check_scheduled(detail: &ScenarioDetail, outcome: &mut MoveOutcome) {
    let index = detail.index();
    let job_of = |a: ActivityId| index.activity(a).map(|loc| loc.job);
    let moved_jobs: BTreeSet<JobId> = outcome.moved.iter().filter_map(|&a| job_of(a)).collect();
    let failed = detail
        .schedule
        .unscheduled
        .keys()
        .filter_map(|&a| job_of(a))
        .any(|j| moved_jobs.contains(&j));
    if failed {
        outcome.failure |= MoveFailure::JOBS_FAILED_TO_SCHEDULE;
    }
}

fn resolve<'d>(
    detail: &'d ScenarioDetail,
    index: &PlanningIndex,
    id: ActivityId,
) -> Option<ActivityRef<'d>> {
    ActivityRef::resolve(&detail.jobs, index.activity(id)?, id)
}

/// The activity and, when it is batched, every other member of its batch.
fn batch_members(detail: &ScenarioDetail, activity: ActivityId) -> Vec<ActivityId> {
    let Some(batch) = detail.schedule.primary_block(activity).and_then(|b| b.batch) else {
        return vec![activity];
    };
    let members: BTreeSet<ActivityId> = detail
        .schedule
        .blocks
        .values()
        .filter(|b| b.primary && b.batch == Some(batch))
        .map(|b| b.activity)
        .chain([activity])
        .collect();
    members.into_iter().collect()
}

fn batch_host(
    detail: &ScenarioDetail,
    index: &PlanningIndex,
    target: &Resource,
    request: &ActivityMoveT,
    moving: &BTreeSet<ActivityId>,
) -> Option<BatchHost> {
    let at = |b: &&ResourceBlock| b.start <= request.time && request.time < b.end;
    let blocks = detail.schedule.blocks_for_resource(target.id);
    let host = blocks
        .iter()
        .copied()
        .filter(|b| b.primary && !moving.contains(&b.activity))
        .find(at)?;
    let members: Vec<&ResourceBlock> = match host.batch {
        Some(batch) => blocks
            .iter()
            .copied()
            .filter(|b| b.primary && b.batch == Some(batch) && !moving.contains(&b.activity))
            .collect(),
        None => vec![host],
    };
    let host_ref = resolve(detail, index, host.activity)?;
    let volume = members
        .iter()
        .filter_map(|b| resolve(detail, index, b.activity))
        .map(|a| a.activity.quantity)
        .sum();
    Some(BatchHost {
        shape: host_ref.operation.shape(),
        volume,
        members: members.len(),
    })
}

fn problems_of(
    detail: &ScenarioDetail,
    candidate: &ActivityRef<'_>,
    target: &Resource,
    request: &ActivityMoveT,
    host: Option<&BatchHost>,
) -> MoveProblems {
    let mut problems = MoveProblems::empty();
    let act = candidate.activity;

    if !candidate
        .operation
        .primary_requirement()
        .is_some_and(|p| p.is_eligible(target.id))
    {
        problems |= MoveProblems::NOT_ELIGIBLE;
    }
    if act.locked_resource.is_some_and(|r| r != target.id) {
        problems |= MoveProblems::LOCKED_TO_RESOURCE;
    }
    if act.is_in_production() {
        problems |= MoveProblems::IN_PRODUCTION;
    }
    let source = detail
        .schedule
        .primary_block(act.id)
        .and_then(|b| detail.resources.get(&b.resource));
    if !target.allow_drag_and_drop || source.is_some_and(|r| !r.allow_drag_and_drop) {
        problems |= MoveProblems::DRAG_AND_DROP_DISALLOWED;
    }
    if !candidate.on_current_path() {
        problems |= MoveProblems::ALTERNATE_PATH;
    }
    if request.into_batch {
        match (target.batch, host) {
            (None, _) => problems |= MoveProblems::BATCH_INCOMPATIBLE,
            (Some(_), None) => {}
            (Some(settings), Some(host)) => {
                if candidate.operation.shape() != host.shape {
                    problems |= MoveProblems::BATCH_INCOMPATIBLE;
                }
                let cycles = settings.max_cycle_count.max(1) as usize;
                if host.volume + act.quantity > settings.max_volume + f64::EPSILON
                    || host.members + 1 > cycles
                {
                    problems |= MoveProblems::EXCEEDS_BATCH_LIMITS;
                }
            }
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::time::hours;
    use crate::models::{BatchSettings, ProductionStatus, ResourceId};
    use crate::scenario::detail::tests::{detail, job, machine, op};
    use crate::simulation::{NoHooks, SimulationMode};

    fn request(activity: u64, resource: u64) -> ActivityMoveT {
        ActivityMoveT::new(ActivityId(activity), ResourceId(resource), hours(4))
    }

    fn simulated(mut d: ScenarioDetail) -> ScenarioDetail {
        d.simulate(SimulationMode::Optimize, &NoHooks).unwrap();
        d
    }

    fn set_activity(d: &mut ScenarioDetail, id: u64, f: impl FnOnce(&mut crate::models::Activity)) {
        let loc = d.index().activity(ActivityId(id)).unwrap();
        f(activity_mut(&mut d.jobs, loc, ActivityId(id)).unwrap());
    }

    #[test]
    fn test_clean_move_accepted() {
        let d = simulated(detail());
        let (outcome, accepted) = plan(&d, &request(12, 2));
        assert!(outcome.is_success());
        assert!(outcome.problems.is_empty());
        assert_eq!(accepted, vec![ActivityId(12)]);
    }

    #[test]
    fn test_lookup_failures() {
        let d = simulated(detail());
        assert_eq!(plan(&d, &request(99, 1)).0.failure, MoveFailure::ACTIVITY_NOT_FOUND);
        assert_eq!(plan(&d, &request(12, 9)).0.failure, MoveFailure::RESOURCE_NOT_FOUND);

        let mut d = d;
        d.resources.insert(ResourceId(2), machine(2).inactive());
        assert_eq!(plan(&d, &request(12, 2)).0.failure, MoveFailure::RESOURCE_INACTIVE);

        set_activity(&mut d, 11, |a| a.status = ProductionStatus::Finished);
        assert_eq!(plan(&d, &request(11, 1)).0.failure, MoveFailure::NO_VALID_ACTIVITIES);
    }

    #[test]
    fn test_every_candidate_with_problems_fails_whole_move() {
        let mut d = simulated(detail());
        set_activity(&mut d, 11, |a| {
            a.status = ProductionStatus::Started;
            a.locked_resource = Some(ResourceId(1));
        });
        // Op 11 is only eligible on M1.
        let (outcome, accepted) = plan(&d, &request(11, 2));
        assert!(accepted.is_empty());
        assert_eq!(outcome.failure, MoveFailure::ALL_BLOCKS_HAD_PROBLEMS);
        assert_eq!(
            outcome.problems[&ActivityId(11)],
            MoveProblems::NOT_ELIGIBLE
                | MoveProblems::LOCKED_TO_RESOURCE
                | MoveProblems::IN_PRODUCTION
        );
    }

    #[test]
    fn test_drag_and_drop_disallowed() {
        let mut d = simulated(detail());
        d.resources
            .insert(ResourceId(2), machine(2).with_drag_and_drop(false));
        let (outcome, _) = plan(&d, &request(12, 2));
        assert_eq!(
            outcome.problems[&ActivityId(12)],
            MoveProblems::DRAG_AND_DROP_DISALLOWED
        );
    }

    #[test]
    fn test_into_batch_on_plain_resource() {
        let d = simulated(detail());
        let mut r = request(12, 2);
        r.into_batch = true;
        let (outcome, _) = plan(&d, &r);
        assert_eq!(outcome.problems[&ActivityId(12)], MoveProblems::BATCH_INCOMPATIBLE);
    }

    #[test]
    fn test_batch_limits_and_shape() {
        let oven = machine(3).with_batch(BatchSettings::new(2.0, 2));
        let d = ScenarioDetail::new(0)
            .with_resource(oven)
            .with_job(job(1, vec![op(11, 1, hours(2), &[3]).with_batch_code("bake")]))
            .with_job(job(2, vec![op(21, 1, hours(2), &[3]).with_batch_code("bake")]))
            .with_job(job(3, vec![op(31, 1, hours(2), &[3]).with_batch_code("dry")]));
        let d = simulated(d);

        // Jobs 1 and 2 batch together at 0; job 3 runs after.
        let host = d.schedule.primary_block(ActivityId(11)).unwrap().clone();
        assert_eq!(host.batch, d.schedule.primary_block(ActivityId(21)).unwrap().batch);

        let mut into = ActivityMoveT::new(ActivityId(31), ResourceId(3), host.start);
        into.into_batch = true;
        let (outcome, accepted) = plan(&d, &into);
        assert!(accepted.is_empty());
        assert_eq!(
            outcome.problems[&ActivityId(31)],
            MoveProblems::BATCH_INCOMPATIBLE | MoveProblems::EXCEEDS_BATCH_LIMITS
        );

        // Moving a batched activity drags its batch mates along.
        let (outcome, accepted) = plan(&d, &ActivityMoveT::new(ActivityId(11), ResourceId(3), hours(6)));
        assert!(outcome.is_success());
        assert_eq!(accepted, vec![ActivityId(11), ActivityId(21)]);
    }

    #[test]
    fn test_commit_records_request_and_lock() {
        let mut d = simulated(detail());
        let mut r = request(12, 2);
        r.lock_to_resource = true;
        commit(&mut d, &r, &[ActivityId(12)]);
        let act = d.activity(ActivityId(12)).unwrap().activity.clone();
        assert_eq!(act.locked_resource, Some(ResourceId(2)));
        assert_eq!(
            act.move_request,
            Some(MoveRequest {
                resource: Some(ResourceId(2)),
                time: hours(4),
                into_batch: false
            })
        );
    }

    #[test]
    fn test_check_scheduled_flags_jobs() {
        let mut d = simulated(detail());
        let mut outcome = MoveOutcome {
            moved: vec![ActivityId(12)],
            ..MoveOutcome::default()
        };
        check_scheduled(&d, &mut outcome);
        assert!(outcome.is_success());

        d.schedule
            .unscheduled
            .insert(ActivityId(11), crate::models::UnscheduledReason::NoCapacity);
        check_scheduled(&d, &mut outcome);
        assert_eq!(outcome.failure, MoveFailure::JOBS_FAILED_TO_SCHEDULE);
    }
}
