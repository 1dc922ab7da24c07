//! Discrete-event simulation loop.
//!
//! # Algorithm
//!
//! 1. Build per-run state: compact resource indices, capacity profiles over
//!    `[clock, clock + horizon)`, one dispatcher per resource and the
//!    readiness counters of every order and operation on a current path.
//! 2. Re-commit blocks of the previous schedule that start inside a
//!    resource's frozen span.
//! 3. Seed release, hold, validity, material and move events; queue
//!    in-production activities at the clock.
//! 4. Drain the event queue. Handlers only update readiness and enqueue
//!    activities; once every event of a timestamp is handled, each resource
//!    dispatches in compact index order (in-production pass, move pass, then
//!    everything).
//! 5. Classify every activity left without a block.
//!
//! Dispatch is non-delay: a candidate that cannot start now registers a
//! `ResourceAvailable` retry at its earliest feasible start.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;

use tracing::{debug, debug_span, trace};

use super::batching::{BatchBuilder, BatchCandidate};
use super::hooks::{ChangeableValues, NoHooks, SimulationHooks, SimulationStage, StageView};
use super::report::SimulationReport;
use super::state::{ActState, MoState, OpState, ResourceTimeline};
use super::SimulationMode;
use crate::capacity::{AllowedHelperMatrix, CapacityProfile, HeldSpan};
use crate::config::SimulationConfig;
use crate::dispatching::{
    DispatchFlags, DispatchTier, MoveKeyStrategy, ReadyActivitiesDispatcher, ReadyActivity,
    SequencingRule, SortedListDispatcher,
};
use crate::error::SimulationError;
use crate::events::{Event, EventKind, EventQueue, Flow, Step};
use crate::models::{
    predecessor_release_time, ActivityId, ActivityRef, AlternatePath, Association, BatchId,
    BlockId, Job, JobId, MoId, Operation, OperationId, PathId, PlanningIndex, RequirementId,
    Resource, ResourceBlock, ResourceId, ResourceRequirement, Schedule, StageBoundaries,
    StageDurations, Ticks, UnscheduledReason,
};
use crate::models::time::days;

static NO_HOOKS: NoHooks = NoHooks;

/// Result of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub schedule: Schedule,
    pub report: SimulationReport,
    /// Values returned by the end-of-simulation hook.
    pub end_values: Option<ChangeableValues>,
}

/// Configures and runs one simulation over a borrowed planning graph.
///
/// The graph is never mutated; the run produces a fresh [`Schedule`].
#[derive(Debug)]
pub struct Simulator<'a> {
    jobs: &'a BTreeMap<JobId, Job>,
    resources: &'a BTreeMap<ResourceId, Resource>,
    clock: Ticks,
    previous: Option<&'a Schedule>,
    options: SimulationConfig,
    mode: SimulationMode,
    hooks: &'a dyn SimulationHooks,
}

impl<'a> Simulator<'a> {
    pub fn new(
        jobs: &'a BTreeMap<JobId, Job>,
        resources: &'a BTreeMap<ResourceId, Resource>,
        clock: Ticks,
    ) -> Self {
        Self {
            jobs,
            resources,
            clock,
            previous: None,
            options: SimulationConfig::default(),
            mode: SimulationMode::Optimize,
            hooks: &NO_HOOKS,
        }
    }

    /// Schedule the run starts from; drives frozen spans, in-production
    /// placement and original starts.
    pub fn with_previous(mut self, schedule: &'a Schedule) -> Self {
        self.previous = Some(schedule);
        self
    }

    pub fn with_options(mut self, options: SimulationConfig) -> Self {
        self.options = options;
        self
    }

    pub fn with_mode(mut self, mode: SimulationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_hooks(mut self, hooks: &'a dyn SimulationHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Runs the simulation to completion, its horizon, or a trial stop.
    pub fn run(self) -> Result<SimulationOutcome, SimulationError> {
        let span = debug_span!("simulation", clock = self.clock, mode = ?self.mode);
        let _guard = span.enter();

        let empty = Schedule::new();
        let previous = self.previous.unwrap_or(&empty);
        let horizon_end = self.clock.saturating_add(self.options.horizon());
        let mut run = Run::new(
            self.jobs,
            self.resources,
            previous,
            self.clock,
            self.mode,
            self.options.sequencing_rule,
            horizon_end,
        );
        let mut queue = EventQueue::new(self.clock);

        if let Some(values) = self.hooks.pre_simulation(run.view())? {
            run.apply(values);
        }
        run.freeze(&mut queue)?;
        if let Some(values) = self
            .hooks
            .post_simulation_stage(SimulationStage::Frozen, run.view())?
        {
            run.apply(values);
        }

        run.seed(&mut queue, self.options.trial_days)?;
        run.dispatch_started = true;
        queue.run_until_empty(Some(horizon_end), |q, step| run.step(q, step))?;
        if run.stopped_at.is_none() && !queue.is_empty() {
            run.stopped_at = Some(horizon_end);
        }

        if let Some(values) = self
            .hooks
            .post_simulation_stage(SimulationStage::Dispatch, run.view())?
        {
            run.apply(values);
        }
        run.classify_unscheduled();
        let end_values = self.hooks.end_of_simulation(run.view())?;

        let stats = queue.stats();
        let report = SimulationReport {
            mode: self.mode,
            clock: self.clock,
            events_scheduled: stats.scheduled,
            events_processed: stats.processed,
            events_cancelled: stats.cancelled,
            frozen_blocks: run.frozen_blocks,
            stopped_at: run.stopped_at,
            dispatch_order: run.schedule.dispatch_order.clone(),
            unscheduled: run.schedule.unscheduled.clone(),
        };
        debug!(
            blocks = run.schedule.block_count(),
            unscheduled = report.unscheduled.len(),
            processed = report.events_processed,
            "simulation finished"
        );
        Ok(SimulationOutcome {
            schedule: run.schedule,
            report,
            end_values,
        })
    }
}

fn dangling(what: &str, id: impl Display) -> SimulationError {
    SimulationError::DanglingReference(format!("{what} {id}"))
}

fn new_dispatcher(mode: SimulationMode, rule: SequencingRule) -> Box<dyn ReadyActivitiesDispatcher> {
    match mode {
        SimulationMode::Optimize => rule.dispatcher(),
        SimulationMode::TimeAdjustment => Box::new(SortedListDispatcher::new(MoveKeyStrategy)),
    }
}

enum Attempt {
    Started,
    Later(Ticks),
    Never,
}

enum FreezeAttempt {
    Committed,
    /// A gate or predecessor is not yet satisfied; may succeed later.
    Blocked,
    Rejected,
}

enum HelperPick<'r> {
    Found(Vec<(&'r ResourceRequirement, usize)>),
    Later(Ticks),
    Never,
}

/// Mutable state of one run.
struct Run<'r> {
    jobs: &'r BTreeMap<JobId, Job>,
    previous: &'r Schedule,
    clock: Ticks,
    mode: SimulationMode,
    horizon_end: Ticks,
    index: PlanningIndex,
    helpers: AllowedHelperMatrix,
    resource_list: Vec<&'r Resource>,
    profiles: Vec<CapacityProfile>,
    timelines: Vec<ResourceTimeline>,
    dispatchers: Vec<Box<dyn ReadyActivitiesDispatcher>>,
    mos: HashMap<MoId, MoState>,
    ops: HashMap<OperationId, OpState>,
    acts: HashMap<ActivityId, ActState>,
    original_starts: HashMap<ActivityId, Ticks>,
    previous_resource: HashMap<ActivityId, ResourceId>,
    priorities: HashMap<JobId, i32>,
    retries: HashSet<(usize, Ticks)>,
    schedule: Schedule,
    next_block: u64,
    next_batch: u64,
    frozen_blocks: usize,
    stopped_at: Option<Ticks>,
    trial_stopped: bool,
    dispatch_started: bool,
}

impl<'r> Run<'r> {
    fn new(
        jobs: &'r BTreeMap<JobId, Job>,
        resources: &'r BTreeMap<ResourceId, Resource>,
        previous: &'r Schedule,
        clock: Ticks,
        mode: SimulationMode,
        rule: SequencingRule,
        horizon_end: Ticks,
    ) -> Self {
        let resource_list: Vec<&Resource> = resources.values().collect();
        let profiles = resource_list
            .iter()
            .map(|r| CapacityProfile::build(r, clock, horizon_end))
            .collect();
        let n = resource_list.len();

        let mut original_starts = HashMap::new();
        let mut previous_resource = HashMap::new();
        for (activity, block) in previous.primary_blocks_by_activity() {
            original_starts.insert(activity, block.activity_start);
            previous_resource.insert(activity, block.resource);
        }

        let mut run = Self {
            jobs,
            previous,
            clock,
            mode,
            horizon_end,
            index: PlanningIndex::build(jobs),
            helpers: AllowedHelperMatrix::build(resources),
            resource_list,
            profiles,
            timelines: vec![ResourceTimeline::default(); n],
            dispatchers: (0..n).map(|_| new_dispatcher(mode, rule)).collect(),
            mos: HashMap::new(),
            ops: HashMap::new(),
            acts: HashMap::new(),
            original_starts,
            previous_resource,
            priorities: HashMap::new(),
            retries: HashSet::new(),
            schedule: Schedule {
                simulated_from: clock,
                ..Schedule::default()
            },
            next_block: 0,
            next_batch: 0,
            frozen_blocks: 0,
            stopped_at: None,
            trial_stopped: false,
            dispatch_started: false,
        };
        run.build_states();
        run
    }

    fn build_states(&mut self) {
        let jobs = self.jobs;
        for job in jobs.values() {
            for mo in job.orders.values() {
                let Some(path) = mo.current() else { continue };
                let done = |op: &Operation| op.activities.values().all(|a| a.is_finished());
                let mut mo_state = MoState {
                    completion: self.clock,
                    ..MoState::default()
                };
                for op in path.operations.values() {
                    let complete = done(op);
                    let pending = path
                        .associations
                        .iter()
                        .filter(|a| a.successor == op.id)
                        .filter(|a| path.operations.get(&a.predecessor).is_some_and(|p| !done(p)))
                        .count();
                    self.ops.insert(
                        op.id,
                        OpState {
                            mo: Some(mo.id),
                            pending_predecessors: pending,
                            material_pending: op.material_available.is_some_and(|t| t > self.clock),
                            complete,
                            open_activities: op.activities.values().filter(|a| !a.is_finished()).count(),
                            ..OpState::default()
                        },
                    );
                    if !complete {
                        mo_state.open_operations += 1;
                    }
                    for act in op.activities.keys() {
                        self.acts.insert(*act, ActState::default());
                    }
                }
                mo_state.complete = mo_state.open_operations == 0;
                self.mos.insert(mo.id, mo_state);
            }
        }
    }

    fn view(&self) -> StageView<'_> {
        StageView {
            clock: self.clock,
            mode: self.mode,
            schedule: &self.schedule,
        }
    }

    fn apply(&mut self, values: ChangeableValues) {
        self.priorities.extend(values.priority_overrides);
        if let Some(rule) = values.sequencing_rule {
            if self.mode == SimulationMode::Optimize && !self.dispatch_started {
                debug!(?rule, "sequencing rule overridden");
                for d in &mut self.dispatchers {
                    *d = rule.dispatcher();
                }
            }
        }
    }

    // ---- lookups ----

    fn locate_act(&self, id: ActivityId) -> Result<ActivityRef<'r>, SimulationError> {
        let jobs = self.jobs;
        let loc = self.index.activity(id).ok_or_else(|| dangling("activity", id))?;
        ActivityRef::resolve(jobs, loc, id).ok_or_else(|| dangling("activity", id))
    }

    fn locate_op(
        &self,
        id: OperationId,
    ) -> Result<(MoId, &'r AlternatePath, &'r Operation), SimulationError> {
        let jobs = self.jobs;
        let loc = self.index.operation(id).ok_or_else(|| dangling("operation", id))?;
        let path = jobs
            .get(&loc.job)
            .and_then(|j| j.orders.get(&loc.mo))
            .and_then(|m| m.paths.get(&loc.path))
            .ok_or_else(|| dangling("operation", id))?;
        let op = path.operations.get(&id).ok_or_else(|| dangling("operation", id))?;
        Ok((loc.mo, path, op))
    }

    fn current_path(&self, mo: MoId) -> Option<&'r AlternatePath> {
        let jobs = self.jobs;
        let job = self.index.job_of_order(mo)?;
        jobs.get(&job)?.orders.get(&mo)?.current()
    }

    fn association(
        &self,
        predecessor: OperationId,
        successor: OperationId,
    ) -> Result<&'r Association, SimulationError> {
        let (_, path, _) = self.locate_op(successor)?;
        path.associations
            .iter()
            .find(|a| a.predecessor == predecessor && a.successor == successor)
            .ok_or_else(|| dangling("association into", successor))
    }

    fn resource_index(&self, id: ResourceId) -> Option<usize> {
        self.helpers.index().index_of(id)
    }

    fn priority_of(&self, job: &Job) -> i32 {
        self.priorities.get(&job.id).copied().unwrap_or(job.priority)
    }

    fn tier_of(aref: &ActivityRef<'_>) -> DispatchTier {
        if aref.activity.is_in_production() {
            DispatchTier::InProduction
        } else if let Some(request) = aref.activity.move_request {
            if request.into_batch {
                DispatchTier::MoveIntoBatch
            } else {
                DispatchTier::MoveActivity
            }
        } else if aref.job.expedite_at.is_some() {
            DispatchTier::MoveActivity
        } else {
            DispatchTier::SequencedActivity
        }
    }

    // ---- setup ----

    fn seed(&mut self, q: &mut EventQueue, trial_days: Option<i64>) -> Result<(), SimulationError> {
        let jobs = self.jobs;
        let clock = self.clock;
        let mut gates: Vec<(MoId, usize)> = Vec::new();

        for job in jobs.values().filter(|j| !j.do_not_schedule) {
            for mo in job.orders.values() {
                let Some(path) = mo.current() else { continue };
                if self.mos.get(&mo.id).map_or(true, |s| s.complete) {
                    continue;
                }
                let mut count = 0;
                match job.expedite_at {
                    Some(at) => {
                        q.seed(at, EventKind::MoveTicks { mo: mo.id });
                        count += 1;
                    }
                    None => {
                        q.seed(mo.release_date, EventKind::ManufacturingOrderReleased { mo: mo.id });
                        count += 1;
                        if let Some(hold) = job.hold_until.into_iter().chain(mo.hold_until).max() {
                            q.seed(hold, EventKind::HoldReleased { job: job.id, mo: mo.id });
                            count += 1;
                        }
                    }
                }
                if let Some(start) = path.validity_start {
                    q.seed(start, EventKind::AlternatePathRelease { mo: mo.id, path: path.id });
                    count += 1;
                }
                if let Some(end) = path.validity_end {
                    q.seed(end, EventKind::AlternatePathValidityEnd { mo: mo.id, path: path.id });
                }
                for pred in &mo.predecessor_orders {
                    if let Some(state) = self.mos.get_mut(pred).filter(|s| !s.complete) {
                        state.successors.push(mo.id);
                        count += 1;
                    }
                }
                gates.push((mo.id, count));

                for op in path.operations.values() {
                    if let Some(at) = op.material_available.filter(|&t| t > clock) {
                        q.seed(at, EventKind::MaterialAvailable { operation: op.id });
                    }
                    for act in op.activities.values() {
                        if act.is_finished() || act.is_in_production() {
                            continue;
                        }
                        let Some(request) = act.move_request else { continue };
                        if let Some(state) = self.acts.get_mut(&act.id) {
                            state.move_held = true;
                        }
                        q.seed(request.time, EventKind::Move { activity: act.id });
                        if let Some(resource) = request.resource {
                            q.seed(clock, EventKind::PreventMoveIntersection { activity: act.id, resource });
                        }
                    }
                }
            }
        }
        for (mo, count) in gates {
            if let Some(state) = self.mos.get_mut(&mo) {
                state.gates = count;
            }
        }

        // Started work continues at the clock, ahead of its predecessors.
        for job in jobs.values().filter(|j| !j.do_not_schedule) {
            for mo in job.orders.values() {
                let Some(path) = mo.current() else { continue };
                for op in path.operations.values() {
                    for act in op.activities.values().filter(|a| a.is_in_production()) {
                        if self.acts.get(&act.id).map_or(true, |s| s.scheduled) {
                            continue;
                        }
                        let preferred = self.previous_resource.get(&act.id).copied();
                        let queued = self.enqueue(act.id, clock, Some(DispatchTier::InProduction), preferred)?;
                        for idx in queued {
                            let resource = self.resource_list[idx].id;
                            q.seed(clock, EventKind::ResourceAvailable { resource });
                        }
                    }
                }
            }
        }

        if let Some(n) = trial_days {
            q.seed(clock.saturating_add(days(n)), EventKind::TrialEvent { day: n });
        }
        debug!(events = q.len(), "simulation seeded");
        Ok(())
    }

    /// Re-commits previous blocks starting inside each frozen span.
    ///
    /// Groups are tried in start order across all resources and retried
    /// until no further group can be placed, so a frozen successor is only
    /// kept once its predecessors are complete or frozen ahead of it.
    fn freeze(&mut self, q: &mut EventQueue) -> Result<(), SimulationError> {
        let mut pending: Vec<(Ticks, usize, Vec<ActivityId>)> = Vec::new();
        for idx in 0..self.resource_list.len() {
            let resource = self.resource_list[idx];
            if resource.frozen_span <= 0 || !resource.active {
                continue;
            }
            let limit = self.clock.saturating_add(resource.frozen_span);
            let mut slots: HashMap<BatchId, usize> = HashMap::new();
            for block in self.previous.blocks_for_resource(resource.id) {
                if !block.primary || block.activity_start < self.clock || block.activity_start >= limit {
                    continue;
                }
                match block.batch.and_then(|b| slots.get(&b).copied()) {
                    Some(slot) => pending[slot].2.push(block.activity),
                    None => {
                        if let Some(b) = block.batch {
                            slots.insert(b, pending.len());
                        }
                        pending.push((block.activity_start, idx, vec![block.activity]));
                    }
                }
            }
        }
        pending.sort_by_key(|(start, idx, _)| (*start, *idx));

        loop {
            let mut placed = false;
            let mut blocked = Vec::new();
            for (start, idx, members) in pending {
                match self.freeze_group(q, idx, start, &members)? {
                    FreezeAttempt::Committed => placed = true,
                    FreezeAttempt::Blocked => blocked.push((start, idx, members)),
                    FreezeAttempt::Rejected => {}
                }
            }
            pending = blocked;
            if !placed || pending.is_empty() {
                break;
            }
        }
        if !pending.is_empty() {
            debug!(groups = pending.len(), "frozen blocks left to dispatch");
        }
        if self.frozen_blocks > 0 {
            debug!(blocks = self.frozen_blocks, "frozen span re-committed");
        }
        Ok(())
    }

    fn freeze_group(
        &mut self,
        q: &mut EventQueue,
        idx: usize,
        start: Ticks,
        members: &[ActivityId],
    ) -> Result<FreezeAttempt, SimulationError> {
        let resource = self.resource_list[idx];
        let eligible: Vec<ActivityId> = members
            .iter()
            .copied()
            .filter(|a| self.frozen_eligible(*a, resource.id))
            .collect();
        if eligible.is_empty() {
            return Ok(FreezeAttempt::Rejected);
        }
        let members: Vec<ActivityId> = eligible
            .into_iter()
            .filter(|a| self.released_for_freeze(*a, start))
            .collect();
        let Some(&leader) = members.first() else {
            return Ok(FreezeAttempt::Blocked);
        };
        let aref = self.locate_act(leader)?;
        let Some(primary) = aref.operation.primary_requirement() else {
            return Ok(FreezeAttempt::Rejected);
        };
        let durations = aref.activity.effective_durations(&aref.operation.durations);
        let members: Vec<ActivityId> = members
            .into_iter()
            .filter(|m| {
                self.locate_act(*m).is_ok_and(|o| {
                    o.activity.effective_durations(&o.operation.durations) == durations
                })
            })
            .collect();
        let Some(held) = HeldSpan::of(&durations, primary.usage) else {
            return Ok(FreezeAttempt::Rejected);
        };
        if !self.profiles[idx].fits(start, &durations, primary.usage, true) {
            return Ok(FreezeAttempt::Rejected);
        }
        if resource.is_finite()
            && !self.timelines[idx].is_free(leader, start + held.start_offset, start + held.end_offset)
        {
            return Ok(FreezeAttempt::Rejected);
        }
        let helpers = match self.pick_helpers(idx, aref.operation, &durations, start, leader, true) {
            HelperPick::Found(h) => h,
            _ => return Ok(FreezeAttempt::Rejected),
        };
        self.commit(q, idx, &members, &helpers, start, &durations)?;
        self.frozen_blocks += members.len();
        Ok(FreezeAttempt::Committed)
    }

    /// Whether every gate and predecessor of the activity allows a start at
    /// `start`, counting only work finished or already frozen in this run.
    fn released_for_freeze(&self, activity: ActivityId, start: Ticks) -> bool {
        let Ok(aref) = self.locate_act(activity) else {
            return false;
        };
        let (job, mo, path, operation) = (aref.job, aref.mo, aref.path, aref.operation);
        let hold = job.hold_until.into_iter().chain(mo.hold_until).max();
        if mo.release_date > start
            || hold.is_some_and(|h| h > start)
            || path.validity_start.is_some_and(|v| v > start)
            || path.validity_end.is_some_and(|v| v <= start)
            || operation.material_available.is_some_and(|m| m > start)
        {
            return false;
        }
        let orders_done = mo
            .predecessor_orders
            .iter()
            .all(|p| self.mos.get(p).map_or(true, |s| s.complete));
        if !orders_done {
            return false;
        }
        path.associations
            .iter()
            .filter(|a| a.successor == operation.id)
            .all(|assoc| self.predecessor_frozen_by(path, assoc, start))
    }

    fn predecessor_frozen_by(&self, path: &AlternatePath, assoc: &Association, start: Ticks) -> bool {
        let Some(pred) = path.operations.get(&assoc.predecessor) else {
            return true;
        };
        let Some(state) = self.ops.get(&pred.id) else {
            return false;
        };
        if state.complete {
            return true;
        }
        let all_placed = pred
            .activities
            .values()
            .all(|a| a.is_finished() || self.acts.get(&a.id).is_some_and(|s| s.scheduled));
        let Some(boundaries) = state.boundaries.filter(|_| all_placed) else {
            return false;
        };
        let mpp = pred.durations.material_post_processing.max(0);
        predecessor_release_time(boundaries, mpp, assoc).saturating_add(assoc.transfer_span.max(0)) <= start
    }

    fn frozen_eligible(&self, activity: ActivityId, resource: ResourceId) -> bool {
        let Ok(aref) = self.locate_act(activity) else {
            return false;
        };
        aref.on_current_path()
            && !aref.activity.is_finished()
            && !aref.job.do_not_schedule
            && aref.job.expedite_at.is_none()
            && aref.activity.move_request.is_none()
            && aref.activity.locked_resource.map_or(true, |l| l == resource)
            && self.acts.get(&activity).is_some_and(|s| !s.scheduled)
            && aref
                .operation
                .primary_requirement()
                .is_some_and(|p| p.is_eligible(resource) || aref.activity.locked_resource == Some(resource))
    }

    // ---- event handling ----

    fn step(&mut self, q: &mut EventQueue, step: Step) -> Result<Flow, SimulationError> {
        match step {
            Step::Event(event) => self.handle(q, event),
            Step::Drained(now) => {
                self.dispatch_all(q, now)?;
                Ok(Flow::Continue)
            }
        }
    }

    fn handle(&mut self, q: &mut EventQueue, event: Event) -> Result<Flow, SimulationError> {
        let now = q.clock();
        trace!(event = event.kind.name(), time = event.time, "handle");
        match event.kind {
            EventKind::ManufacturingOrderReleased { mo }
            | EventKind::HoldReleased { mo, .. }
            | EventKind::AlternatePathRelease { mo, .. }
            | EventKind::MoveTicks { mo } => self.open_gate(q, mo)?,
            EventKind::PredecessorMOAvailable { successor, .. } => self.open_gate(q, successor)?,
            EventKind::MaterialAvailable { operation } => {
                if let Some(state) = self.ops.get_mut(&operation) {
                    state.material_pending = false;
                }
                self.check_ready(q, operation)?;
            }
            EventKind::OperationReady { operation } => self.operation_ready(operation, now)?,
            EventKind::OperationFinished { operation, .. } => self.activity_finished(q, operation)?,
            EventKind::ResourceTransferSpan { predecessor, successor } => {
                let rts = self.association(predecessor, successor)?.resource_transfer_span.max(0);
                q.schedule(
                    now + rts,
                    EventKind::PredecessorOperationAvailable { predecessor, successor },
                )?;
            }
            EventKind::PredecessorOperationAvailable { predecessor, successor } => {
                let ts = self.association(predecessor, successor)?.transfer_span.max(0);
                if ts > 0 {
                    q.schedule(now + ts, EventKind::TransferSpan { predecessor, successor })?;
                } else {
                    self.satisfy(q, successor)?;
                }
            }
            EventKind::TransferSpan { successor, .. } => self.satisfy(q, successor)?,
            EventKind::AlternatePathValidityEnd { mo, path } => self.abandon(q, mo, path)?,
            EventKind::Move { activity } => self.release_move(activity, now)?,
            EventKind::PreventMoveIntersection { activity, resource } => {
                self.reserve_move_target(activity, resource, now)?
            }
            EventKind::TrialEvent { day } => {
                debug!(day, time = now, "trial limit reached");
                self.stopped_at = Some(now);
                self.trial_stopped = true;
                return Ok(Flow::Stop);
            }
            EventKind::ResourceAvailable { .. } => {}
        }
        Ok(Flow::Continue)
    }

    fn open_gate(&mut self, q: &mut EventQueue, mo: MoId) -> Result<(), SimulationError> {
        let Some(state) = self.mos.get_mut(&mo) else {
            return Ok(());
        };
        state.gates = state.gates.saturating_sub(1);
        if state.gates > 0 || state.released || state.abandoned || state.complete {
            return Ok(());
        }
        state.released = true;
        let Some(path) = self.current_path(mo) else {
            return Ok(());
        };
        debug!(%mo, time = q.clock(), "order released");
        for op in path.operations.keys() {
            if let Some(state) = self.ops.get_mut(op) {
                state.released = true;
            }
            self.check_ready(q, *op)?;
        }
        Ok(())
    }

    fn check_ready(&mut self, q: &mut EventQueue, op: OperationId) -> Result<(), SimulationError> {
        let Some(state) = self.ops.get_mut(&op) else {
            return Ok(());
        };
        if state.released
            && !state.ready
            && !state.complete
            && state.pending_predecessors == 0
            && !state.material_pending
        {
            state.ready = true;
            q.schedule(q.clock(), EventKind::OperationReady { operation: op })?;
        }
        Ok(())
    }

    fn satisfy(&mut self, q: &mut EventQueue, op: OperationId) -> Result<(), SimulationError> {
        if let Some(state) = self.ops.get_mut(&op) {
            state.pending_predecessors = state.pending_predecessors.saturating_sub(1);
        }
        self.check_ready(q, op)
    }

    fn operation_ready(&mut self, op: OperationId, now: Ticks) -> Result<(), SimulationError> {
        let (_, _, operation) = self.locate_op(op)?;
        for act in operation.activities.values() {
            let Some(state) = self.acts.get_mut(&act.id) else { continue };
            if act.is_finished() || state.scheduled || state.abandoned || !state.queued_on.is_empty() {
                continue;
            }
            state.ready_time = Some(now);
            if state.move_held {
                continue;
            }
            self.enqueue(act.id, now, None, None)?;
        }
        Ok(())
    }

    /// Adds an activity to the dispatchers of the resources it may run on.
    fn enqueue(
        &mut self,
        activity: ActivityId,
        now: Ticks,
        tier: Option<DispatchTier>,
        preferred: Option<ResourceId>,
    ) -> Result<Vec<usize>, SimulationError> {
        let aref = self.locate_act(activity)?;
        let Some(primary) = aref.operation.primary_requirement() else {
            return Ok(Vec::new());
        };
        let tier = tier.unwrap_or_else(|| Self::tier_of(&aref));
        let targets: Vec<ResourceId> = match (
            preferred,
            aref.activity.move_request.and_then(|m| m.resource),
            aref.activity.locked_resource,
        ) {
            (Some(r), _, _) | (None, Some(r), _) | (None, None, Some(r)) => vec![r],
            (None, None, None) => primary.eligible.clone(),
        };
        let durations = aref.activity.effective_durations(&aref.operation.durations);
        let mut ready = ReadyActivity::new(activity, aref.job.id)
            .with_activity_number(aref.operation.sequence)
            .with_simultaneous_index(aref.activity.simultaneous_index)
            .with_ready_time(now)
            .with_need_date(aref.job.need_date)
            .with_priority(self.priority_of(aref.job))
            .with_processing(durations.resource_span())
            .with_tier(tier);
        if let Some(&start) = self.original_starts.get(&activity) {
            ready = ready.with_original_start(start);
        }

        let mut queued = Vec::new();
        for id in targets {
            let Some(idx) = self.resource_index(id) else { continue };
            if !self.resource_list[idx].active || queued.contains(&idx) {
                continue;
            }
            self.dispatchers[idx].add(ready.clone());
            queued.push(idx);
        }
        trace!(%activity, ?tier, resources = queued.len(), "enqueued");
        if let Some(state) = self.acts.get_mut(&activity) {
            state.tier = tier;
            state.ready_time.get_or_insert(now);
            state.queued_on = queued.clone();
        }
        Ok(queued)
    }

    fn activity_finished(&mut self, q: &mut EventQueue, op: OperationId) -> Result<(), SimulationError> {
        let Some(state) = self.ops.get_mut(&op) else {
            return Ok(());
        };
        state.open_activities = state.open_activities.saturating_sub(1);
        if state.open_activities == 0 && !state.complete {
            self.complete_operation(q, op)?;
        }
        Ok(())
    }

    fn complete_operation(&mut self, q: &mut EventQueue, op: OperationId) -> Result<(), SimulationError> {
        let now = q.clock();
        let (mo, path, operation) = self.locate_op(op)?;
        let Some(state) = self.ops.get_mut(&op) else {
            return Ok(());
        };
        state.complete = true;
        let boundaries = state.boundaries.unwrap_or(StageBoundaries {
            start: now,
            setup_end: now,
            run_end: now,
        });
        let mpp = operation.durations.material_post_processing.max(0);
        let available = boundaries
            .start
            .max(boundaries.setup_end)
            .max(boundaries.run_end)
            .saturating_add(mpp)
            .max(now);

        for assoc in path.successors_of(op) {
            let (predecessor, successor) = (assoc.predecessor, assoc.successor);
            if assoc.resource_transfer_span > 0 {
                q.schedule(available, EventKind::ResourceTransferSpan { predecessor, successor })?;
            } else {
                let at = predecessor_release_time(boundaries, mpp, assoc).max(now);
                q.schedule(at, EventKind::PredecessorOperationAvailable { predecessor, successor })?;
            }
        }

        if let Some(state) = self.mos.get_mut(&mo) {
            state.completion = state.completion.max(available);
            state.open_operations = state.open_operations.saturating_sub(1);
            if state.open_operations == 0 && !state.complete {
                state.complete = true;
                let at = state.completion;
                debug!(%mo, at, "order complete");
                for successor in state.successors.clone() {
                    q.schedule(at, EventKind::PredecessorMOAvailable { predecessor: mo, successor })?;
                }
            }
        }
        Ok(())
    }

    /// Abandons unstarted work on a path whose validity ended.
    fn abandon(&mut self, q: &mut EventQueue, mo: MoId, path_id: PathId) -> Result<(), SimulationError> {
        let Some(path) = self.current_path(mo).filter(|p| p.id == path_id) else {
            return Ok(());
        };
        match self.mos.get_mut(&mo) {
            Some(state) if !state.complete && !state.abandoned => state.abandoned = true,
            _ => return Ok(()),
        }

        let ops: HashSet<OperationId> = path.operations.keys().copied().collect();
        let mut dropped: HashSet<ActivityId> = HashSet::new();
        for op in path.operations.values() {
            if let Some(state) = self.ops.get_mut(&op.id) {
                state.released = false;
            }
            for act in op.activities.values() {
                if act.is_finished() || act.is_in_production() {
                    continue;
                }
                let Some(state) = self.acts.get_mut(&act.id) else { continue };
                if state.scheduled {
                    continue;
                }
                state.abandoned = true;
                for idx in std::mem::take(&mut state.queued_on) {
                    self.dispatchers[idx].remove(act.id);
                }
                for timeline in &mut self.timelines {
                    timeline.release_reservation(act.id);
                }
                dropped.insert(act.id);
            }
        }

        let cancelled = q.cancel_where(|kind| match *kind {
            EventKind::ManufacturingOrderReleased { mo: m }
            | EventKind::HoldReleased { mo: m, .. }
            | EventKind::AlternatePathRelease { mo: m, .. }
            | EventKind::MoveTicks { mo: m } => m == mo,
            EventKind::PredecessorMOAvailable { successor, .. } => successor == mo,
            EventKind::OperationReady { operation } | EventKind::MaterialAvailable { operation } => {
                ops.contains(&operation)
            }
            EventKind::PredecessorOperationAvailable { successor, .. }
            | EventKind::TransferSpan { successor, .. }
            | EventKind::ResourceTransferSpan { successor, .. } => ops.contains(&successor),
            EventKind::Move { activity } | EventKind::PreventMoveIntersection { activity, .. } => {
                dropped.contains(&activity)
            }
            _ => false,
        });
        debug!(%mo, path = %path_id, activities = dropped.len(), cancelled, "path validity ended");
        Ok(())
    }

    fn release_move(&mut self, activity: ActivityId, now: Ticks) -> Result<(), SimulationError> {
        let Some(state) = self.acts.get_mut(&activity) else {
            return Ok(());
        };
        if !state.move_held {
            return Ok(());
        }
        state.move_held = false;
        if state.scheduled || state.abandoned {
            return Ok(());
        }
        let aref = self.locate_act(activity)?;
        if self.ops.get(&aref.operation.id).is_some_and(|o| o.ready) {
            self.enqueue(activity, now, None, None)?;
        }
        Ok(())
    }

    fn reserve_move_target(
        &mut self,
        activity: ActivityId,
        resource: ResourceId,
        now: Ticks,
    ) -> Result<(), SimulationError> {
        let aref = self.locate_act(activity)?;
        let (Some(request), Some(primary), Some(idx)) = (
            aref.activity.move_request,
            aref.operation.primary_requirement(),
            self.resource_index(resource),
        ) else {
            return Ok(());
        };
        let durations = aref.activity.effective_durations(&aref.operation.durations);
        if let Some(held) = HeldSpan::of(&durations, primary.usage) {
            let at = request.time.max(now);
            self.timelines[idx].reserve(activity, at + held.start_offset, at + held.end_offset);
        }
        Ok(())
    }

    // ---- dispatch ----

    fn dispatch_all(&mut self, q: &mut EventQueue, now: Ticks) -> Result<(), SimulationError> {
        for flags in [
            DispatchFlags::IN_PRODUCTION_ONLY,
            DispatchFlags::MOVES_ONLY,
            DispatchFlags::empty(),
        ] {
            for idx in 0..self.dispatchers.len() {
                self.dispatch_resource(q, idx, now, flags)?;
            }
        }
        Ok(())
    }

    fn dispatch_resource(
        &mut self,
        q: &mut EventQueue,
        idx: usize,
        now: Ticks,
        flags: DispatchFlags,
    ) -> Result<(), SimulationError> {
        if !self.resource_list[idx].active || self.dispatchers[idx].is_empty() {
            return Ok(());
        }
        self.dispatchers[idx].begin_dispatch(now, flags);
        while let Some(candidate) = self.dispatchers[idx].get_next() {
            if self.acts.get(&candidate.activity).map_or(true, |s| s.scheduled) {
                continue;
            }
            match self.try_start(q, idx, &candidate, now, flags)? {
                Attempt::Started => {}
                Attempt::Later(at) => self.request_retry(q, idx, at)?,
                Attempt::Never => {}
            }
        }
        Ok(())
    }

    fn try_start(
        &mut self,
        q: &mut EventQueue,
        idx: usize,
        candidate: &ReadyActivity,
        now: Ticks,
        flags: DispatchFlags,
    ) -> Result<Attempt, SimulationError> {
        let aref = self.locate_act(candidate.activity)?;
        let Some(primary) = aref.operation.primary_requirement() else {
            return Ok(Attempt::Never);
        };
        let durations = aref.activity.effective_durations(&aref.operation.durations);
        let busy = self.busy_for(idx, candidate.activity);
        let Some((start, late)) =
            self.earliest_start(idx, now, &durations, primary, &busy, aref.job.need_date)
        else {
            return Ok(Attempt::Never);
        };
        if start > now {
            return Ok(Attempt::Later(start));
        }
        let helpers = match self.pick_helpers(idx, aref.operation, &durations, now, candidate.activity, late) {
            HelperPick::Found(h) => h,
            HelperPick::Later(at) => return Ok(Attempt::Later(at)),
            HelperPick::Never => return Ok(Attempt::Never),
        };
        let members = self.batch_members(idx, &aref, &durations, flags)?;
        self.commit(q, idx, &members, &helpers, now, &durations)?;
        Ok(Attempt::Started)
    }

    fn busy_for(&self, idx: usize, activity: ActivityId) -> Vec<(Ticks, Ticks)> {
        if self.resource_list[idx].is_finite() {
            self.timelines[idx].blocked_for(activity)
        } else {
            Vec::new()
        }
    }

    /// Earliest start and whether late-only capacity was needed.
    ///
    /// Late-only intervals are considered only when regular capacity would
    /// finish after the need date (or offers no slot at all).
    fn earliest_start(
        &self,
        idx: usize,
        from: Ticks,
        durations: &StageDurations,
        primary: &ResourceRequirement,
        busy: &[(Ticks, Ticks)],
        need_date: Ticks,
    ) -> Option<(Ticks, bool)> {
        let profile = &self.profiles[idx];
        let regular = profile.earliest_fit(from, durations, primary.usage, false, busy);
        if let Some(start) = regular {
            if start.saturating_add(durations.resource_span()) <= need_date {
                return Some((start, false));
            }
        }
        let late = profile.earliest_fit(from, durations, primary.usage, true, busy);
        match (regular, late) {
            (Some(r), Some(l)) if l < r => Some((l, true)),
            (Some(r), _) => Some((r, false)),
            (None, Some(l)) => Some((l, true)),
            (None, None) => None,
        }
    }

    /// Chooses one resource per helper requirement, all free at `start`.
    fn pick_helpers(
        &self,
        primary_idx: usize,
        operation: &'r Operation,
        durations: &StageDurations,
        start: Ticks,
        activity: ActivityId,
        allow_late: bool,
    ) -> HelperPick<'r> {
        let mut picks: Vec<(&'r ResourceRequirement, usize)> = Vec::new();
        let mut later: Option<Ticks> = None;
        for requirement in operation.helper_requirements() {
            if HeldSpan::of(durations, requirement.usage).is_none() {
                continue;
            }
            let mut chosen = None;
            let mut best: Option<Ticks> = None;
            for id in &requirement.eligible {
                let Some(h) = self.resource_index(*id) else { continue };
                if h == primary_idx
                    || !self.resource_list[h].active
                    || !self.helpers.is_allowed_at(primary_idx, h)
                    || picks.iter().any(|(_, p)| *p == h)
                {
                    continue;
                }
                let busy = self.busy_for(h, activity);
                match self.profiles[h].earliest_fit(start, durations, requirement.usage, allow_late, &busy) {
                    Some(at) if at == start => {
                        chosen = Some(h);
                        break;
                    }
                    Some(at) => best = Some(best.map_or(at, |b| b.min(at))),
                    None => {}
                }
            }
            match (chosen, best) {
                (Some(h), _) => picks.push((requirement, h)),
                (None, Some(at)) => later = Some(later.map_or(at, |l| l.max(at))),
                (None, None) => return HelperPick::Never,
            }
        }
        match later {
            Some(at) => HelperPick::Later(at),
            None => HelperPick::Found(picks),
        }
    }

    fn batch_members(
        &self,
        idx: usize,
        leader: &ActivityRef<'r>,
        durations: &StageDurations,
        flags: DispatchFlags,
    ) -> Result<Vec<ActivityId>, SimulationError> {
        let resource = self.resource_list[idx];
        let settings = match resource.batch {
            Some(settings) if resource.is_finite() => settings,
            _ => return Ok(vec![leader.activity.id]),
        };
        let mut builder = BatchBuilder::new(
            settings,
            BatchCandidate {
                activity: leader.activity.id,
                shape: leader.operation.shape(),
                durations: *durations,
                quantity: leader.activity.quantity,
            },
        );
        for other in self.dispatchers[idx].ordered() {
            if builder.is_full() {
                break;
            }
            let admitted = self
                .acts
                .get(&other)
                .is_some_and(|s| !s.scheduled && flags.admits(s.tier));
            if other == leader.activity.id || !admitted {
                continue;
            }
            let o = self.locate_act(other)?;
            builder.try_join(&BatchCandidate {
                activity: other,
                shape: o.operation.shape(),
                durations: o.activity.effective_durations(&o.operation.durations),
                quantity: o.activity.quantity,
            });
        }
        Ok(builder.into_members())
    }

    /// Places `members` on resource `idx` at `start`, helpers with the first.
    fn commit(
        &mut self,
        q: &mut EventQueue,
        idx: usize,
        members: &[ActivityId],
        helpers: &[(&'r ResourceRequirement, usize)],
        start: Ticks,
        durations: &StageDurations,
    ) -> Result<(), SimulationError> {
        let resource = self.resource_list[idx];
        let batch = if resource.is_batch() {
            self.next_batch += 1;
            Some(BatchId(self.next_batch))
        } else {
            None
        };
        let boundaries = StageBoundaries {
            start,
            setup_end: start + durations.setup,
            run_end: start + durations.setup + durations.run,
        };
        let whole = HeldSpan {
            start_offset: 0,
            end_offset: durations.resource_span(),
        };
        let mut held_on_primary = whole;

        for (i, &member) in members.iter().enumerate() {
            let aref = self.locate_act(member)?;
            let Some(primary) = aref.operation.primary_requirement() else { continue };
            let held = HeldSpan::of(durations, primary.usage).unwrap_or(whole);
            if i == 0 {
                held_on_primary = held;
            }
            self.push_block(member, resource.id, primary.id, true, start, held, durations, batch);

            if let Some(state) = self.acts.get_mut(&member) {
                state.scheduled = true;
                for d in std::mem::take(&mut state.queued_on) {
                    self.dispatchers[d].remove(member);
                }
            }
            for timeline in &mut self.timelines {
                timeline.release_reservation(member);
            }
            if let Some(state) = self.ops.get_mut(&aref.operation.id) {
                state.record(boundaries);
            }
            q.schedule(
                boundaries.run_end.max(q.clock()),
                EventKind::OperationFinished {
                    operation: aref.operation.id,
                    activity: member,
                },
            )?;
        }

        let (block_start, block_end) = (
            start + held_on_primary.start_offset,
            start + held_on_primary.end_offset,
        );
        if resource.is_finite() {
            self.timelines[idx].occupy(block_start, block_end, batch);
        }
        self.request_retry(q, idx, block_end)?;

        if let Some(&leader) = members.first() {
            for &(requirement, h) in helpers {
                let Some(held) = HeldSpan::of(durations, requirement.usage) else { continue };
                let helper = self.resource_list[h];
                self.push_block(leader, helper.id, requirement.id, false, start, held, durations, None);
                if helper.is_finite() {
                    self.timelines[h].occupy(start + held.start_offset, start + held.end_offset, None);
                }
                self.request_retry(q, h, start + held.end_offset)?;
            }
        }
        debug!(
            resource = %resource.id,
            activities = members.len(),
            start,
            end = block_end,
            "started"
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn push_block(
        &mut self,
        activity: ActivityId,
        resource: ResourceId,
        requirement: RequirementId,
        primary: bool,
        start: Ticks,
        held: HeldSpan,
        durations: &StageDurations,
        batch: Option<BatchId>,
    ) {
        self.next_block += 1;
        self.schedule.add_block(ResourceBlock {
            id: BlockId(self.next_block),
            activity,
            resource,
            requirement,
            primary,
            start: start + held.start_offset,
            end: start + held.end_offset,
            activity_start: start,
            setup_end: start + durations.setup,
            run_end: start + durations.setup + durations.run,
            activity_end: start + durations.resource_span(),
            batch,
        });
    }

    fn request_retry(&mut self, q: &mut EventQueue, idx: usize, at: Ticks) -> Result<(), SimulationError> {
        if at <= q.clock() || at >= self.horizon_end {
            return Ok(());
        }
        if self.retries.insert((idx, at)) {
            let resource = self.resource_list[idx].id;
            q.schedule(at, EventKind::ResourceAvailable { resource })?;
        }
        Ok(())
    }

    // ---- wrap-up ----

    fn classify_unscheduled(&mut self) {
        let jobs = self.jobs;
        for job in jobs.values() {
            for mo in job.orders.values() {
                let Some(path) = mo.current() else { continue };
                for op in path.operations.values() {
                    for act in op.activities.values().filter(|a| !a.is_finished()) {
                        let state = self.acts.get(&act.id);
                        if state.is_some_and(|s| s.scheduled) {
                            continue;
                        }
                        let queued = state.is_some_and(|s| !s.queued_on.is_empty());
                        let reason = if job.do_not_schedule {
                            UnscheduledReason::NotScheduled
                        } else if state.is_some_and(|s| s.abandoned) {
                            UnscheduledReason::PathValidityEnded
                        } else if queued && !self.trial_stopped {
                            UnscheduledReason::NoCapacity
                        } else if self.stopped_at.is_some() {
                            UnscheduledReason::BeyondHorizon
                        } else {
                            UnscheduledReason::NeverReady
                        };
                        self.schedule.unscheduled.insert(act.id, reason);
                    }
                }
            }
        }
    }
}
