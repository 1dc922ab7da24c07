//! Transmission catalog.
//!
//! A transmission is the only way to mutate a [`ScenarioDetail`]. Every type
//! has a fixed unique id and a version-gated field layout; [`Transmission`]
//! wraps them for dispatch on the wire.
//!
//! Applying a transmission validates its arguments before touching the
//! graph, mutates, validates the graph structure and re-simulates. A failure
//! at any step leaves partial changes behind; the scenario restores its
//! pre-transmission snapshot in that case.
//!
//! | Id | Type | Versions |
//! |----|------|----------|
//! | 1001 | [`JobInsertT`] | 1 |
//! | 1002 | [`JobDeleteT`] | 1 |
//! | 1003 | [`AlternatePathChangeT`] | 1 |
//! | 1004 | [`ActivityMoveT`] | 2: `lock_to_resource` |
//! | 1005 | [`JobExpediteT`] | 2: `path` |
//! | 1006 | [`ResourceCapacityT`] | 1 |
//! | 1007 | [`ClockAdvanceT`] | 1 |
//! | 1008 | [`ActivityStatusT`] | 1 |
//! | 1009 | [`AlternatePathDeleteT`] | 1 |
//! | 1010 | [`HelperRequirementDeleteT`] | 1 |
//! | 1011 | [`ManufacturingOrderDeleteT`] | 1 |
//! | 1012 | [`ActivityFinishT`] | 1 |
//! | 1013 | [`ScenarioOptionsT`] | 1 |
//! | 1014 | [`ResourceInsertT`] | 1 |
//! | 1015 | [`OptimizeT`] | 1 |

use std::collections::BTreeSet;

use tracing::debug;

use super::detail::{observe_job, observe_resource, ScenarioDetail};
use super::moves::{self, MoveOutcome};
use crate::capacity::{CapacityInterval, RecurringCapacityInterval};
use crate::codec::{self, FieldReader, FieldWriter, Versioned};
use crate::config::SimulationConfig;
use crate::error::{ApsError, CodecError, ValidationError, ValidationErrorKind};
use crate::models::{
    activity_mut, operation_mut, ActivityId, AlternatePath, IntervalId, Job, JobId, MoId,
    OperationId, PathId, ProductionStatus, RequirementId, Resource, ResourceId, Ticks,
};
use crate::simulation::{SimulationHooks, SimulationMode, SimulationReport};

/// Implements [`Versioned`] for a single-version field list.
macro_rules! versioned_v1 {
    ($ty:ident, $id:expr, [$($field:ident),+ $(,)?]) => {
        impl Versioned for $ty {
            const UNIQUE_ID: i32 = $id;
            const VERSION: u32 = 1;

            fn write_fields(&self, w: &mut FieldWriter, _version: u32) -> Result<(), CodecError> {
                $( w.write(&self.$field)?; )+
                Ok(())
            }

            fn read_fields(r: &mut FieldReader<'_>, _version: u32) -> Result<Self, CodecError> {
                Ok(Self {
                    $( $field: r.read()?, )+
                })
            }
        }
    };
}

/// Inserts new jobs. Every id they carry must be unused.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInsertT {
    pub jobs: Vec<Job>,
}
versioned_v1!(JobInsertT, 1001, [jobs]);

/// Deletes jobs and any predecessor links to their orders.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDeleteT {
    pub jobs: Vec<JobId>,
}
versioned_v1!(JobDeleteT, 1002, [jobs]);

/// Switches an order to another of its alternate paths.
#[derive(Debug, Clone, PartialEq)]
pub struct AlternatePathChangeT {
    pub mo: MoId,
    pub path: PathId,
}
versioned_v1!(AlternatePathChangeT, 1003, [mo, path]);

/// Moves an activity (and its batch mates) to a resource and time.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityMoveT {
    pub activity: ActivityId,
    pub resource: ResourceId,
    pub time: Ticks,
    pub into_batch: bool,
    /// Since version 2.
    pub lock_to_resource: bool,
}

impl ActivityMoveT {
    pub fn new(activity: ActivityId, resource: ResourceId, time: Ticks) -> Self {
        Self {
            activity,
            resource,
            time,
            into_batch: false,
            lock_to_resource: false,
        }
    }

    pub fn into_batch(mut self) -> Self {
        self.into_batch = true;
        self
    }

    pub fn locking(mut self) -> Self {
        self.lock_to_resource = true;
        self
    }
}

impl Versioned for ActivityMoveT {
    const UNIQUE_ID: i32 = 1004;
    const VERSION: u32 = 2;

    fn write_fields(&self, w: &mut FieldWriter, version: u32) -> Result<(), CodecError> {
        w.write(&self.activity)?;
        w.write(&self.resource)?;
        w.write(&self.time)?;
        w.write(&self.into_batch)?;
        if version >= 2 {
            w.write(&self.lock_to_resource)?;
        }
        Ok(())
    }

    fn read_fields(r: &mut FieldReader<'_>, version: u32) -> Result<Self, CodecError> {
        Ok(Self {
            activity: r.read()?,
            resource: r.read()?,
            time: r.read()?,
            into_batch: r.read()?,
            lock_to_resource: r.read_since(version, 2, false)?,
        })
    }
}

/// Expedites jobs to start no earlier than `time`, ignoring release dates
/// and holds, optionally on a chosen alternate path.
#[derive(Debug, Clone, PartialEq)]
pub struct JobExpediteT {
    pub jobs: Vec<JobId>,
    pub time: Ticks,
    /// Since version 2.
    pub path: Option<PathId>,
}

impl JobExpediteT {
    pub fn new(jobs: Vec<JobId>, time: Ticks) -> Self {
        Self {
            jobs,
            time,
            path: None,
        }
    }

    pub fn with_path(mut self, path: PathId) -> Self {
        self.path = Some(path);
        self
    }
}

impl Versioned for JobExpediteT {
    const UNIQUE_ID: i32 = 1005;
    const VERSION: u32 = 2;

    fn write_fields(&self, w: &mut FieldWriter, version: u32) -> Result<(), CodecError> {
        w.write(&self.jobs)?;
        w.write(&self.time)?;
        if version >= 2 {
            w.write(&self.path)?;
        }
        Ok(())
    }

    fn read_fields(r: &mut FieldReader<'_>, version: u32) -> Result<Self, CodecError> {
        Ok(Self {
            jobs: r.read()?,
            time: r.read()?,
            path: r.read_since(version, 2, None)?,
        })
    }
}

/// Adds and removes capacity intervals on one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceCapacityT {
    pub resource: ResourceId,
    pub add: Vec<CapacityInterval>,
    pub add_recurring: Vec<RecurringCapacityInterval>,
    /// One-off or recurring interval ids.
    pub remove: Vec<IntervalId>,
}
versioned_v1!(ResourceCapacityT, 1006, [resource, add, add_recurring, remove]);

/// Moves the scenario clock forward. Work the old schedule placed before
/// the new clock is reported finished or started.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockAdvanceT {
    pub clock: Ticks,
}
versioned_v1!(ClockAdvanceT, 1007, [clock]);

/// Reports shop-floor progress on one activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityStatusT {
    pub activity: ActivityId,
    pub status: ProductionStatus,
    pub remaining_run: Option<Ticks>,
}
versioned_v1!(ActivityStatusT, 1008, [activity, status, remaining_run]);

/// Deletes a non-current alternate path.
#[derive(Debug, Clone, PartialEq)]
pub struct AlternatePathDeleteT {
    pub mo: MoId,
    pub path: PathId,
}
versioned_v1!(AlternatePathDeleteT, 1009, [mo, path]);

/// Deletes a helper requirement from an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct HelperRequirementDeleteT {
    pub operation: OperationId,
    pub requirement: RequirementId,
}
versioned_v1!(HelperRequirementDeleteT, 1010, [operation, requirement]);

/// Deletes an order; a job keeps at least one.
#[derive(Debug, Clone, PartialEq)]
pub struct ManufacturingOrderDeleteT {
    pub mo: MoId,
}
versioned_v1!(ManufacturingOrderDeleteT, 1011, [mo]);

/// Marks activities finished.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityFinishT {
    pub activities: Vec<ActivityId>,
}
versioned_v1!(ActivityFinishT, 1012, [activities]);

/// Replaces the scenario's simulation options.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOptionsT {
    pub options: SimulationConfig,
}
versioned_v1!(ScenarioOptionsT, 1013, [options]);

/// Adds resources.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInsertT {
    pub resources: Vec<Resource>,
}
versioned_v1!(ResourceInsertT, 1014, [resources]);

/// Re-sequences everything with the configured rule.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeT {
    /// Also drop move requests and expedites.
    pub clear_pins: bool,
}
versioned_v1!(OptimizeT, 1015, [clear_pins]);

/// What applying a transmission produced.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Applied {
    /// `None` when the transmission was refused without mutating.
    pub report: Option<SimulationReport>,
    pub move_outcome: Option<MoveOutcome>,
}

macro_rules! transmissions {
    ($($variant:ident($ty:ident)),+ $(,)?) => {
        /// Any transmission.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Transmission {
            $($variant($ty),)+
        }

        impl Transmission {
            pub fn unique_id(&self) -> i32 {
                match self {
                    $(Transmission::$variant(_) => <$ty as Versioned>::UNIQUE_ID,)+
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Transmission::$variant(_) => stringify!($ty),)+
                }
            }

            /// Encodes at the current version of the wrapped type.
            pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
                match self {
                    $(Transmission::$variant(t) => codec::encode(t),)+
                }
            }

            /// Decodes any known transmission by its header.
            pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
                let (header, mut reader) = codec::open(bytes)?;
                match header.unique_id {
                    $(<$ty as Versioned>::UNIQUE_ID => {
                        Ok(Transmission::$variant(codec::decode_body(&mut reader, header)?))
                    })+
                    other => Err(CodecError::UnknownType(other)),
                }
            }
        }

        $(
            impl From<$ty> for Transmission {
                fn from(t: $ty) -> Self {
                    Transmission::$variant(t)
                }
            }
        )+
    };
}

transmissions! {
    JobInsert(JobInsertT),
    JobDelete(JobDeleteT),
    AlternatePathChange(AlternatePathChangeT),
    ActivityMove(ActivityMoveT),
    JobExpedite(JobExpediteT),
    ResourceCapacity(ResourceCapacityT),
    ClockAdvance(ClockAdvanceT),
    ActivityStatus(ActivityStatusT),
    AlternatePathDelete(AlternatePathDeleteT),
    HelperRequirementDelete(HelperRequirementDeleteT),
    ManufacturingOrderDelete(ManufacturingOrderDeleteT),
    ActivityFinish(ActivityFinishT),
    ScenarioOptions(ScenarioOptionsT),
    ResourceInsert(ResourceInsertT),
    Optimize(OptimizeT),
}

impl Transmission {
    /// Validates, mutates and re-simulates `detail`.
    pub(crate) fn apply(
        &self,
        detail: &mut ScenarioDetail,
        hooks: &dyn SimulationHooks,
    ) -> Result<Applied, ApsError> {
        let mode = match self {
            Transmission::ActivityMove(t) => return apply_move(t, detail, hooks),
            Transmission::JobInsert(t) => t.mutate(detail),
            Transmission::JobDelete(t) => t.mutate(detail),
            Transmission::AlternatePathChange(t) => t.mutate(detail),
            Transmission::JobExpedite(t) => t.mutate(detail),
            Transmission::ResourceCapacity(t) => t.mutate(detail),
            Transmission::ClockAdvance(t) => t.mutate(detail),
            Transmission::ActivityStatus(t) => t.mutate(detail),
            Transmission::AlternatePathDelete(t) => t.mutate(detail),
            Transmission::HelperRequirementDelete(t) => t.mutate(detail),
            Transmission::ManufacturingOrderDelete(t) => t.mutate(detail),
            Transmission::ActivityFinish(t) => t.mutate(detail),
            Transmission::ScenarioOptions(t) => t.mutate(detail),
            Transmission::ResourceInsert(t) => t.mutate(detail),
            Transmission::Optimize(t) => t.mutate(detail),
        }?;
        detail.validate()?;
        let report = detail.simulate(mode, hooks)?;
        debug!(transmission = self.name(), scheduled = report.scheduled_count(), "re-simulated");
        Ok(Applied {
            report: Some(report),
            move_outcome: None,
        })
    }
}

fn apply_move(
    t: &ActivityMoveT,
    detail: &mut ScenarioDetail,
    hooks: &dyn SimulationHooks,
) -> Result<Applied, ApsError> {
    not_before_clock(t.time, detail)?;
    let (mut outcome, accepted) = moves::plan(detail, t);
    if !outcome.is_success() {
        return Ok(Applied {
            report: None,
            move_outcome: Some(outcome),
        });
    }
    moves::commit(detail, t, &accepted);
    outcome.moved = accepted;
    let report = detail.simulate(SimulationMode::TimeAdjustment, hooks)?;
    moves::check_scheduled(detail, &mut outcome);
    Ok(Applied {
        report: Some(report),
        move_outcome: Some(outcome),
    })
}

type Mutation = Result<SimulationMode, ValidationError>;

fn not_before_clock(time: Ticks, detail: &ScenarioDetail) -> Result<(), ValidationError> {
    if time < detail.clock {
        return Err(ValidationError::invalid(format!(
            "time {time} is before the clock {}",
            detail.clock
        )));
    }
    Ok(())
}

fn job_of_order(detail: &ScenarioDetail, mo: MoId) -> Result<JobId, ValidationError> {
    detail
        .jobs
        .values()
        .find(|j| j.orders.contains_key(&mo))
        .map(|j| j.id)
        .ok_or_else(|| ValidationError::unknown("order", mo))
}

/// Whether any activity on the path has started or finished.
fn has_progress(path: &AlternatePath) -> bool {
    path.operations
        .values()
        .flat_map(|op| op.activities.values())
        .any(|a| a.status != ProductionStatus::NotStarted)
}

fn strip_predecessors(detail: &mut ScenarioDetail, removed: &BTreeSet<MoId>) {
    for mo in detail.jobs.values_mut().flat_map(|j| j.orders.values_mut()) {
        mo.predecessor_orders.retain(|p| !removed.contains(p));
    }
}

impl JobInsertT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        if self.jobs.is_empty() {
            return Err(ValidationError::invalid("no jobs to insert"));
        }
        let index = detail.index();
        let mut seen = BTreeSet::new();
        for job in &self.jobs {
            if detail.jobs.contains_key(&job.id) || !seen.insert(job.id) {
                return Err(ValidationError::new(
                    ValidationErrorKind::DuplicateId,
                    format!("job {} already exists", job.id),
                ));
            }
            if let Some(what) = detail.retired.conflict_in(job) {
                return Err(ValidationError::new(
                    ValidationErrorKind::DuplicateId,
                    format!("{what} belonged to a deleted entity"),
                ));
            }
            for mo in job.orders.values() {
                if index.job_of_order(mo.id).is_some() {
                    return Err(ValidationError::new(
                        ValidationErrorKind::DuplicateId,
                        format!("order {} already exists", mo.id),
                    ));
                }
                for op in mo.paths.values().flat_map(|p| p.operations.values()) {
                    if index.operation(op.id).is_some()
                        || op.activities.keys().any(|a| index.activity(*a).is_some())
                    {
                        return Err(ValidationError::new(
                            ValidationErrorKind::DuplicateId,
                            format!("operation {} or one of its activities already exists", op.id),
                        ));
                    }
                }
            }
        }
        for job in &self.jobs {
            observe_job(&mut detail.ids, job);
            detail.jobs.insert(job.id, job.clone());
        }
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl JobDeleteT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        if let Some(missing) = self.jobs.iter().find(|j| !detail.jobs.contains_key(j)) {
            return Err(ValidationError::unknown("job", missing));
        }
        let mut removed = BTreeSet::new();
        for id in &self.jobs {
            if let Some(job) = detail.jobs.remove(id) {
                removed.extend(job.orders.keys().copied());
                detail.retired.retire_job(&job);
            }
        }
        strip_predecessors(detail, &removed);
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl AlternatePathChangeT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        let job = job_of_order(detail, self.mo)?;
        let mo = detail
            .jobs
            .get_mut(&job)
            .and_then(|j| j.orders.get_mut(&self.mo))
            .ok_or_else(|| ValidationError::unknown("order", self.mo))?;
        if !mo.paths.contains_key(&self.path) {
            return Err(ValidationError::unknown("path", self.path));
        }
        if mo.current_path != self.path && mo.current().is_some_and(has_progress) {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidCurrentPath,
                format!("order {} has started work on its current path", self.mo),
            ));
        }
        mo.current_path = self.path;
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl JobExpediteT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        if self.jobs.is_empty() {
            return Err(ValidationError::invalid("no jobs to expedite"));
        }
        not_before_clock(self.time, detail)?;
        if let Some(missing) = self.jobs.iter().find(|j| !detail.jobs.contains_key(j)) {
            return Err(ValidationError::unknown("job", missing));
        }
        if let Some(path) = self.path {
            let mo = self
                .jobs
                .iter()
                .filter_map(|j| detail.jobs.get(j))
                .flat_map(|j| j.orders.values())
                .find(|m| m.paths.contains_key(&path))
                .ok_or_else(|| ValidationError::unknown("path", path))?;
            AlternatePathChangeT { mo: mo.id, path }.mutate(detail)?;
        }
        for id in &self.jobs {
            if let Some(job) = detail.jobs.get_mut(id) {
                job.expedite_at = Some(self.time);
            }
        }
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl ResourceCapacityT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        let resource = detail
            .resources
            .get(&self.resource)
            .ok_or_else(|| ValidationError::unknown("resource", self.resource))?;
        let existing: BTreeSet<IntervalId> = resource
            .intervals
            .iter()
            .map(|i| i.id)
            .chain(resource.recurring.iter().map(|r| r.id))
            .collect();
        if let Some(missing) = self.remove.iter().find(|id| !existing.contains(id)) {
            return Err(ValidationError::unknown("interval", missing));
        }
        let added = self.add.iter().map(|i| i.id).chain(self.add_recurring.iter().map(|r| r.id));
        let mut seen = BTreeSet::new();
        for id in added {
            if (existing.contains(&id) && !self.remove.contains(&id)) || !seen.insert(id) {
                return Err(ValidationError::new(
                    ValidationErrorKind::DuplicateId,
                    format!("interval {id} already exists"),
                ));
            }
            if detail.retired.intervals.contains(&id) {
                return Err(ValidationError::new(
                    ValidationErrorKind::DuplicateId,
                    format!("interval {id} was deleted"),
                ));
            }
        }
        if let Some(bad) = self.add.iter().find(|i| i.end <= i.start) {
            return Err(ValidationError::invalid(format!(
                "interval {} ends before it starts",
                bad.id
            )));
        }
        if let Some(bad) = self.add_recurring.iter().find(|r| r.duration <= 0) {
            return Err(ValidationError::invalid(format!(
                "recurring interval {} has no duration",
                bad.id
            )));
        }

        for id in self.add.iter().map(|i| i.id).chain(self.add_recurring.iter().map(|r| r.id)) {
            detail.ids.observe(id.value());
        }
        // An id removed and re-added in one change is a replacement.
        detail
            .retired
            .intervals
            .extend(self.remove.iter().filter(|id| !seen.contains(*id)).copied());
        if let Some(resource) = detail.resources.get_mut(&self.resource) {
            resource.intervals.retain(|i| !self.remove.contains(&i.id));
            resource.recurring.retain(|r| !self.remove.contains(&r.id));
            resource.intervals.extend(self.add.iter().cloned());
            resource.recurring.extend(self.add_recurring.iter().cloned());
        }
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl ClockAdvanceT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        not_before_clock(self.clock, detail)?;
        let index = detail.index();
        let progress: Vec<_> = detail
            .schedule
            .blocks
            .values()
            .filter(|b| b.primary && b.activity_start < self.clock)
            .map(|b| {
                if b.activity_end <= self.clock {
                    (b.activity, ProductionStatus::Finished, None)
                } else {
                    let remaining = (b.run_end - self.clock.max(b.setup_end)).max(0);
                    (b.activity, ProductionStatus::Started, Some(remaining))
                }
            })
            .collect();
        for (id, status, remaining) in progress {
            let Some(act) = index.activity(id).and_then(|loc| activity_mut(&mut detail.jobs, loc, id))
            else {
                continue;
            };
            if act.is_finished() {
                continue;
            }
            act.status = status;
            act.remaining_run = remaining;
        }
        debug!(from = detail.clock, to = self.clock, "clock advanced");
        detail.clock = self.clock;
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl ActivityStatusT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        if self.remaining_run.is_some_and(|r| r < 0) {
            return Err(ValidationError::invalid("remaining run is negative"));
        }
        let loc = detail
            .index()
            .activity(self.activity)
            .ok_or_else(|| ValidationError::unknown("activity", self.activity))?;
        let act = activity_mut(&mut detail.jobs, loc, self.activity)
            .ok_or_else(|| ValidationError::unknown("activity", self.activity))?;
        act.status = self.status;
        act.remaining_run = match self.status {
            ProductionStatus::Started => self.remaining_run,
            _ => None,
        };
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl AlternatePathDeleteT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        let job = job_of_order(detail, self.mo)?;
        let mo = detail
            .jobs
            .get_mut(&job)
            .and_then(|j| j.orders.get_mut(&self.mo))
            .ok_or_else(|| ValidationError::unknown("order", self.mo))?;
        if mo.current_path == self.path {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidCurrentPath,
                format!("path {} is the current path of order {}", self.path, self.mo),
            ));
        }
        let path = mo
            .paths
            .remove(&self.path)
            .ok_or_else(|| ValidationError::unknown("path", self.path))?;
        detail.retired.retire_path(&path);
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl HelperRequirementDeleteT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        let loc = detail
            .index()
            .operation(self.operation)
            .ok_or_else(|| ValidationError::unknown("operation", self.operation))?;
        let op = operation_mut(&mut detail.jobs, loc)
            .ok_or_else(|| ValidationError::unknown("operation", self.operation))?;
        let pos = op
            .requirements
            .iter()
            .position(|r| r.id == self.requirement)
            .ok_or_else(|| ValidationError::unknown("requirement", self.requirement))?;
        if op.requirements[pos].primary {
            return Err(ValidationError::invalid(format!(
                "requirement {} is the primary requirement",
                self.requirement
            )));
        }
        let removed = op.requirements.remove(pos);
        detail.retired.requirements.insert(removed.id);
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl ManufacturingOrderDeleteT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        let job_id = job_of_order(detail, self.mo)?;
        let job = detail
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| ValidationError::unknown("job", job_id))?;
        if job.orders.len() <= 1 {
            return Err(ValidationError::new(
                ValidationErrorKind::EmptyRouting,
                format!("order {} is the last order of job {job_id}", self.mo),
            ));
        }
        if let Some(mo) = job.orders.remove(&self.mo) {
            detail.retired.retire_order(&mo);
        }
        strip_predecessors(detail, &BTreeSet::from([self.mo]));
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl ActivityFinishT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        let index = detail.index();
        if let Some(missing) = self.activities.iter().find(|a| index.activity(**a).is_none()) {
            return Err(ValidationError::unknown("activity", missing));
        }
        for &id in &self.activities {
            if let Some(act) = index.activity(id).and_then(|loc| activity_mut(&mut detail.jobs, loc, id)) {
                act.status = ProductionStatus::Finished;
                act.remaining_run = None;
                act.move_request = None;
            }
        }
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl ScenarioOptionsT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        self.options
            .validate()
            .map_err(|e| ValidationError::invalid(e.to_string()))?;
        detail.options = self.options.clone();
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl ResourceInsertT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        let mut seen = BTreeSet::new();
        for resource in &self.resources {
            if detail.resources.contains_key(&resource.id) || !seen.insert(resource.id) {
                return Err(ValidationError::new(
                    ValidationErrorKind::DuplicateId,
                    format!("resource {} already exists", resource.id),
                ));
            }
            let mut intervals = resource
                .intervals
                .iter()
                .map(|i| i.id)
                .chain(resource.recurring.iter().map(|r| r.id));
            if let Some(id) = intervals.find(|id| detail.retired.intervals.contains(id)) {
                return Err(ValidationError::new(
                    ValidationErrorKind::DuplicateId,
                    format!("interval {id} was deleted"),
                ));
            }
        }
        for resource in &self.resources {
            observe_resource(&mut detail.ids, resource);
            detail.resources.insert(resource.id, resource.clone());
        }
        Ok(SimulationMode::TimeAdjustment)
    }
}

impl OptimizeT {
    fn mutate(&self, detail: &mut ScenarioDetail) -> Mutation {
        if self.clear_pins {
            for job in detail.jobs.values_mut() {
                job.expedite_at = None;
                let activities = job
                    .orders
                    .values_mut()
                    .flat_map(|m| m.paths.values_mut())
                    .flat_map(|p| p.operations.values_mut())
                    .flat_map(|o| o.activities.values_mut());
                for act in activities {
                    act.move_request = None;
                }
            }
        }
        Ok(SimulationMode::Optimize)
    }
}
