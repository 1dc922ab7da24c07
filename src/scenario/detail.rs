//! Scenario state and its summary.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::codec::{self, FieldReader, FieldWriter, Versioned};
use crate::config::SimulationConfig;
use crate::error::{CodecError, SimulationError, ValidationError};
use crate::models::{
    ActivityId, ActivityRef, AlternatePath, IdGenerator, IntervalId, Job, JobId,
    ManufacturingOrder, MoId, OperationId, PathId, PlanningIndex, RequirementId, Resource,
    ResourceId, Schedule, Ticks,
};
use crate::simulation::{
    ScheduleKpi, SimulationHooks, SimulationMode, SimulationReport, Simulator,
};
use crate::validation::{first_error, validate_planning};

/// Full mutable planning state of one scenario.
///
/// Trial copies are made by encoding and decoding, never by sharing, so a
/// copy cannot alias the live state.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioDetail {
    pub clock: Ticks,
    pub ids: IdGenerator,
    pub jobs: BTreeMap<JobId, Job>,
    pub resources: BTreeMap<ResourceId, Resource>,
    pub schedule: Schedule,
    pub options: SimulationConfig,
    /// Ids of deleted entities; inserts may not bring them back.
    pub retired: RetiredIds,
}

impl ScenarioDetail {
    pub fn new(clock: Ticks) -> Self {
        Self {
            clock,
            ids: IdGenerator::new(),
            jobs: BTreeMap::new(),
            resources: BTreeMap::new(),
            schedule: Schedule::new(),
            options: SimulationConfig::default(),
            retired: RetiredIds::default(),
        }
    }

    pub fn with_options(mut self, options: SimulationConfig) -> Self {
        self.options = options;
        self
    }

    /// Adds a job and moves the id generator past every id it carries.
    pub fn with_job(mut self, job: Job) -> Self {
        observe_job(&mut self.ids, &job);
        self.jobs.insert(job.id, job);
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        observe_resource(&mut self.ids, &resource);
        self.resources.insert(resource.id, resource);
        self
    }

    /// Encodes the full state.
    pub fn snapshot(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    /// Decodes a state written by [`snapshot`](Self::snapshot).
    pub fn restore(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::decode(bytes)
    }

    pub fn index(&self) -> PlanningIndex {
        PlanningIndex::build(&self.jobs)
    }

    pub fn activity(&self, id: ActivityId) -> Option<ActivityRef<'_>> {
        let loc = self.index().activity(id)?;
        ActivityRef::resolve(&self.jobs, loc, id)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        first_error(validate_planning(&self.jobs, &self.resources))
    }

    /// Re-simulates from the current schedule and replaces it.
    ///
    /// Priority overrides returned by the end-of-simulation hook are written
    /// back to the jobs.
    pub fn simulate(
        &mut self,
        mode: SimulationMode,
        hooks: &dyn SimulationHooks,
    ) -> Result<SimulationReport, SimulationError> {
        let outcome = Simulator::new(&self.jobs, &self.resources, self.clock)
            .with_previous(&self.schedule)
            .with_options(self.options.clone())
            .with_mode(mode)
            .with_hooks(hooks)
            .run()?;
        self.schedule = outcome.schedule;
        if let Some(values) = outcome.end_values {
            for (job, priority) in values.priority_overrides {
                if let Some(job) = self.jobs.get_mut(&job) {
                    job.priority = priority;
                }
            }
        }
        Ok(outcome.report)
    }

    pub fn kpi(&self) -> ScheduleKpi {
        ScheduleKpi::calculate(&self.schedule, &self.jobs, &self.resources)
    }
}

impl Versioned for ScenarioDetail {
    const UNIQUE_ID: i32 = 500;
    const VERSION: u32 = 2;

    fn write_fields(&self, w: &mut FieldWriter, version: u32) -> Result<(), CodecError> {
        w.write(&self.clock)?;
        w.write(&self.ids)?;
        w.write(&self.jobs)?;
        w.write(&self.resources)?;
        w.write(&self.schedule)?;
        w.write(&self.options)?;
        if version >= 2 {
            w.write(&self.retired)?;
        }
        Ok(())
    }

    fn read_fields(r: &mut FieldReader<'_>, version: u32) -> Result<Self, CodecError> {
        Ok(Self {
            clock: r.read()?,
            ids: r.read()?,
            jobs: r.read()?,
            resources: r.read()?,
            schedule: r.read()?,
            options: r.read()?,
            retired: r.read_since(version, 2, RetiredIds::default())?,
        })
    }
}

/// Ids of deleted planning entities, by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetiredIds {
    pub jobs: BTreeSet<JobId>,
    pub orders: BTreeSet<MoId>,
    pub paths: BTreeSet<PathId>,
    pub operations: BTreeSet<OperationId>,
    pub activities: BTreeSet<ActivityId>,
    pub requirements: BTreeSet<RequirementId>,
    pub intervals: BTreeSet<IntervalId>,
}

impl RetiredIds {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
            && self.orders.is_empty()
            && self.paths.is_empty()
            && self.operations.is_empty()
            && self.activities.is_empty()
            && self.requirements.is_empty()
            && self.intervals.is_empty()
    }

    /// Retires a job and everything under it.
    pub fn retire_job(&mut self, job: &Job) {
        self.jobs.insert(job.id);
        for mo in job.orders.values() {
            self.retire_order(mo);
        }
    }

    pub fn retire_order(&mut self, mo: &ManufacturingOrder) {
        self.orders.insert(mo.id);
        for path in mo.paths.values() {
            self.retire_path(path);
        }
    }

    pub fn retire_path(&mut self, path: &AlternatePath) {
        self.paths.insert(path.id);
        for op in path.operations.values() {
            self.operations.insert(op.id);
            self.requirements.extend(op.requirements.iter().map(|r| r.id));
            self.activities.extend(op.activities.keys().copied());
        }
    }

    /// Describes the first retired id carried by `job`, if any.
    pub fn conflict_in(&self, job: &Job) -> Option<String> {
        if self.jobs.contains(&job.id) {
            return Some(format!("job {}", job.id));
        }
        for mo in job.orders.values() {
            if self.orders.contains(&mo.id) {
                return Some(format!("order {}", mo.id));
            }
            for path in mo.paths.values() {
                if self.paths.contains(&path.id) {
                    return Some(format!("path {}", path.id));
                }
                for op in path.operations.values() {
                    if self.operations.contains(&op.id) {
                        return Some(format!("operation {}", op.id));
                    }
                    if let Some(r) = op.requirements.iter().find(|r| self.requirements.contains(&r.id)) {
                        return Some(format!("requirement {}", r.id));
                    }
                    if let Some(a) = op.activities.keys().find(|a| self.activities.contains(a)) {
                        return Some(format!("activity {a}"));
                    }
                }
            }
        }
        None
    }
}

/// Moves `ids` past every id in a job's subtree.
pub(crate) fn observe_job(ids: &mut IdGenerator, job: &Job) {
    ids.observe(job.id.value());
    for mo in job.orders.values() {
        ids.observe(mo.id.value());
        for path in mo.paths.values() {
            ids.observe(path.id.value());
            for op in path.operations.values() {
                ids.observe(op.id.value());
                for req in &op.requirements {
                    ids.observe(req.id.value());
                }
                for act in op.activities.keys() {
                    ids.observe(act.value());
                }
            }
        }
    }
}

pub(crate) fn observe_resource(ids: &mut IdGenerator, resource: &Resource) {
    ids.observe(resource.id.value());
    for interval in &resource.intervals {
        ids.observe(interval.id.value());
    }
    for recurring in &resource.recurring {
        ids.observe(recurring.id.value());
    }
}

/// Scenario metadata kept next to the detail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioSummary {
    pub name: String,
    /// Incremented by every mutating transmission and every undo.
    pub version: u64,
    pub last_transmission: Option<i32>,
    pub kpi: Option<ScheduleKpi>,
}

impl ScenarioSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Versioned for ScenarioSummary {
    const UNIQUE_ID: i32 = 501;
    const VERSION: u32 = 1;

    fn write_fields(&self, w: &mut FieldWriter, _version: u32) -> Result<(), CodecError> {
        w.write(&self.name)?;
        w.write(&self.version)?;
        w.write(&self.last_transmission)?;
        w.write(&self.kpi)
    }

    fn read_fields(r: &mut FieldReader<'_>, _version: u32) -> Result<Self, CodecError> {
        Ok(Self {
            name: r.read()?,
            version: r.read()?,
            last_transmission: r.read()?,
            kpi: r.read()?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capacity::CapacityInterval;
    use crate::models::time::{days, hours};
    use crate::models::{
        Activity, AlternatePath, IntervalId, ManufacturingOrder, MoId, Operation, OperationId,
        PathId, RequirementId, ResourceRequirement, StageDurations,
    };
    use crate::simulation::{ChangeableValues, NoHooks, StageView};

    pub(crate) fn machine(id: u64) -> Resource {
        Resource::new(ResourceId(id), format!("M{id}"))
            .with_interval(CapacityInterval::new(IntervalId(id * 1000), 0, days(30)))
    }

    pub(crate) fn op(id: u64, seq: u32, run: Ticks, eligible: &[u64]) -> Operation {
        Operation::new(OperationId(id), format!("op{id}"), seq)
            .with_durations(StageDurations::run_only(run))
            .with_requirement(ResourceRequirement::primary(
                RequirementId(id),
                eligible.iter().copied().map(ResourceId).collect(),
            ))
            .with_activity(Activity::new(ActivityId(id), OperationId(id)))
    }

    pub(crate) fn job(id: u64, ops: Vec<Operation>) -> Job {
        let mut path = AlternatePath::new(PathId(id), "main");
        for o in ops {
            path = path.with_operation(o);
        }
        let mo = ManufacturingOrder::new(MoId(id), format!("mo{id}"), path.chained());
        Job::new(JobId(id), format!("J{id}")).with_order(mo)
    }

    /// Two machines, job 1 with two chained operations, job 2 with one.
    pub(crate) fn detail() -> ScenarioDetail {
        ScenarioDetail::new(0)
            .with_resource(machine(1))
            .with_resource(machine(2))
            .with_job(job(1, vec![op(11, 1, hours(2), &[1]), op(12, 2, hours(1), &[1, 2])]))
            .with_job(job(2, vec![op(21, 1, hours(3), &[1])]).with_priority(5))
    }

    #[test]
    fn test_builders_observe_ids() {
        let d = detail();
        assert_eq!(d.ids.peek(), 2001);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut d = detail();
        d.simulate(SimulationMode::Optimize, &NoHooks).unwrap();
        let bytes = d.snapshot().unwrap();
        let back = ScenarioDetail::restore(&bytes).unwrap();
        assert_eq!(back, d);
        assert_eq!(back.snapshot().unwrap(), bytes);
    }

    #[test]
    fn test_first_layout_has_no_retired_ids() {
        let mut d = detail();
        d.retired.jobs.insert(JobId(9));
        let old = codec::encode_version(&d, 1).unwrap();
        let back = ScenarioDetail::restore(&old).unwrap();
        assert!(back.retired.is_empty());
        assert_eq!(back.jobs, d.jobs);
        assert!(old.len() < d.snapshot().unwrap().len());
    }

    #[test]
    fn test_restore_rejects_summary_bytes() {
        let bytes = codec::encode(&ScenarioSummary::new("s")).unwrap();
        assert!(matches!(
            ScenarioDetail::restore(&bytes),
            Err(CodecError::UniqueIdMismatch { expected: 500, found: 501 })
        ));
    }

    #[test]
    fn test_simulate_replaces_schedule() {
        let mut d = detail();
        let report = d.simulate(SimulationMode::Optimize, &NoHooks).unwrap();
        assert_eq!(report.scheduled_count(), 3);
        // Job 2 has the higher priority and takes M1 first.
        assert_eq!(d.schedule.primary_block(ActivityId(21)).unwrap().start, 0);
        assert_eq!(d.kpi().unscheduled_count, 0);

        let starts = |d: &ScenarioDetail| -> Vec<(ActivityId, Ticks)> {
            [11, 12, 21]
                .map(|a| (ActivityId(a), d.schedule.primary_block(ActivityId(a)).unwrap().start))
                .to_vec()
        };
        let before = starts(&d);
        d.simulate(SimulationMode::TimeAdjustment, &NoHooks).unwrap();
        assert_eq!(starts(&d), before);
    }

    #[derive(Debug)]
    struct Reprioritize;

    impl SimulationHooks for Reprioritize {
        fn end_of_simulation(
            &self,
            _view: StageView<'_>,
        ) -> Result<Option<ChangeableValues>, SimulationError> {
            Ok(Some(ChangeableValues::default().with_priority(JobId(1), 42)))
        }
    }

    #[test]
    fn test_end_values_written_back() {
        let mut d = detail();
        d.simulate(SimulationMode::Optimize, &Reprioritize).unwrap();
        assert_eq!(d.jobs[&JobId(1)].priority, 42);
    }

    #[test]
    fn test_summary_round_trip() {
        let mut d = detail();
        d.simulate(SimulationMode::Optimize, &NoHooks).unwrap();
        let summary = ScenarioSummary {
            name: "what-if".into(),
            version: 3,
            last_transmission: Some(1005),
            kpi: Some(d.kpi()),
        };
        let bytes = codec::encode(&summary).unwrap();
        assert_eq!(codec::decode::<ScenarioSummary>(&bytes).unwrap(), summary);
    }
}
