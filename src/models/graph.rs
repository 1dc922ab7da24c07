//! Containment index over the planning graph.
//!
//! The graph is stored as nested ordered maps (job → order → path →
//! operation → activity). Events and dispatchers only carry ids, so lookups
//! go through a flat index built once per simulation run or transmission.

use std::collections::{BTreeMap, HashMap};

use super::activity::{Activity, Operation};
use super::ids::{ActivityId, JobId, MoId, OperationId, PathId};
use super::job::{Job, ManufacturingOrder};
use super::path::AlternatePath;

/// Where an activity or operation lives in the containment hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub job: JobId,
    pub mo: MoId,
    pub path: PathId,
    pub operation: OperationId,
}

/// Flat lookup tables over every path (current or not) of every order.
#[derive(Debug, Clone, Default)]
pub struct PlanningIndex {
    activities: HashMap<ActivityId, Location>,
    operations: HashMap<OperationId, Location>,
    orders: HashMap<MoId, JobId>,
}

impl PlanningIndex {
    pub fn build(jobs: &BTreeMap<JobId, Job>) -> Self {
        let mut index = Self::default();
        for job in jobs.values() {
            for mo in job.orders.values() {
                index.orders.insert(mo.id, job.id);
                for path in mo.paths.values() {
                    for op in path.operations.values() {
                        let loc = Location {
                            job: job.id,
                            mo: mo.id,
                            path: path.id,
                            operation: op.id,
                        };
                        index.operations.insert(op.id, loc);
                        for act in op.activities.keys() {
                            index.activities.insert(*act, loc);
                        }
                    }
                }
            }
        }
        index
    }

    pub fn activity(&self, id: ActivityId) -> Option<Location> {
        self.activities.get(&id).copied()
    }

    pub fn operation(&self, id: OperationId) -> Option<Location> {
        self.operations.get(&id).copied()
    }

    pub fn job_of_order(&self, id: MoId) -> Option<JobId> {
        self.orders.get(&id).copied()
    }

    pub fn activity_count(&self) -> usize {
        self.activities.len()
    }
}

/// Borrowed view of one activity and its ancestors.
#[derive(Debug, Clone, Copy)]
pub struct ActivityRef<'a> {
    pub job: &'a Job,
    pub mo: &'a ManufacturingOrder,
    pub path: &'a AlternatePath,
    pub operation: &'a Operation,
    pub activity: &'a Activity,
}

impl<'a> ActivityRef<'a> {
    /// Resolves a location against the job map.
    pub fn resolve(
        jobs: &'a BTreeMap<JobId, Job>,
        loc: Location,
        activity: ActivityId,
    ) -> Option<Self> {
        let job = jobs.get(&loc.job)?;
        let mo = job.orders.get(&loc.mo)?;
        let path = mo.paths.get(&loc.path)?;
        let operation = path.operations.get(&loc.operation)?;
        let activity = operation.activities.get(&activity)?;
        Some(Self {
            job,
            mo,
            path,
            operation,
            activity,
        })
    }

    /// Whether the activity lies on its order's current path.
    pub fn on_current_path(&self) -> bool {
        self.mo.current_path == self.path.id
    }
}

/// Mutable access to an operation by location.
pub fn operation_mut(jobs: &mut BTreeMap<JobId, Job>, loc: Location) -> Option<&mut Operation> {
    jobs.get_mut(&loc.job)?
        .orders
        .get_mut(&loc.mo)?
        .paths
        .get_mut(&loc.path)?
        .operations
        .get_mut(&loc.operation)
}

/// Mutable access to an activity by location.
pub fn activity_mut(
    jobs: &mut BTreeMap<JobId, Job>,
    loc: Location,
    activity: ActivityId,
) -> Option<&mut Activity> {
    operation_mut(jobs, loc)?.activities.get_mut(&activity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jobs() -> BTreeMap<JobId, Job> {
        let op = Operation::new(OperationId(4), "op", 1)
            .with_activity(Activity::new(ActivityId(5), OperationId(4)));
        let path = AlternatePath::new(PathId(3), "p").with_operation(op);
        let mo = ManufacturingOrder::new(MoId(2), "mo", path);
        let job = Job::new(JobId(1), "j").with_order(mo);
        let mut map = BTreeMap::new();
        map.insert(job.id, job);
        map
    }

    #[test]
    fn test_index_locates_activity() {
        let jobs = jobs();
        let index = PlanningIndex::build(&jobs);
        let loc = index.activity(ActivityId(5)).unwrap();
        assert_eq!(loc.job, JobId(1));
        assert_eq!(loc.mo, MoId(2));
        assert_eq!(loc.path, PathId(3));
        assert_eq!(loc.operation, OperationId(4));
        assert_eq!(index.job_of_order(MoId(2)), Some(JobId(1)));
        assert!(index.activity(ActivityId(99)).is_none());
    }

    #[test]
    fn test_resolve_and_mutate() {
        let mut jobs = jobs();
        let index = PlanningIndex::build(&jobs);
        let loc = index.activity(ActivityId(5)).unwrap();
        {
            let r = ActivityRef::resolve(&jobs, loc, ActivityId(5)).unwrap();
            assert!(r.on_current_path());
            assert_eq!(r.operation.name, "op");
        }
        activity_mut(&mut jobs, loc, ActivityId(5)).unwrap().quantity = 3.0;
        let r = ActivityRef::resolve(&jobs, loc, ActivityId(5)).unwrap();
        assert!((r.activity.quantity - 3.0).abs() < 1e-10);
    }
}
