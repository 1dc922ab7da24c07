//! Schedule quality metrics (KPIs).
//!
//! Computes standard scheduling performance indicators from a completed
//! schedule and the jobs it was built from.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Makespan (C_max) | Latest block end |
//! | Total Tardiness | Sum of max(0, completion - need date) per job |
//! | Maximum Tardiness | Largest single job delay |
//! | On-Time Rate | Fraction of completed jobs meeting their need date |
//! | Avg Utilization | Mean resource busyness over the simulated span |
//! | Avg Flow Time | Mean time from earliest order release to completion |
//! | Overtime | Overtime capacity covered by blocks |
//!
//! A job counts as completed only when every activity on its orders' current
//! paths has a block or had already finished.
//!
//! # Reference
//! Pinedo (2016), "Scheduling", Ch. 1.2: Performance Measures

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::capacity::CapacityProfile;
use crate::models::time::END_OF_TIME;
use crate::models::{Job, JobId, Resource, ResourceId, Schedule, Ticks};

/// Schedule performance indicators.
///
/// All time values are in ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleKpi {
    pub makespan: Ticks,
    pub total_tardiness: Ticks,
    pub max_tardiness: Ticks,
    /// Fraction of completed jobs on time (0.0..1.0).
    pub on_time_rate: f64,
    pub avg_utilization: f64,
    pub utilization_by_resource: BTreeMap<ResourceId, f64>,
    pub avg_flow_time: f64,
    /// Overtime capacity covered by blocks.
    pub overtime: Ticks,
    pub unscheduled_count: usize,
    /// Completion per job; jobs with unscheduled work are absent.
    pub completion_by_job: BTreeMap<JobId, Ticks>,
}

impl ScheduleKpi {
    /// Computes KPIs from a schedule and its inputs.
    pub fn calculate(
        schedule: &Schedule,
        jobs: &BTreeMap<JobId, Job>,
        resources: &BTreeMap<ResourceId, Resource>,
    ) -> Self {
        let completion_by_job = job_completions(schedule, jobs);
        let mut total_tardiness: Ticks = 0;
        let mut max_tardiness: Ticks = 0;
        let mut on_time_count: usize = 0;
        let mut total_flow_time: f64 = 0.0;

        for (job_id, &completion) in &completion_by_job {
            let Some(job) = jobs.get(job_id) else { continue };

            // Flow time
            let release = job
                .orders
                .values()
                .map(|mo| mo.release_date)
                .min()
                .unwrap_or(schedule.simulated_from)
                .max(schedule.simulated_from);
            total_flow_time += (completion - release).max(0) as f64;

            // Tardiness
            if job.need_date < END_OF_TIME && completion > job.need_date {
                let tardiness = completion - job.need_date;
                total_tardiness += tardiness;
                max_tardiness = max_tardiness.max(tardiness);
            } else {
                on_time_count += 1;
            }
        }

        // Utilization
        let utilization_by_resource = schedule.all_utilizations();
        let avg_utilization = if utilization_by_resource.is_empty() {
            0.0
        } else {
            let sum: f64 = utilization_by_resource.values().sum();
            sum / utilization_by_resource.len() as f64
        };

        let counted = completion_by_job.len();
        let on_time_rate = if counted == 0 {
            1.0
        } else {
            on_time_count as f64 / counted as f64
        };
        let avg_flow_time = if counted == 0 {
            0.0
        } else {
            total_flow_time / counted as f64
        };

        Self {
            makespan: schedule.makespan(),
            total_tardiness,
            max_tardiness,
            on_time_rate,
            avg_utilization,
            utilization_by_resource,
            avg_flow_time,
            overtime: overtime_used(schedule, resources),
            unscheduled_count: schedule.unscheduled.len(),
            completion_by_job,
        }
    }

    /// Whether the schedule meets the given quality thresholds.
    pub fn meets_thresholds(&self, max_tardiness: Ticks, min_utilization: f64) -> bool {
        self.max_tardiness <= max_tardiness && self.avg_utilization >= min_utilization
    }
}

/// Latest activity end per fully scheduled job.
fn job_completions(schedule: &Schedule, jobs: &BTreeMap<JobId, Job>) -> BTreeMap<JobId, Ticks> {
    let primaries = schedule.primary_blocks_by_activity();
    let mut out = BTreeMap::new();
    'jobs: for job in jobs.values() {
        if job.do_not_schedule || !job.has_orders() {
            continue;
        }
        let mut completion = schedule.simulated_from;
        for mo in job.orders.values() {
            let Some(path) = mo.current() else { continue 'jobs };
            for op in path.operations.values() {
                for act in op.activities.values() {
                    match primaries.get(&act.id) {
                        Some(block) => completion = completion.max(block.activity_end),
                        None if act.is_finished() => {}
                        None => continue 'jobs,
                    }
                }
            }
        }
        out.insert(job.id, completion);
    }
    out
}

fn overtime_used(schedule: &Schedule, resources: &BTreeMap<ResourceId, Resource>) -> Ticks {
    let end = schedule.makespan();
    if end <= schedule.simulated_from {
        return 0;
    }
    let profiles: HashMap<ResourceId, CapacityProfile> = resources
        .values()
        .map(|r| (r.id, CapacityProfile::build(r, schedule.simulated_from, end)))
        .collect();
    schedule
        .blocks
        .values()
        .filter_map(|b| {
            profiles
                .get(&b.resource)
                .map(|p| p.overtime_within(b.start, b.end))
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::CapacityInterval;
    use crate::models::{
        Activity, ActivityId, AlternatePath, BlockId, IntervalId, ManufacturingOrder, MoId,
        Operation, OperationId, PathId, RequirementId, ResourceBlock,
    };

    fn make_job(id: u64, need_date: Option<Ticks>, release: Ticks) -> Job {
        let op = Operation::new(OperationId(id * 10), "op", 1)
            .with_activity(Activity::new(ActivityId(id), OperationId(id * 10)));
        let path = AlternatePath::new(PathId(id * 10), "p").with_operation(op);
        let mo = ManufacturingOrder::new(MoId(id * 10), "mo", path).with_release_date(release);
        let job = Job::new(JobId(id), format!("J{id}")).with_order(mo);
        match need_date {
            Some(d) => job.with_need_date(d),
            None => job,
        }
    }

    fn block(id: u64, activity: u64, resource: u64, start: Ticks, end: Ticks) -> ResourceBlock {
        ResourceBlock {
            id: BlockId(id),
            activity: ActivityId(activity),
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

    fn jobs(list: Vec<Job>) -> BTreeMap<JobId, Job> {
        list.into_iter().map(|j| (j.id, j)).collect()
    }

    #[test]
    fn test_kpi_basic() {
        let jobs = jobs(vec![make_job(1, Some(5000), 0), make_job(2, Some(5000), 0)]);
        let mut schedule = Schedule::new();
        schedule.add_block(block(1, 1, 1, 0, 1000));
        schedule.add_block(block(2, 2, 1, 1000, 3000));

        let kpi = ScheduleKpi::calculate(&schedule, &jobs, &BTreeMap::new());
        assert_eq!(kpi.makespan, 3000);
        assert_eq!(kpi.total_tardiness, 0);
        assert_eq!(kpi.max_tardiness, 0);
        assert!((kpi.on_time_rate - 1.0).abs() < 1e-10);
        assert!((kpi.avg_flow_time - 2000.0).abs() < 1e-10); // (1000+3000)/2
    }

    #[test]
    fn test_kpi_tardiness() {
        let jobs = jobs(vec![make_job(1, Some(500), 0), make_job(2, Some(5000), 0)]);
        let mut schedule = Schedule::new();
        schedule.add_block(block(1, 1, 1, 0, 1000));
        schedule.add_block(block(2, 2, 1, 1000, 2000));

        let kpi = ScheduleKpi::calculate(&schedule, &jobs, &BTreeMap::new());
        assert_eq!(kpi.total_tardiness, 500);
        assert_eq!(kpi.max_tardiness, 500);
        assert!((kpi.on_time_rate - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_kpi_utilization() {
        let jobs = jobs(vec![make_job(1, None, 0), make_job(2, None, 0)]);
        let mut schedule = Schedule::new();
        schedule.add_block(block(1, 1, 1, 0, 2000));
        schedule.add_block(block(2, 2, 2, 0, 1000));

        let kpi = ScheduleKpi::calculate(&schedule, &jobs, &BTreeMap::new());
        assert_eq!(kpi.makespan, 2000);
        assert!((kpi.utilization_by_resource[&ResourceId(1)] - 1.0).abs() < 1e-10);
        assert!((kpi.utilization_by_resource[&ResourceId(2)] - 0.5).abs() < 1e-10);
        assert!((kpi.avg_utilization - 0.75).abs() < 1e-10);
    }

    #[test]
    fn test_kpi_flow_time_from_release() {
        let jobs = jobs(vec![make_job(1, None, 1000), make_job(2, None, 0)]);
        let mut schedule = Schedule::new();
        schedule.add_block(block(1, 1, 1, 2000, 3000));
        schedule.add_block(block(2, 2, 1, 0, 1000));

        let kpi = ScheduleKpi::calculate(&schedule, &jobs, &BTreeMap::new());
        // (2000 + 1000) / 2
        assert!((kpi.avg_flow_time - 1500.0).abs() < 1e-10);
    }

    #[test]
    fn test_kpi_empty() {
        let kpi = ScheduleKpi::calculate(&Schedule::new(), &BTreeMap::new(), &BTreeMap::new());
        assert_eq!(kpi.makespan, 0);
        assert_eq!(kpi.total_tardiness, 0);
        assert!((kpi.on_time_rate - 1.0).abs() < 1e-10);
        assert!((kpi.avg_utilization - 0.0).abs() < 1e-10);
        assert_eq!(kpi.overtime, 0);
    }

    #[test]
    fn test_incomplete_job_not_counted() {
        let jobs = jobs(vec![make_job(1, Some(10), 0), make_job(2, None, 0)]);
        let mut schedule = Schedule::new();
        schedule.add_block(block(1, 2, 1, 0, 1000));

        let kpi = ScheduleKpi::calculate(&schedule, &jobs, &BTreeMap::new());
        assert!(!kpi.completion_by_job.contains_key(&JobId(1)));
        assert_eq!(kpi.completion_by_job[&JobId(2)], 1000);
        assert_eq!(kpi.total_tardiness, 0);
    }

    #[test]
    fn test_overtime_used() {
        let jobs = jobs(vec![make_job(1, None, 0)]);
        let resources: BTreeMap<ResourceId, Resource> = [Resource::new(ResourceId(1), "M1")
            .with_interval(CapacityInterval::new(IntervalId(1), 0, 600))
            .with_interval(CapacityInterval::new(IntervalId(2), 600, 1000).overtime())]
        .into_iter()
        .map(|r| (r.id, r))
        .collect();
        let mut schedule = Schedule::new();
        schedule.add_block(block(1, 1, 1, 0, 1000));

        let kpi = ScheduleKpi::calculate(&schedule, &jobs, &resources);
        assert_eq!(kpi.overtime, 400);
    }

    #[test]
    fn test_meets_thresholds() {
        let jobs = jobs(vec![make_job(1, Some(500), 0)]);
        let mut schedule = Schedule::new();
        schedule.add_block(block(1, 1, 1, 0, 1000));

        let kpi = ScheduleKpi::calculate(&schedule, &jobs, &BTreeMap::new());
        assert!(kpi.meets_thresholds(500, 0.0));
        assert!(!kpi.meets_thresholds(499, 0.0));
        assert!(!kpi.meets_thresholds(1000, 1.5));
    }
}
