//! Trial scoring.
//!
//! A [`Kpi`] turns a simulated trial detail into one number. Whether lower
//! or higher is better is part of the KPI, as is an optional threshold a
//! winning trial must meet.

use std::fmt::Debug;

use crate::models::JobId;
use crate::scenario::ScenarioDetail;

/// Scores a simulated detail.
pub trait Kpi: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Scores the detail; `targets` are the jobs a search is placing, empty
    /// for whole-schedule KPIs.
    fn score(&self, detail: &ScenarioDetail, targets: &[JobId]) -> f64;

    fn lower_is_better(&self) -> bool {
        true
    }

    /// Worst acceptable score.
    fn threshold(&self) -> Option<f64> {
        None
    }

    /// Whether `a` is strictly better than `b`.
    fn is_better(&self, a: f64, b: f64) -> bool {
        if self.lower_is_better() {
            a < b
        } else {
            a > b
        }
    }

    fn meets_threshold(&self, score: f64) -> bool {
        match self.threshold() {
            None => score.is_finite(),
            Some(limit) if self.lower_is_better() => score <= limit,
            Some(limit) => score >= limit,
        }
    }
}

/// Latest completion among the target jobs.
///
/// A target with unscheduled work scores infinity. With no targets every
/// job counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct EarliestCompletion {
    pub threshold: Option<f64>,
}

impl Kpi for EarliestCompletion {
    fn name(&self) -> &'static str {
        "EarliestCompletion"
    }

    fn score(&self, detail: &ScenarioDetail, targets: &[JobId]) -> f64 {
        let kpi = detail.kpi();
        let targets: Vec<JobId> = if targets.is_empty() {
            detail.jobs.keys().copied().collect()
        } else {
            targets.to_vec()
        };
        let mut latest = f64::NEG_INFINITY;
        for job in targets {
            match kpi.completion_by_job.get(&job) {
                Some(&end) => latest = latest.max(end as f64),
                None => return f64::INFINITY,
            }
        }
        if latest.is_finite() {
            latest
        } else {
            detail.clock as f64
        }
    }

    fn threshold(&self) -> Option<f64> {
        self.threshold
    }
}

/// Schedule makespan; unscheduled work scores infinity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Makespan {
    pub threshold: Option<f64>,
}

impl Kpi for Makespan {
    fn name(&self) -> &'static str {
        "Makespan"
    }

    fn score(&self, detail: &ScenarioDetail, _targets: &[JobId]) -> f64 {
        let kpi = detail.kpi();
        if kpi.unscheduled_count > 0 {
            return f64::INFINITY;
        }
        kpi.makespan as f64
    }

    fn threshold(&self) -> Option<f64> {
        self.threshold
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TotalTardiness {
    pub threshold: Option<f64>,
}

impl Kpi for TotalTardiness {
    fn name(&self) -> &'static str {
        "TotalTardiness"
    }

    fn score(&self, detail: &ScenarioDetail, _targets: &[JobId]) -> f64 {
        let kpi = detail.kpi();
        if kpi.unscheduled_count > 0 {
            return f64::INFINITY;
        }
        kpi.total_tardiness as f64
    }

    fn threshold(&self) -> Option<f64> {
        self.threshold
    }
}

/// Fraction of jobs finishing by their need date; higher is better.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnTimeRate {
    pub threshold: Option<f64>,
}

impl Kpi for OnTimeRate {
    fn name(&self) -> &'static str {
        "OnTimeRate"
    }

    fn score(&self, detail: &ScenarioDetail, _targets: &[JobId]) -> f64 {
        detail.kpi().on_time_rate
    }

    fn lower_is_better(&self) -> bool {
        false
    }

    fn threshold(&self) -> Option<f64> {
        self.threshold
    }
}
