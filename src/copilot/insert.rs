//! InsertJobs: choose where expedited jobs go.
//!
//! Candidates pair an alternate path of a target order with a start time.
//! Times are the clock plus every distinct block end on a resource the
//! path can use. Each candidate is tried as a [`JobExpediteT`] against its
//! own copy of the scenario; the best scoring one is replayed live.

use std::collections::BTreeSet;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use super::kpi::{EarliestCompletion, Kpi};
use super::{Candidate, CandidateSort};
use crate::config::SearchConfig;
use crate::error::{ApsError, ValidationError};
use crate::models::{ActivityId, JobId, ResourceId, Ticks};
use crate::scenario::{
    JobExpediteT, ReceiveOutcome, Scenario, ScenarioDetail, ScenarioSnapshot, Transmission,
};
use crate::simulation::SimulationHooks;

const DEFAULT_MAX_TIMES: usize = 32;

/// Score of one trial simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialResult {
    pub score: f64,
    /// Earliest scheduled start among the target jobs.
    pub start: Option<Ticks>,
    pub unscheduled: usize,
}

/// Applies `transmission` to a private copy of `snapshot` and scores it.
///
/// The copy is dropped on return; nothing is shared with the live scenario.
pub fn run_trial(
    snapshot: &ScenarioSnapshot,
    transmission: &Transmission,
    kpi: &dyn Kpi,
    targets: &[JobId],
    hooks: &dyn SimulationHooks,
) -> Result<TrialResult, ApsError> {
    let mut detail = snapshot.restore_detail()?;
    let applied = transmission.apply(&mut detail, hooks)?;
    if applied.report.is_none() {
        return Err(ValidationError::invalid(format!("{} was refused", transmission.name())).into());
    }
    Ok(TrialResult {
        score: kpi.score(&detail, targets),
        start: earliest_start(&detail, targets),
        unscheduled: detail.schedule.unscheduled.len(),
    })
}

fn target_activities(detail: &ScenarioDetail, targets: &[JobId]) -> Vec<ActivityId> {
    targets
        .iter()
        .filter_map(|j| detail.jobs.get(j))
        .flat_map(|j| j.orders.values())
        .filter_map(|mo| mo.current())
        .flat_map(|p| p.operations.values())
        .flat_map(|op| op.activities.keys().copied())
        .collect()
}

fn earliest_start(detail: &ScenarioDetail, targets: &[JobId]) -> Option<Ticks> {
    target_activities(detail, targets)
        .into_iter()
        .filter_map(|a| detail.schedule.primary_block(a))
        .map(|b| b.start)
        .min()
}

/// What an insertion search did.
#[derive(Debug)]
pub struct InsertOutcome {
    pub chosen: Option<Candidate>,
    pub trial: Option<TrialResult>,
    pub evaluated: usize,
    /// Trials whose transmission was rejected or whose simulation failed.
    pub failed: usize,
    /// Result of replaying the chosen candidate on the live scenario.
    pub receive: Option<ReceiveOutcome>,
}

/// Searches for the best time and path to expedite a set of jobs.
#[derive(Debug)]
pub struct InsertJobs {
    jobs: Vec<JobId>,
    kpi: Box<dyn Kpi>,
    sort: CandidateSort,
    max_parallel_trials: usize,
    max_times: usize,
}

impl InsertJobs {
    /// Scores by [`EarliestCompletion`] of the jobs.
    pub fn new(jobs: Vec<JobId>) -> Self {
        Self {
            jobs,
            kpi: Box::new(EarliestCompletion::default()),
            sort: CandidateSort::default(),
            max_parallel_trials: 0,
            max_times: DEFAULT_MAX_TIMES,
        }
    }

    pub fn from_config(jobs: Vec<JobId>, config: &SearchConfig) -> Self {
        Self::new(jobs)
            .with_sort(config.candidate_sort)
            .with_max_parallel_trials(config.max_parallel_trials)
    }

    pub fn with_kpi(mut self, kpi: impl Kpi + 'static) -> Self {
        self.kpi = Box::new(kpi);
        self
    }

    pub fn with_sort(mut self, sort: CandidateSort) -> Self {
        self.sort = sort;
        self
    }

    /// 0 runs trials on the global rayon pool.
    pub fn with_max_parallel_trials(mut self, n: usize) -> Self {
        self.max_parallel_trials = n;
        self
    }

    /// Caps the candidate times per path.
    pub fn with_max_times(mut self, n: usize) -> Self {
        self.max_times = n.max(1);
        self
    }

    pub fn jobs(&self) -> &[JobId] {
        &self.jobs
    }

    /// Candidates in trial order.
    pub fn candidates(&self, detail: &ScenarioDetail) -> Result<Vec<Candidate>, ValidationError> {
        if self.jobs.is_empty() {
            return Err(ValidationError::invalid("no jobs to insert"));
        }
        if let Some(missing) = self.jobs.iter().find(|j| !detail.jobs.contains_key(j)) {
            return Err(ValidationError::unknown("job", missing));
        }
        let own: BTreeSet<ActivityId> = target_activities(detail, &self.jobs).into_iter().collect();

        let mut out = Vec::new();
        let orders = self
            .jobs
            .iter()
            .filter_map(|j| detail.jobs.get(j))
            .flat_map(|j| j.orders.values());
        for mo in orders {
            for (path_index, path) in mo.paths.values().enumerate() {
                let resources: BTreeSet<ResourceId> = path
                    .operations
                    .values()
                    .filter_map(|op| op.primary_requirement())
                    .flat_map(|r| r.eligible.iter().copied())
                    .collect();
                let mut times = BTreeSet::from([detail.clock]);
                times.extend(
                    detail
                        .schedule
                        .blocks
                        .values()
                        .filter(|b| resources.contains(&b.resource) && !own.contains(&b.activity))
                        .map(|b| b.end)
                        .filter(|&end| end >= detail.clock),
                );
                out.extend(times.into_iter().take(self.max_times).map(|time| Candidate {
                    time,
                    path: path.id,
                    preference: path.preference,
                    path_index,
                }));
            }
        }
        self.sort.sort(&mut out);
        Ok(out)
    }

    fn transmission(&self, candidate: &Candidate) -> Transmission {
        JobExpediteT::new(self.jobs.clone(), candidate.time)
            .with_path(candidate.path)
            .into()
    }

    fn evaluate(
        &self,
        snapshot: &ScenarioSnapshot,
        candidates: &[Candidate],
        hooks: &dyn SimulationHooks,
    ) -> Vec<Result<TrialResult, ApsError>> {
        let trials = || {
            candidates
                .par_iter()
                .map(|c| run_trial(snapshot, &self.transmission(c), self.kpi.as_ref(), &self.jobs, hooks))
                .collect::<Vec<_>>()
        };
        if self.max_parallel_trials == 0 {
            return trials();
        }
        match ThreadPoolBuilder::new().num_threads(self.max_parallel_trials).build() {
            Ok(pool) => pool.install(trials),
            Err(error) => {
                warn!(%error, "trial pool unavailable, using the global pool");
                trials()
            }
        }
    }

    /// Runs every candidate as a trial and replays the best one live.
    ///
    /// The best candidate is the first in sort order whose score meets the
    /// KPI threshold and is not beaten by a later one. When none qualifies
    /// the live scenario is left untouched.
    pub fn run(&self, scenario: &Scenario) -> Result<InsertOutcome, ApsError> {
        let snapshot = scenario.snapshot()?;
        let candidates = self.candidates(&snapshot.restore_detail()?)?;
        let results = self.evaluate(&snapshot, &candidates, scenario.hooks());

        let mut failed = 0;
        let mut best: Option<(Candidate, TrialResult)> = None;
        for (candidate, result) in candidates.iter().zip(results) {
            let trial = match result {
                Ok(trial) => trial,
                Err(error) => {
                    debug!(time = candidate.time, path = %candidate.path, %error, "trial failed");
                    failed += 1;
                    continue;
                }
            };
            if !self.kpi.meets_threshold(trial.score) {
                continue;
            }
            if best
                .as_ref()
                .map_or(true, |(_, b)| self.kpi.is_better(trial.score, b.score))
            {
                best = Some((*candidate, trial));
            }
        }

        let Some((chosen, trial)) = best else {
            info!(kpi = self.kpi.name(), evaluated = candidates.len(), failed, "no insertion candidate qualified");
            return Ok(InsertOutcome {
                chosen: None,
                trial: None,
                evaluated: candidates.len(),
                failed,
                receive: None,
            });
        };
        info!(
            kpi = self.kpi.name(),
            time = chosen.time,
            path = %chosen.path,
            score = trial.score,
            "replaying best insertion"
        );
        let receive = scenario.receive(&self.transmission(&chosen))?;
        Ok(InsertOutcome {
            chosen: Some(chosen),
            trial: Some(trial),
            evaluated: candidates.len(),
            failed,
            receive: Some(receive),
        })
    }
}
