//! Heuristic search over trial simulations.
//!
//! Every trial runs against a private copy of the live detail, restored
//! from a [`ScenarioSnapshot`](crate::scenario::ScenarioSnapshot). Trials
//! share no mutable state and run in parallel on rayon. Only the winning
//! transmission is replayed against the live scenario.
//!
//! - [`InsertJobs`] picks a time and alternate path for expedited jobs.
//! - [`PruneScenario`] applies simplifications that do not hurt the schedule.

mod insert;
mod kpi;
mod prune;

use serde::{Deserialize, Serialize};

pub use insert::{run_trial, InsertJobs, InsertOutcome, TrialResult};
pub use kpi::{EarliestCompletion, Kpi, Makespan, OnTimeRate, TotalTardiness};
pub use prune::{
    DeleteExtraOrders, DeleteHelperRequirements, DeleteUnusedPaths, FinishStrayActivities,
    PruneModule, PruneReport, PruneResult, PruneScenario, PruneStep,
};

use crate::models::{PathId, Ticks};

/// Order in which insertion candidates are tried.
///
/// Ties keep generation order, so the first of two equally scored
/// candidates is the one that sorts first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateSort {
    /// Earliest time first.
    #[default]
    TimeOnly,
    /// Earliest time, then lowest path preference value.
    TimePathPreference,
    /// Earliest time, then path order within the order.
    TimePathIndex,
    /// Earliest time, then highest path preference value.
    TimePathPreferenceDescending,
}

/// One insertion candidate: a start time on one alternate path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub time: Ticks,
    pub path: PathId,
    pub preference: i32,
    /// Position of the path in its order.
    pub path_index: usize,
}

impl CandidateSort {
    pub fn sort(self, candidates: &mut [Candidate]) {
        match self {
            CandidateSort::TimeOnly => candidates.sort_by_key(|c| c.time),
            CandidateSort::TimePathPreference => {
                candidates.sort_by_key(|c| (c.time, c.preference))
            }
            CandidateSort::TimePathIndex => candidates.sort_by_key(|c| (c.time, c.path_index)),
            CandidateSort::TimePathPreferenceDescending => {
                candidates.sort_by_key(|c| (c.time, std::cmp::Reverse(c.preference)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate { time: 10, path: PathId(1), preference: 5, path_index: 0 },
            Candidate { time: 0, path: PathId(1), preference: 5, path_index: 0 },
            Candidate { time: 0, path: PathId(2), preference: 1, path_index: 1 },
            Candidate { time: 0, path: PathId(3), preference: 9, path_index: 2 },
        ]
    }

    fn paths(sort: CandidateSort) -> Vec<(Ticks, u64)> {
        let mut c = candidates();
        sort.sort(&mut c);
        c.iter().map(|c| (c.time, c.path.0)).collect()
    }

    #[test]
    fn test_time_only_is_stable() {
        assert_eq!(paths(CandidateSort::TimeOnly), vec![(0, 1), (0, 2), (0, 3), (10, 1)]);
    }

    #[test]
    fn test_path_preference_orders() {
        assert_eq!(
            paths(CandidateSort::TimePathPreference),
            vec![(0, 2), (0, 1), (0, 3), (10, 1)]
        );
        assert_eq!(
            paths(CandidateSort::TimePathPreferenceDescending),
            vec![(0, 3), (0, 1), (0, 2), (10, 1)]
        );
        assert_eq!(paths(CandidateSort::TimePathIndex), vec![(0, 1), (0, 2), (0, 3), (10, 1)]);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&CandidateSort::TimePathIndex).unwrap();
        assert_eq!(json, "\"TimePathIndex\"");
        assert_eq!(CandidateSort::default(), CandidateSort::TimeOnly);
    }
}
