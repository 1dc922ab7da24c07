//! Batch formation on batch resources.
//!
//! A batch leader picks up further ready activities with the same
//! requirement shape and durations until the resource's volume or cycle
//! count is exhausted. All members share one start, span and batch id.

use crate::models::{ActivityId, BatchSettings, RequirementShape, StageDurations};

/// What batch compatibility looks at for one activity.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BatchCandidate {
    pub activity: ActivityId,
    pub shape: RequirementShape,
    pub durations: StageDurations,
    pub quantity: f64,
}

/// Accumulates members behind a leader.
#[derive(Debug, Clone)]
pub(crate) struct BatchBuilder {
    settings: BatchSettings,
    leader: BatchCandidate,
    volume: f64,
    members: Vec<ActivityId>,
}

impl BatchBuilder {
    pub fn new(settings: BatchSettings, leader: BatchCandidate) -> Self {
        Self {
            settings,
            volume: leader.quantity,
            members: vec![leader.activity],
            leader,
        }
    }

    /// Cycle count limit; zero is treated as one.
    fn max_members(&self) -> usize {
        self.settings.max_cycle_count.max(1) as usize
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_members()
    }

    /// Adds `candidate` if it is compatible and fits.
    pub fn try_join(&mut self, candidate: &BatchCandidate) -> bool {
        if self.is_full()
            || self.members.contains(&candidate.activity)
            || candidate.shape != self.leader.shape
            || candidate.durations != self.leader.durations
            || self.volume + candidate.quantity > self.settings.max_volume + f64::EPSILON
        {
            return false;
        }
        self.volume += candidate.quantity;
        self.members.push(candidate.activity);
        true
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn into_members(self) -> Vec<ActivityId> {
        self.members
    }
}
