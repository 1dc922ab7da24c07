//! Dispatcher framework.
//!
//! Every resource owns a ready-queue: the activities whose constraints are
//! satisfied and whose primary requirement that resource can serve. When the
//! resource can start work, the simulation asks its dispatcher for candidates
//! in priority order.
//!
//! # Structure
//!
//! - [`ReadyActivitiesDispatcher`]: the queue contract the simulation uses.
//! - [`SortedListDispatcher`]: the default implementation, a balanced ordered
//!   map keyed by a [`KeyStrategy`]. `create_key` is the only customization
//!   point a new priority policy needs.
//! - [`RuleEngine`]: composes [`DispatchingRule`]s into a key strategy for
//!   regular sequencing ([`SequencingRule`] presets).
//! - [`MoveKeyStrategy`]: the four-level key used while moves and expedites
//!   are being resolved.
//!
//! # Usage
//!
//! ```
//! use u_aps::dispatching::{
//!     DispatchFlags, DispatchTier, ReadyActivitiesDispatcher, ReadyActivity, SequencingRule,
//! };
//! use u_aps::models::{ActivityId, JobId};
//!
//! let mut dispatcher = SequencingRule::EarliestNeedDate.dispatcher();
//! dispatcher.add(ReadyActivity::new(ActivityId(1), JobId(1)).with_need_date(500));
//! dispatcher.add(ReadyActivity::new(ActivityId(2), JobId(2)).with_need_date(100));
//!
//! dispatcher.begin_dispatch(0, DispatchFlags::empty());
//! assert_eq!(dispatcher.get_next().map(|r| r.activity), Some(ActivityId(2)));
//! ```

mod engine;
mod moves;
pub mod rules;
mod sorted;

pub use engine::RuleEngine;
pub use moves::{MoveKey, MoveKeyStrategy};
pub use sorted::{KeyStrategy, SortedListDispatcher};

use std::fmt::Debug;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::models::{ActivityId, JobId, Ticks};
use crate::models::time::END_OF_TIME;

/// Score returned by a dispatching rule.
///
/// Lower scores = higher priority (dispatched first). Scores are integral so
/// keys are totally ordered.
pub type RuleScore = i64;

/// A dispatching rule that scores a ready activity.
///
/// # Score Convention
/// **Lower score = higher priority.** Rules return smaller values for
/// activities that should start first.
pub trait DispatchingRule: Send + Sync + Debug {
    /// Rule name (e.g., "SPT", "EDD").
    fn name(&self) -> &'static str;

    /// Scores an activity at the moment it becomes ready.
    fn evaluate(&self, ready: &ReadyActivity) -> RuleScore;

    fn description(&self) -> &'static str {
        self.name()
    }
}

/// Dispatch class of a ready activity; lower tiers dispatch first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum DispatchTier {
    /// Already running on the shop floor.
    InProduction,
    /// Being merged into an existing batch by a move.
    MoveIntoBatch,
    /// Explicitly moved or expedited.
    MoveActivity,
    /// Everything else.
    #[default]
    SequencedActivity,
}

bitflags! {
    /// Policy flags for one dispatch round.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DispatchFlags: u8 {
        /// Only in-production activities are offered.
        const IN_PRODUCTION_ONLY = 1 << 0;
        /// Sequenced activities are withheld; production and moves only.
        const MOVES_ONLY = 1 << 1;
    }
}

impl DispatchFlags {
    /// Whether an activity of `tier` may be offered under these flags.
    pub fn admits(self, tier: DispatchTier) -> bool {
        if self.contains(Self::IN_PRODUCTION_ONLY) {
            return tier == DispatchTier::InProduction;
        }
        if self.contains(Self::MOVES_ONLY) {
            return tier != DispatchTier::SequencedActivity;
        }
        true
    }
}

/// Everything a key strategy may look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyActivity {
    pub activity: ActivityId,
    pub job: JobId,
    /// Operation sequence number within its path.
    pub activity_number: u32,
    pub simultaneous_index: u32,
    /// When the activity became ready.
    pub ready_time: Ticks,
    pub need_date: Ticks,
    /// Job priority (higher = more important).
    pub priority: i32,
    /// Span held on the primary resource.
    pub processing: Ticks,
    /// Start in the previous schedule, if any.
    pub original_start: Option<Ticks>,
    pub tier: DispatchTier,
}

impl ReadyActivity {
    pub fn new(activity: ActivityId, job: JobId) -> Self {
        Self {
            activity,
            job,
            activity_number: 0,
            simultaneous_index: 0,
            ready_time: 0,
            need_date: END_OF_TIME,
            priority: 0,
            processing: 0,
            original_start: None,
            tier: DispatchTier::SequencedActivity,
        }
    }

    pub fn with_activity_number(mut self, number: u32) -> Self {
        self.activity_number = number;
        self
    }

    pub fn with_simultaneous_index(mut self, index: u32) -> Self {
        self.simultaneous_index = index;
        self
    }

    pub fn with_ready_time(mut self, time: Ticks) -> Self {
        self.ready_time = time;
        self
    }

    pub fn with_need_date(mut self, need_date: Ticks) -> Self {
        self.need_date = need_date;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_processing(mut self, processing: Ticks) -> Self {
        self.processing = processing;
        self
    }

    pub fn with_original_start(mut self, start: Ticks) -> Self {
        self.original_start = Some(start);
        self
    }

    pub fn with_tier(mut self, tier: DispatchTier) -> Self {
        self.tier = tier;
        self
    }
}

/// Ready-queue of one resource.
///
/// A dispatch round starts with [`begin_dispatch`](Self::begin_dispatch);
/// [`get_next`](Self::get_next) then walks the admitted activities in key
/// order without removing them. The simulation removes an activity once it
/// starts. Removing activities during a round does not disturb the walk.
pub trait ReadyActivitiesDispatcher: Send + Debug {
    fn add(&mut self, ready: ReadyActivity);

    /// Removes an activity; returns whether it was queued.
    fn remove(&mut self, activity: ActivityId) -> bool;

    /// Starts a new round at `time`.
    fn begin_dispatch(&mut self, time: Ticks, flags: DispatchFlags);

    /// Next candidate of the current round.
    fn get_next(&mut self) -> Option<ReadyActivity>;

    /// The candidate `get_next` would return, without advancing.
    fn peek_next(&self) -> Option<&ReadyActivity>;

    fn contains(&self, activity: ActivityId) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued activities in key order.
    fn ordered(&self) -> Vec<ActivityId>;

    fn clone_box(&self) -> Box<dyn ReadyActivitiesDispatcher>;
}

impl Clone for Box<dyn ReadyActivitiesDispatcher> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Built-in sequencing presets for the default dispatcher.
///
/// Every preset ranks by dispatch tier first and ends in the activity id, so
/// ordering is total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequencingRule {
    /// First ready, first served.
    Fifo,
    /// Earliest job need date, then ready time.
    EarliestNeedDate,
    /// Shortest held span, then ready time.
    ShortestProcessing,
    /// Highest job priority, then need date, then ready time.
    #[default]
    JobPriority,
}

impl SequencingRule {
    /// The rule engine implementing this preset.
    pub fn engine(self) -> RuleEngine {
        match self {
            SequencingRule::Fifo => RuleEngine::new().with_rule(rules::Fifo),
            SequencingRule::EarliestNeedDate => RuleEngine::new()
                .with_rule(rules::Edd)
                .with_tie_breaker(rules::Fifo),
            SequencingRule::ShortestProcessing => RuleEngine::new()
                .with_rule(rules::Spt)
                .with_tie_breaker(rules::Fifo),
            SequencingRule::JobPriority => RuleEngine::new()
                .with_rule(rules::Priority)
                .with_tie_breaker(rules::Edd)
                .with_tie_breaker(rules::Fifo),
        }
    }

    /// A fresh, empty dispatcher for this preset.
    pub fn dispatcher(self) -> Box<dyn ReadyActivitiesDispatcher> {
        Box::new(SortedListDispatcher::new(self.engine()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order() {
        assert!(DispatchTier::InProduction < DispatchTier::MoveIntoBatch);
        assert!(DispatchTier::MoveIntoBatch < DispatchTier::MoveActivity);
        assert!(DispatchTier::MoveActivity < DispatchTier::SequencedActivity);
    }

    #[test]
    fn test_flags_admit() {
        let all = DispatchFlags::empty();
        assert!(all.admits(DispatchTier::SequencedActivity));

        let prod = DispatchFlags::IN_PRODUCTION_ONLY;
        assert!(prod.admits(DispatchTier::InProduction));
        assert!(!prod.admits(DispatchTier::MoveActivity));

        let moves = DispatchFlags::MOVES_ONLY;
        assert!(moves.admits(DispatchTier::MoveIntoBatch));
        assert!(moves.admits(DispatchTier::InProduction));
        assert!(!moves.admits(DispatchTier::SequencedActivity));
    }

    #[test]
    fn test_presets_order_by_their_criterion() {
        let a = ReadyActivity::new(ActivityId(1), JobId(1))
            .with_ready_time(10)
            .with_need_date(900)
            .with_processing(50)
            .with_priority(1);
        let b = ReadyActivity::new(ActivityId(2), JobId(2))
            .with_ready_time(20)
            .with_need_date(100)
            .with_processing(500)
            .with_priority(5);
        let c = ReadyActivity::new(ActivityId(3), JobId(3))
            .with_ready_time(30)
            .with_need_date(500)
            .with_processing(5)
            .with_priority(1);

        let order = |rule: SequencingRule| {
            let mut d = rule.dispatcher();
            for r in [&c, &a, &b] {
                d.add(r.clone());
            }
            d.ordered()
        };
        let ids = |v: [u64; 3]| v.map(ActivityId).to_vec();

        assert_eq!(order(SequencingRule::Fifo), ids([1, 2, 3]));
        assert_eq!(order(SequencingRule::EarliestNeedDate), ids([2, 3, 1]));
        assert_eq!(order(SequencingRule::ShortestProcessing), ids([3, 1, 2]));
        assert_eq!(order(SequencingRule::JobPriority), ids([2, 3, 1]));
    }

    #[test]
    fn test_in_production_first_under_every_preset() {
        for rule in [
            SequencingRule::Fifo,
            SequencingRule::EarliestNeedDate,
            SequencingRule::ShortestProcessing,
            SequencingRule::JobPriority,
        ] {
            let mut d = rule.dispatcher();
            d.add(ReadyActivity::new(ActivityId(1), JobId(1)).with_priority(100));
            d.add(
                ReadyActivity::new(ActivityId(2), JobId(2))
                    .with_ready_time(99)
                    .with_tier(DispatchTier::InProduction),
            );
            assert_eq!(d.ordered()[0], ActivityId(2), "{rule:?}");
        }
    }

    #[test]
    fn test_boxed_clone_is_independent() {
        let mut d = SequencingRule::Fifo.dispatcher();
        d.add(ReadyActivity::new(ActivityId(1), JobId(1)));
        let mut copy = d.clone();
        copy.add(ReadyActivity::new(ActivityId(2), JobId(1)));
        assert_eq!(d.len(), 1);
        assert_eq!(copy.len(), 2);
    }
}
