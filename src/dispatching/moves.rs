//! Move/expedite key.
//!
//! While moves and expedites are being resolved, each resource dispatches by
//! a four-level key compared lexicographically:
//!
//! 1. **Tier** ascending: in-production, move-into-batch, move, sequenced.
//! 2. **Activity number** descending: later routing steps first.
//! 3. **Simultaneous index** ascending.
//! 4. **Original start**, stored negated and compared in reverse, so the
//!    earlier original start wins. Activities without one sort last.
//!
//! The dispatcher appends the activity id ascending as the final tie-break.
//! That id reflects creation order, which editing jobs can change; the
//! resulting order is pinned as-is.

use std::cmp::Reverse;

use super::{KeyStrategy, ReadyActivity};
use super::DispatchTier;
use crate::models::time::END_OF_TIME;
use crate::models::Ticks;

/// Four-level move dispatcher key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MoveKey {
    pub tier: DispatchTier,
    /// Negated activity number; ascending order yields descending numbers.
    pub neg_activity_number: i64,
    pub simultaneous_index: u32,
    /// Negated original start under reversed comparison.
    pub neg_original_start: Reverse<Ticks>,
}

/// Key strategy of the move dispatcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveKeyStrategy;

impl KeyStrategy for MoveKeyStrategy {
    type Key = MoveKey;

    fn create_key(&self, ready: &ReadyActivity) -> MoveKey {
        let original = ready.original_start.unwrap_or(END_OF_TIME);
        MoveKey {
            tier: ready.tier,
            neg_activity_number: -i64::from(ready.activity_number),
            simultaneous_index: ready.simultaneous_index,
            neg_original_start: Reverse(-original),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatching::{DispatchFlags, ReadyActivitiesDispatcher, SortedListDispatcher};
    use crate::models::{ActivityId, JobId};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn ready(id: u64, tier: DispatchTier, number: u32, sim: u32, start: Option<i64>) -> ReadyActivity {
        let r = ReadyActivity::new(ActivityId(id), JobId(id))
            .with_tier(tier)
            .with_activity_number(number)
            .with_simultaneous_index(sim);
        match start {
            Some(s) => r.with_original_start(s),
            None => r,
        }
    }

    fn drain(d: &mut SortedListDispatcher<MoveKeyStrategy>) -> Vec<ActivityId> {
        d.begin_dispatch(0, DispatchFlags::empty());
        std::iter::from_fn(|| d.get_next().map(|r| r.activity)).collect()
    }

    fn sample() -> Vec<ReadyActivity> {
        use DispatchTier::*;
        vec![
            ready(1, SequencedActivity, 1, 0, Some(100)),
            ready(2, SequencedActivity, 3, 0, Some(500)),
            ready(3, MoveActivity, 1, 0, Some(900)),
            ready(4, InProduction, 1, 0, None),
            ready(5, MoveIntoBatch, 2, 0, Some(50)),
            ready(6, SequencedActivity, 3, 1, Some(400)),
            ready(7, SequencedActivity, 3, 0, Some(200)),
            ready(8, SequencedActivity, 3, 0, None),
            ready(9, SequencedActivity, 3, 0, Some(200)),
        ]
    }

    #[test]
    fn test_four_level_order() {
        let mut d = SortedListDispatcher::new(MoveKeyStrategy);
        for r in sample() {
            d.add(r);
        }
        let expected: Vec<ActivityId> = [4, 5, 3, 7, 9, 2, 8, 6, 1]
            .into_iter()
            .map(ActivityId)
            .collect();
        assert_eq!(drain(&mut d), expected);
    }

    #[test]
    fn test_earlier_original_start_wins() {
        let a = MoveKeyStrategy.create_key(&ready(1, DispatchTier::MoveActivity, 2, 0, Some(10)));
        let b = MoveKeyStrategy.create_key(&ready(2, DispatchTier::MoveActivity, 2, 0, Some(20)));
        assert!(a < b);
    }

    #[test]
    fn test_higher_activity_number_wins() {
        let a = MoveKeyStrategy.create_key(&ready(1, DispatchTier::MoveActivity, 5, 0, Some(99)));
        let b = MoveKeyStrategy.create_key(&ready(2, DispatchTier::MoveActivity, 2, 0, Some(0)));
        assert!(a < b);
    }

    #[test]
    fn test_ordering_law_under_shuffled_insertion() {
        let mut reference = SortedListDispatcher::new(MoveKeyStrategy);
        for r in sample() {
            reference.add(r);
        }
        let expected = drain(&mut reference);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut items = sample();
            items.shuffle(&mut rng);
            let mut d = SortedListDispatcher::new(MoveKeyStrategy);
            for r in items {
                d.add(r);
            }
            let got = drain(&mut d);
            assert_eq!(got, expected);

            // Keys of successive activities never decrease.
            let keys: Vec<MoveKey> = got
                .iter()
                .map(|id| {
                    let r = sample().into_iter().find(|r| r.activity == *id).unwrap();
                    MoveKeyStrategy.create_key(&r)
                })
                .collect();
            assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_irrelevant_fields_do_not_change_order() {
        let mut d1 = SortedListDispatcher::new(MoveKeyStrategy);
        let mut d2 = SortedListDispatcher::new(MoveKeyStrategy);
        for r in sample() {
            // Need date, priority, processing and ready time are not key fields.
            let noisy = r
                .clone()
                .with_need_date(r.activity.0 as i64 * 37)
                .with_priority(-(r.activity.0 as i32))
                .with_processing(1000 - r.activity.0 as i64)
                .with_ready_time(r.activity.0 as i64 % 3);
            d1.add(r);
            d2.add(noisy);
        }
        assert_eq!(drain(&mut d1), drain(&mut d2));
    }
}
