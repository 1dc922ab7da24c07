//! Sorted-list dispatcher.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::ops::Bound;

use super::{DispatchFlags, ReadyActivitiesDispatcher, ReadyActivity};
use crate::models::{ActivityId, Ticks};

/// Builds the ordering key of a ready activity.
///
/// Keys are compared ascending; the dispatcher appends the activity id as the
/// final tie-break, so equal keys still order deterministically.
pub trait KeyStrategy: Clone + Send + Sync + Debug + 'static {
    type Key: Ord + Clone + Debug + Send + Sync + 'static;

    fn create_key(&self, ready: &ReadyActivity) -> Self::Key;
}

/// Ready-queue kept in a balanced ordered map.
#[derive(Debug, Clone)]
pub struct SortedListDispatcher<S: KeyStrategy> {
    strategy: S,
    entries: BTreeMap<(S::Key, ActivityId), ReadyActivity>,
    keys: HashMap<ActivityId, S::Key>,
    cursor: Option<(S::Key, ActivityId)>,
    time: Ticks,
    flags: DispatchFlags,
}

impl<S: KeyStrategy> SortedListDispatcher<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            entries: BTreeMap::new(),
            keys: HashMap::new(),
            cursor: None,
            time: 0,
            flags: DispatchFlags::empty(),
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Time of the current round.
    pub fn dispatch_time(&self) -> Ticks {
        self.time
    }

    fn next_admitted(&self) -> Option<(&(S::Key, ActivityId), &ReadyActivity)> {
        let lower = match &self.cursor {
            Some(c) => Bound::Excluded(c),
            None => Bound::Unbounded,
        };
        self.entries
            .range((lower, Bound::Unbounded))
            .find(|(_, r)| self.flags.admits(r.tier))
    }
}

impl<S: KeyStrategy> ReadyActivitiesDispatcher for SortedListDispatcher<S> {
    fn add(&mut self, ready: ReadyActivity) {
        self.remove(ready.activity);
        let key = self.strategy.create_key(&ready);
        self.keys.insert(ready.activity, key.clone());
        self.entries.insert((key, ready.activity), ready);
    }

    fn remove(&mut self, activity: ActivityId) -> bool {
        match self.keys.remove(&activity) {
            Some(key) => self.entries.remove(&(key, activity)).is_some(),
            None => false,
        }
    }

    fn begin_dispatch(&mut self, time: Ticks, flags: DispatchFlags) {
        self.time = time;
        self.flags = flags;
        self.cursor = None;
    }

    fn get_next(&mut self) -> Option<ReadyActivity> {
        let (key, ready) = self
            .next_admitted()
            .map(|(k, r)| (k.clone(), r.clone()))?;
        self.cursor = Some(key);
        Some(ready)
    }

    fn peek_next(&self) -> Option<&ReadyActivity> {
        self.next_admitted().map(|(_, r)| r)
    }

    fn contains(&self, activity: ActivityId) -> bool {
        self.keys.contains_key(&activity)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn ordered(&self) -> Vec<ActivityId> {
        self.entries.values().map(|r| r.activity).collect()
    }

    fn clone_box(&self) -> Box<dyn ReadyActivitiesDispatcher> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatching::DispatchTier;
    use crate::models::JobId;

    /// Orders by ready time only.
    #[derive(Debug, Clone)]
    struct ByReady;

    impl KeyStrategy for ByReady {
        type Key = i64;

        fn create_key(&self, ready: &ReadyActivity) -> i64 {
            ready.ready_time
        }
    }

    fn ready(id: u64, time: i64) -> ReadyActivity {
        ReadyActivity::new(ActivityId(id), JobId(1)).with_ready_time(time)
    }

    #[test]
    fn test_walk_in_key_order() {
        let mut d = SortedListDispatcher::new(ByReady);
        d.add(ready(3, 30));
        d.add(ready(1, 10));
        d.add(ready(2, 10));

        d.begin_dispatch(0, DispatchFlags::empty());
        assert_eq!(d.peek_next().unwrap().activity, ActivityId(1));
        assert_eq!(d.get_next().unwrap().activity, ActivityId(1));
        assert_eq!(d.get_next().unwrap().activity, ActivityId(2));
        assert_eq!(d.get_next().unwrap().activity, ActivityId(3));
        assert!(d.get_next().is_none());
        // Walking does not remove.
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn test_remove_during_round() {
        let mut d = SortedListDispatcher::new(ByReady);
        for (id, t) in [(1, 10), (2, 20), (3, 30)] {
            d.add(ready(id, t));
        }
        d.begin_dispatch(0, DispatchFlags::empty());
        let first = d.get_next().unwrap();
        assert!(d.remove(first.activity));
        assert!(d.remove(ActivityId(2)));
        assert_eq!(d.get_next().unwrap().activity, ActivityId(3));
        assert!(!d.remove(ActivityId(2)));
        assert!(!d.contains(ActivityId(1)));
    }

    #[test]
    fn test_begin_dispatch_restarts_and_filters() {
        let mut d = SortedListDispatcher::new(ByReady);
        d.add(ready(1, 10));
        d.add(ready(2, 20).with_tier(DispatchTier::InProduction));
        d.begin_dispatch(5, DispatchFlags::IN_PRODUCTION_ONLY);
        assert_eq!(d.dispatch_time(), 5);
        assert_eq!(d.get_next().unwrap().activity, ActivityId(2));
        assert!(d.get_next().is_none());

        d.begin_dispatch(6, DispatchFlags::empty());
        assert_eq!(d.get_next().unwrap().activity, ActivityId(1));
    }

    #[test]
    fn test_re_add_rekeys() {
        let mut d = SortedListDispatcher::new(ByReady);
        d.add(ready(1, 10));
        d.add(ready(2, 20));
        d.add(ready(1, 30));
        assert_eq!(d.len(), 2);
        assert_eq!(d.ordered(), vec![ActivityId(2), ActivityId(1)]);
    }
}
