//! Per-run bookkeeping.
//!
//! Nothing here outlives a simulation run; the planning graph itself is
//! only read.

use crate::capacity::intersects;
use crate::dispatching::DispatchTier;
use crate::models::{ActivityId, BatchId, MoId, StageBoundaries, Ticks};

/// Release gates and completion of one manufacturing order.
#[derive(Debug, Clone, Default)]
pub(crate) struct MoState {
    /// Gates still closed (release, hold, path validity, predecessor orders).
    pub gates: usize,
    pub released: bool,
    pub abandoned: bool,
    pub complete: bool,
    pub open_operations: usize,
    /// Latest material-available time of the order's final output.
    pub completion: Ticks,
    /// Orders waiting for this one.
    pub successors: Vec<MoId>,
}

/// Readiness and progress of one operation on a current path.
#[derive(Debug, Clone, Default)]
pub(crate) struct OpState {
    pub mo: Option<MoId>,
    pub pending_predecessors: usize,
    pub material_pending: bool,
    pub released: bool,
    pub ready: bool,
    pub complete: bool,
    pub open_activities: usize,
    /// Latest stage boundaries over the operation's activities.
    pub boundaries: Option<StageBoundaries>,
}

impl OpState {
    pub fn record(&mut self, b: StageBoundaries) {
        self.boundaries = Some(match self.boundaries {
            Some(cur) => StageBoundaries {
                start: cur.start.max(b.start),
                setup_end: cur.setup_end.max(b.setup_end),
                run_end: cur.run_end.max(b.run_end),
            },
            None => b,
        });
    }
}

/// Dispatch state of one activity.
#[derive(Debug, Clone, Default)]
pub(crate) struct ActState {
    pub scheduled: bool,
    pub abandoned: bool,
    /// Waiting for its `Move` event.
    pub move_held: bool,
    pub ready_time: Option<Ticks>,
    pub tier: DispatchTier,
    /// Compact indices of the resources whose dispatcher holds it.
    pub queued_on: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BusySpan {
    start: Ticks,
    end: Ticks,
    batch: Option<BatchId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reservation {
    activity: ActivityId,
    start: Ticks,
    end: Ticks,
}

/// Occupancy of one finite resource.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResourceTimeline {
    busy: Vec<BusySpan>,
    reservations: Vec<Reservation>,
}

impl ResourceTimeline {
    pub fn occupy(&mut self, start: Ticks, end: Ticks, batch: Option<BatchId>) {
        if end > start {
            self.busy.push(BusySpan { start, end, batch });
        }
    }

    /// Holds `[start, end)` for a moved activity.
    pub fn reserve(&mut self, activity: ActivityId, start: Ticks, end: Ticks) {
        if end > start {
            self.reservations.push(Reservation {
                activity,
                start,
                end,
            });
        }
    }

    pub fn release_reservation(&mut self, activity: ActivityId) {
        self.reservations.retain(|r| r.activity != activity);
    }

    /// Spans `activity` must avoid.
    pub fn blocked_for(&self, activity: ActivityId) -> Vec<(Ticks, Ticks)> {
        self.busy
            .iter()
            .map(|b| (b.start, b.end))
            .chain(
                self.reservations
                    .iter()
                    .filter(|r| r.activity != activity)
                    .map(|r| (r.start, r.end)),
            )
            .collect()
    }

    /// Whether `[start, end)` is free for `activity`.
    pub fn is_free(&self, activity: ActivityId, start: Ticks, end: Ticks) -> bool {
        !self
            .blocked_for(activity)
            .into_iter()
            .any(|b| intersects((start, end), b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_blocking() {
        let mut t = ResourceTimeline::default();
        t.occupy(0, 100, None);
        t.reserve(ActivityId(7), 200, 300);
        assert!(!t.is_free(ActivityId(1), 50, 60));
        assert!(t.is_free(ActivityId(1), 100, 200));
        assert!(!t.is_free(ActivityId(1), 250, 260));
        // The owner of a reservation is not blocked by it.
        assert!(t.is_free(ActivityId(7), 200, 300));
        t.release_reservation(ActivityId(7));
        assert!(t.is_free(ActivityId(1), 250, 260));
    }

    #[test]
    fn test_zero_length_spans_ignored() {
        let mut t = ResourceTimeline::default();
        t.occupy(10, 10, None);
        t.reserve(ActivityId(1), 5, 5);
        assert!(t.blocked_for(ActivityId(2)).is_empty());
    }

    #[test]
    fn test_op_state_records_latest_boundaries() {
        let mut s = OpState::default();
        s.record(StageBoundaries {
            start: 0,
            setup_end: 10,
            run_end: 50,
        });
        s.record(StageBoundaries {
            start: 5,
            setup_end: 8,
            run_end: 40,
        });
        let b = s.boundaries.unwrap();
        assert_eq!((b.start, b.setup_end, b.run_end), (5, 10, 50));
    }
}
