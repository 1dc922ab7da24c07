//! One-off capacity intervals.
//!
//! A capacity interval is a half-open span `[start, end)` during which a
//! resource can work, annotated with the stages it may host and the staffing
//! it provides. Recurring intervals expand into values of this same type, so
//! every consumer sees a single queryable shape.

use serde::{Deserialize, Serialize};

use crate::models::{IntervalId, StageUsage, Ticks};

/// A span of available capacity on a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityInterval {
    /// Interval id; expanded occurrences carry their recurring source's id.
    pub id: IntervalId,
    /// Inclusive start.
    pub start: Ticks,
    /// Exclusive end.
    pub end: Ticks,
    /// Staffing level; zero provides no capacity.
    pub nbr_of_people: f64,
    /// Stages the interval may host.
    pub usage: StageUsage,
    /// Whether an activity may begin inside this interval.
    pub can_start_activity: bool,
    pub overtime: bool,
    /// Only used for activities that would otherwise finish late.
    pub use_only_when_late: bool,
}

impl CapacityInterval {
    /// Creates a regular production interval with one person.
    pub fn new(id: IntervalId, start: Ticks, end: Ticks) -> Self {
        Self {
            id,
            start,
            end,
            nbr_of_people: 1.0,
            usage: StageUsage::production(),
            can_start_activity: true,
            overtime: false,
            use_only_when_late: false,
        }
    }

    pub fn with_people(mut self, nbr_of_people: f64) -> Self {
        self.nbr_of_people = nbr_of_people;
        self
    }

    pub fn with_usage(mut self, usage: StageUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn overtime(mut self) -> Self {
        self.overtime = true;
        self
    }

    pub fn only_when_late(mut self) -> Self {
        self.use_only_when_late = true;
        self
    }

    pub fn no_start(mut self) -> Self {
        self.can_start_activity = false;
        self
    }

    #[inline]
    pub fn duration(&self) -> Ticks {
        self.end - self.start
    }

    #[inline]
    pub fn contains(&self, time: Ticks) -> bool {
        time >= self.start && time < self.end
    }

    /// Whether two intervals overlap.
    pub fn overlaps(&self, start: Ticks, end: Ticks) -> bool {
        self.start < end && start < self.end
    }

    /// Whether the interval provides capacity for `usage`.
    ///
    /// Late-only intervals count only when `allow_late` is set.
    pub fn supports(&self, usage: StageUsage, allow_late: bool) -> bool {
        self.nbr_of_people > 0.0
            && self.end > self.start
            && self.usage.contains(usage)
            && (allow_late || !self.use_only_when_late)
    }
}

/// Overlap length of two spans.
pub fn overlap_duration(a: (Ticks, Ticks), b: (Ticks, Ticks)) -> Ticks {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    (end - start).max(0)
}
