//! Queryable capacity of one resource.
//!
//! A [`CapacityProfile`] merges a resource's one-off intervals with the
//! occurrences of its recurring intervals inside a query window, and answers
//! the placement questions the simulation asks: can an activity with these
//! stage durations start here, and if not, when is the earliest time it can?
//!
//! # Placement Rule
//!
//! An activity placed at `t` with stage durations `(setup, run, post)` is
//! feasible on the profile when:
//!
//! 1. `t` lies in an interval that allows starting an activity and hosts the
//!    first held stage.
//! 2. Every held stage span with non-zero length is fully covered by
//!    intervals whose usage flags include that stage.
//! 3. The held span does not intersect any busy span supplied by the caller.
//!
//! Coverage may chain across adjacent or overlapping intervals.

use crate::models::{Resource, ResourceId, Stage, StageDurations, StageUsage, Ticks};

use super::CapacityInterval;

/// Stage spans of an activity relative to its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeldSpan {
    /// Offset of the first held stage.
    pub start_offset: Ticks,
    /// Offset of the end of the last held stage.
    pub end_offset: Ticks,
}

impl HeldSpan {
    /// Span covered by the stages in `usage`.
    ///
    /// Stages not in `usage` but lying between held stages are included, so a
    /// block is always contiguous. Returns `None` when no held stage has
    /// length and `usage` holds nothing.
    pub fn of(durations: &StageDurations, usage: StageUsage) -> Option<Self> {
        let mut offset = 0;
        let mut first: Option<Ticks> = None;
        let mut last = 0;
        for stage in Stage::ALL {
            let len = durations.of(stage);
            if usage.contains(stage.usage()) {
                if first.is_none() {
                    first = Some(offset);
                }
                last = offset + len;
            }
            offset += len;
        }
        first.map(|start_offset| Self {
            start_offset,
            end_offset: last,
        })
    }

    pub fn len(&self) -> Ticks {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Capacity of one resource inside a window.
#[derive(Debug, Clone, Default)]
pub struct CapacityProfile {
    resource: Option<ResourceId>,
    intervals: Vec<CapacityInterval>,
    window_end: Ticks,
}

impl CapacityProfile {
    /// Resolves a resource's intervals overlapping `[from, to)`.
    pub fn build(resource: &Resource, from: Ticks, to: Ticks) -> Self {
        let mut intervals: Vec<CapacityInterval> = resource
            .intervals
            .iter()
            .filter(|iv| iv.overlaps(from, to))
            .cloned()
            .collect();
        for rule in &resource.recurring {
            intervals.extend(rule.expand(from, to));
        }
        Self::from_intervals(Some(resource.id), intervals, to)
    }

    /// Profile over explicit intervals.
    pub fn from_intervals(
        resource: Option<ResourceId>,
        mut intervals: Vec<CapacityInterval>,
        window_end: Ticks,
    ) -> Self {
        intervals.retain(|iv| iv.end > iv.start);
        intervals.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(a.end.cmp(&b.end))
                .then(a.id.cmp(&b.id))
        });
        Self {
            resource,
            intervals,
            window_end,
        }
    }

    pub fn resource(&self) -> Option<ResourceId> {
        self.resource
    }

    pub fn intervals(&self) -> &[CapacityInterval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn window_end(&self) -> Ticks {
        self.window_end
    }

    /// Whether `[start, end)` is covered by intervals hosting `usage`.
    pub fn covers(&self, start: Ticks, end: Ticks, usage: StageUsage, allow_late: bool) -> bool {
        if end <= start {
            return true;
        }
        let mut reached = start;
        for iv in self
            .intervals
            .iter()
            .filter(|iv| iv.supports(usage, allow_late))
        {
            if iv.end <= reached {
                continue;
            }
            if iv.start > reached {
                return false;
            }
            reached = iv.end;
            if reached >= end {
                return true;
            }
        }
        false
    }

    /// Whether an activity whose first held stage needs `usage` may start at
    /// `time`.
    pub fn can_start_at(&self, time: Ticks, usage: StageUsage, allow_late: bool) -> bool {
        self.intervals.iter().any(|iv| {
            iv.can_start_activity && iv.contains(time) && iv.supports(usage, allow_late)
        })
    }

    /// Whether an activity starting at `start` fits on the capacity.
    pub fn fits(
        &self,
        start: Ticks,
        durations: &StageDurations,
        usage: StageUsage,
        allow_late: bool,
    ) -> bool {
        let Some(held) = HeldSpan::of(durations, usage) else {
            return false;
        };
        let first_usage = Self::first_stage_usage(durations, usage);
        if !self.can_start_at(start + held.start_offset, first_usage, allow_late) {
            return false;
        }
        let mut offset = 0;
        for stage in Stage::ALL {
            let len = durations.of(stage);
            if len > 0
                && usage.contains(stage.usage())
                && !self.covers(start + offset, start + offset + len, stage.usage(), allow_late)
            {
                return false;
            }
            offset += len;
        }
        true
    }

    /// Earliest start at or after `from` where the activity fits and its held
    /// span avoids every span in `busy`.
    ///
    /// Returns `None` if nothing fits before the window end.
    pub fn earliest_fit(
        &self,
        from: Ticks,
        durations: &StageDurations,
        usage: StageUsage,
        allow_late: bool,
        busy: &[(Ticks, Ticks)],
    ) -> Option<Ticks> {
        let held = HeldSpan::of(durations, usage)?;
        let offsets = [
            0,
            durations.setup,
            durations.setup + durations.run,
        ];

        let mut candidates: Vec<Ticks> = vec![from];
        for iv in &self.intervals {
            for off in offsets {
                candidates.push(iv.start - off);
            }
        }
        for &(_, busy_end) in busy {
            candidates.push(busy_end - held.start_offset);
        }
        candidates.retain(|&t| t >= from && t < self.window_end);
        candidates.sort_unstable();
        candidates.dedup();

        candidates.into_iter().find(|&t| {
            let span = (t + held.start_offset, t + held.end_offset);
            !busy.iter().any(|&b| intersects(span, b))
                && self.fits(t, durations, usage, allow_late)
        })
    }

    /// Overtime covered within `[start, end)`.
    pub fn overtime_within(&self, start: Ticks, end: Ticks) -> Ticks {
        self.intervals
            .iter()
            .filter(|iv| iv.overtime)
            .map(|iv| super::overlap_duration((iv.start, iv.end), (start, end)))
            .sum()
    }

    fn first_stage_usage(durations: &StageDurations, usage: StageUsage) -> StageUsage {
        Stage::ALL
            .iter()
            .copied()
            .find(|s| usage.contains(s.usage()) && durations.of(*s) > 0)
            .map(Stage::usage)
            .unwrap_or_else(StageUsage::empty)
    }
}

/// Whether two spans intersect. Zero-length spans intersect nothing.
pub fn intersects(a: (Ticks, Ticks), b: (Ticks, Ticks)) -> bool {
    a.0 < a.1 && b.0 < b.1 && a.0 < b.1 && b.0 < a.1
}
