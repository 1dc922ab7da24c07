//! Recurring capacity intervals.
//!
//! A recurring interval is a rule: "from `shift_start` for `duration` on
//! every day matching `recurrence`, starting at `effective_from`". Concrete
//! occurrences are derived by [`RecurringCapacityInterval::expand`] for a
//! query window. Expansion is a pure function of the rule, so expanding the
//! same window twice yields identical occurrences and nothing derived from it
//! is ever persisted as ground truth.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::CapacityInterval;
use crate::models::time::{from_datetime, to_datetime, TICKS_PER_DAY};
use crate::models::{IntervalId, StageUsage, Ticks};

/// Which days an occurrence falls on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recurrence {
    /// Every `every_n_days` days, counted from the first effective day.
    Daily { every_n_days: u32 },
    /// On the listed weekdays.
    Weekly { days: Vec<Weekday> },
    /// On one day of every month; months without that day are skipped.
    Monthly { day_of_month: u32 },
    /// On one date every year; Feb 29 occurs on leap years only.
    Yearly { month: u32, day: u32 },
}

impl Recurrence {
    /// Monday through Friday.
    pub fn weekdays() -> Self {
        Recurrence::Weekly {
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }

    fn matches(&self, date: NaiveDate, first: NaiveDate) -> bool {
        match self {
            Recurrence::Daily { every_n_days } => {
                let n = i64::from((*every_n_days).max(1));
                (date - first).num_days().rem_euclid(n) == 0
            }
            Recurrence::Weekly { days } => days.contains(&date.weekday()),
            Recurrence::Monthly { day_of_month } => date.day() == *day_of_month,
            Recurrence::Yearly { month, day } => date.month() == *month && date.day() == *day,
        }
    }
}

/// Per-occurrence override of staffing or overtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceOverride {
    /// Day (midnight ticks) of the occurrence being overridden.
    pub date: Ticks,
    pub nbr_of_people: Option<f64>,
    pub overtime: Option<bool>,
}

/// A capacity pattern repeating on a calendar rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringCapacityInterval {
    pub id: IntervalId,
    /// Offset from midnight of each occurrence's start.
    pub shift_start: Ticks,
    pub duration: Ticks,
    pub recurrence: Recurrence,
    /// First time the rule applies; occurrences starting earlier are skipped.
    pub effective_from: Ticks,
    /// Occurrences starting at or after this time are skipped.
    pub effective_until: Option<Ticks>,
    /// Total occurrences the series produces, counted from `effective_from`.
    pub max_occurrences: Option<u32>,
    /// Days (midnight ticks) whose occurrence is cancelled.
    pub exceptions: Vec<Ticks>,
    pub overrides: Vec<OccurrenceOverride>,
    pub nbr_of_people: f64,
    pub usage: StageUsage,
    pub can_start_activity: bool,
    pub overtime: bool,
    pub use_only_when_late: bool,
}

impl RecurringCapacityInterval {
    pub fn new(
        id: IntervalId,
        shift_start: Ticks,
        duration: Ticks,
        recurrence: Recurrence,
        effective_from: Ticks,
    ) -> Self {
        Self {
            id,
            shift_start,
            duration,
            recurrence,
            effective_from,
            effective_until: None,
            max_occurrences: None,
            exceptions: Vec::new(),
            overrides: Vec::new(),
            nbr_of_people: 1.0,
            usage: StageUsage::production(),
            can_start_activity: true,
            overtime: false,
            use_only_when_late: false,
        }
    }

    pub fn with_until(mut self, until: Ticks) -> Self {
        self.effective_until = Some(until);
        self
    }

    pub fn with_max_occurrences(mut self, count: u32) -> Self {
        self.max_occurrences = Some(count);
        self
    }

    pub fn with_exception(mut self, date: Ticks) -> Self {
        self.exceptions.push(date);
        self
    }

    pub fn with_override(mut self, over: OccurrenceOverride) -> Self {
        self.overrides.push(over);
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

    /// Concrete occurrences overlapping `[from, to)`.
    ///
    /// Occurrences are returned whole (not clipped), ordered by start.
    pub fn expand(&self, from: Ticks, to: Ticks) -> Vec<CapacityInterval> {
        let mut out = Vec::new();
        if to <= from || self.duration <= 0 {
            return out;
        }
        let Some(first) = to_datetime(self.effective_from).map(|d| d.date()) else {
            return out;
        };
        let last_start = match self.effective_until {
            Some(until) => until.min(to),
            None => to,
        };

        let mut date = first;
        let mut produced: u32 = 0;
        loop {
            let midnight = from_datetime(date.and_time(chrono::NaiveTime::MIN));
            let start = midnight + self.shift_start;
            if start >= last_start {
                break;
            }
            if let Some(max) = self.max_occurrences {
                if produced >= max {
                    break;
                }
            }
            if start >= self.effective_from && self.recurrence.matches(date, first) {
                produced += 1;
                let end = start + self.duration;
                if !self.exceptions.contains(&midnight) && end > from {
                    out.push(self.occurrence(midnight, start, end));
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        out
    }

    fn occurrence(&self, midnight: Ticks, start: Ticks, end: Ticks) -> CapacityInterval {
        let over = self.overrides.iter().find(|o| o.date == midnight);
        CapacityInterval {
            id: self.id,
            start,
            end,
            nbr_of_people: over
                .and_then(|o| o.nbr_of_people)
                .unwrap_or(self.nbr_of_people),
            usage: self.usage,
            can_start_activity: self.can_start_activity,
            overtime: over.and_then(|o| o.overtime).unwrap_or(self.overtime),
            use_only_when_late: self.use_only_when_late,
        }
    }
}

/// Midnight (ticks) of the day containing `time`.
pub fn day_start(time: Ticks) -> Ticks {
    time - time.rem_euclid(TICKS_PER_DAY)
}
