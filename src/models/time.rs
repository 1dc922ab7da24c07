//! Tick time model.
//!
//! All times in the engine are `i64` ticks of 100 nanoseconds. Tick 0 is
//! `1970-01-01T00:00:00` (naive, plant-local time); calendar arithmetic for
//! recurring capacity goes through [`to_datetime`] / [`from_datetime`].
//!
//! Integer ticks keep schedule arithmetic exact, which the determinism
//! guarantees of the simulation depend on.

use chrono::{DateTime, NaiveDateTime};

/// An absolute time or a span, in 100ns ticks.
pub type Ticks = i64;

pub const TICKS_PER_MILLISECOND: Ticks = 10_000;
pub const TICKS_PER_SECOND: Ticks = 10_000_000;
pub const TICKS_PER_MINUTE: Ticks = 60 * TICKS_PER_SECOND;
pub const TICKS_PER_HOUR: Ticks = 60 * TICKS_PER_MINUTE;
pub const TICKS_PER_DAY: Ticks = 24 * TICKS_PER_HOUR;

/// Latest representable time; used as "open ended".
pub const END_OF_TIME: Ticks = i64::MAX / 4;

/// Converts ticks to a naive date-time.
///
/// Returns `None` when the value is outside chrono's representable range.
pub fn to_datetime(ticks: Ticks) -> Option<NaiveDateTime> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
}

/// Converts a naive date-time to ticks.
pub fn from_datetime(dt: NaiveDateTime) -> Ticks {
    let utc = dt.and_utc();
    utc.timestamp() * TICKS_PER_SECOND + (utc.timestamp_subsec_nanos() / 100) as Ticks
}

/// Whole days as ticks.
#[inline]
pub fn days(n: i64) -> Ticks {
    n.saturating_mul(TICKS_PER_DAY)
}

/// Whole hours as ticks.
#[inline]
pub fn hours(n: i64) -> Ticks {
    n * TICKS_PER_HOUR
}

/// Whole minutes as ticks.
#[inline]
pub fn minutes(n: i64) -> Ticks {
    n * TICKS_PER_MINUTE
}

/// Milliseconds as ticks.
#[inline]
pub fn millis(n: i64) -> Ticks {
    n * TICKS_PER_MILLISECOND
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, Weekday};

    #[test]
    fn test_days_saturate() {
        assert_eq!(days(2), 2 * TICKS_PER_DAY);
        assert_eq!(days(i64::MAX), i64::MAX);
    }

    #[test]
    fn test_epoch_is_thursday() {
        let dt = to_datetime(0).unwrap();
        assert_eq!(dt.weekday(), Weekday::Thu);
        assert_eq!(dt.year(), 1970);
    }

    #[test]
    fn test_datetime_round_trip() {
        let dt = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap();
        let ticks = from_datetime(dt);
        assert_eq!(to_datetime(ticks), Some(dt));
    }

    #[test]
    fn test_units() {
        assert_eq!(days(1), 864_000_000_000);
        assert_eq!(hours(24), days(1));
        assert_eq!(minutes(60), hours(1));
        assert_eq!(millis(1000), TICKS_PER_SECOND);
    }

    #[test]
    fn test_negative_ticks() {
        let dt = to_datetime(-TICKS_PER_DAY).unwrap();
        assert_eq!(dt.day(), 31);
        assert_eq!(from_datetime(dt), -TICKS_PER_DAY);
    }
}
