//! Built-in dispatching rules.
//!
//! # Categories
//!
//! - **Time-based**: SPT, LPT
//! - **Due-date**: EDD, MST
//! - **Queue**: FIFO
//! - **Priority**: PRIORITY
//!
//! # Score Convention
//! All rules return lower scores for higher priority activities.
//!
//! # References
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 4
//! - Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

use super::{DispatchingRule, ReadyActivity, RuleScore};

// ======================== Time-based rules ========================

/// Shortest Processing Time.
///
/// Prioritizes activities holding their primary resource for less time.
///
/// # Reference
/// Smith (1956), optimal for minimizing mean flow time on single machine.
#[derive(Debug, Clone, Copy)]
pub struct Spt;

impl DispatchingRule for Spt {
    fn name(&self) -> &'static str {
        "SPT"
    }

    fn evaluate(&self, ready: &ReadyActivity) -> RuleScore {
        ready.processing
    }

    fn description(&self) -> &'static str {
        "Shortest Processing Time"
    }
}

/// Longest Processing Time.
#[derive(Debug, Clone, Copy)]
pub struct Lpt;

impl DispatchingRule for Lpt {
    fn name(&self) -> &'static str {
        "LPT"
    }

    fn evaluate(&self, ready: &ReadyActivity) -> RuleScore {
        -ready.processing
    }

    fn description(&self) -> &'static str {
        "Longest Processing Time"
    }
}

// ======================== Due-date rules ========================

/// Earliest Due Date (job need date).
///
/// Jobs without a need date carry the end of time and sort last.
///
/// # Reference
/// Jackson (1955), optimal for minimizing maximum lateness on single machine.
#[derive(Debug, Clone, Copy)]
pub struct Edd;

impl DispatchingRule for Edd {
    fn name(&self) -> &'static str {
        "EDD"
    }

    fn evaluate(&self, ready: &ReadyActivity) -> RuleScore {
        ready.need_date
    }

    fn description(&self) -> &'static str {
        "Earliest Due Date"
    }
}

/// Minimum Slack Time.
///
/// Slack = need date - ready time - processing, evaluated when the activity
/// becomes ready.
#[derive(Debug, Clone, Copy)]
pub struct Mst;

impl DispatchingRule for Mst {
    fn name(&self) -> &'static str {
        "MST"
    }

    fn evaluate(&self, ready: &ReadyActivity) -> RuleScore {
        ready
            .need_date
            .saturating_sub(ready.ready_time)
            .saturating_sub(ready.processing)
    }

    fn description(&self) -> &'static str {
        "Minimum Slack Time"
    }
}

// ======================== Queue rules ========================

/// First In First Out, by ready time.
#[derive(Debug, Clone, Copy)]
pub struct Fifo;

impl DispatchingRule for Fifo {
    fn name(&self) -> &'static str {
        "FIFO"
    }

    fn evaluate(&self, ready: &ReadyActivity) -> RuleScore {
        ready.ready_time
    }

    fn description(&self) -> &'static str {
        "First In First Out"
    }
}

// ======================== Priority-based rule ========================

/// Job priority.
///
/// Higher job priority dispatches first (negated score).
#[derive(Debug, Clone, Copy)]
pub struct Priority;

impl DispatchingRule for Priority {
    fn name(&self) -> &'static str {
        "PRIORITY"
    }

    fn evaluate(&self, ready: &ReadyActivity) -> RuleScore {
        -RuleScore::from(ready.priority)
    }

    fn description(&self) -> &'static str {
        "Job Priority"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityId, JobId};

    fn ready(processing: i64, need_date: i64, ready_time: i64, priority: i32) -> ReadyActivity {
        ReadyActivity::new(ActivityId(1), JobId(1))
            .with_processing(processing)
            .with_need_date(need_date)
            .with_ready_time(ready_time)
            .with_priority(priority)
    }

    #[test]
    fn test_spt_lpt() {
        let short = ready(1000, 0, 0, 0);
        let long = ready(5000, 0, 0, 0);
        assert!(Spt.evaluate(&short) < Spt.evaluate(&long));
        assert!(Lpt.evaluate(&long) < Lpt.evaluate(&short));
    }

    #[test]
    fn test_edd() {
        let early = ready(1000, 10_000, 0, 0);
        let late = ready(1000, 50_000, 0, 0);
        let none = ReadyActivity::new(ActivityId(2), JobId(2));
        assert!(Edd.evaluate(&early) < Edd.evaluate(&late));
        assert!(Edd.evaluate(&late) < Edd.evaluate(&none));
    }

    #[test]
    fn test_mst() {
        // slack = 5000 - 1000 - 3000 = 1000
        let urgent = ready(3000, 5000, 1000, 0);
        // slack = 50000 - 1000 - 3000 = 46000
        let relaxed = ready(3000, 50_000, 1000, 0);
        assert_eq!(Mst.evaluate(&urgent), 1000);
        assert!(Mst.evaluate(&urgent) < Mst.evaluate(&relaxed));
    }

    #[test]
    fn test_fifo() {
        assert!(Fifo.evaluate(&ready(0, 0, 10, 0)) < Fifo.evaluate(&ready(0, 0, 20, 0)));
    }

    #[test]
    fn test_priority() {
        let high = ready(0, 0, 0, 10);
        let low = ready(0, 0, 0, 1);
        assert!(Priority.evaluate(&high) < Priority.evaluate(&low));
    }

    #[test]
    fn test_rule_names() {
        assert_eq!(Spt.name(), "SPT");
        assert_eq!(Edd.description(), "Earliest Due Date");
        assert_eq!(Priority.name(), "PRIORITY");
    }
}
