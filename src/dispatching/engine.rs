//! Rule engine for multi-criteria sequencing.
//!
//! Composes dispatching rules into a dispatcher key: the dispatch tier, then
//! each rule's score in order. Later rules only matter when earlier ones tie.
//!
//! # Reference
//! Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

use std::sync::Arc;

use super::{DispatchTier, DispatchingRule, KeyStrategy, ReadyActivity, RuleScore};

/// Key built by a [`RuleEngine`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RuleKey {
    pub tier: DispatchTier,
    pub scores: Vec<RuleScore>,
}

/// A composable rule chain.
///
/// # Example
/// ```
/// use u_aps::dispatching::{rules, RuleEngine};
///
/// let engine = RuleEngine::new()
///     .with_rule(rules::Edd)
///     .with_tie_breaker(rules::Spt);
/// assert_eq!(engine.rule_names(), vec!["EDD", "SPT"]);
/// ```
#[derive(Clone, Default)]
pub struct RuleEngine {
    rules: Vec<Arc<dyn DispatchingRule>>,
}

impl RuleEngine {
    /// Creates an empty rule engine.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds the primary rule.
    pub fn with_rule<R: DispatchingRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Adds a rule consulted only when all earlier rules tie.
    pub fn with_tie_breaker<R: DispatchingRule + 'static>(self, rule: R) -> Self {
        self.with_rule(rule)
    }

    /// Scores from each rule, in chain order.
    pub fn evaluate(&self, ready: &ReadyActivity) -> Vec<RuleScore> {
        self.rules.iter().map(|r| r.evaluate(ready)).collect()
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

impl KeyStrategy for RuleEngine {
    type Key = RuleKey;

    fn create_key(&self, ready: &ReadyActivity) -> RuleKey {
        RuleKey {
            tier: ready.tier,
            scores: self.evaluate(ready),
        }
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.rule_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatching::{rules, ReadyActivitiesDispatcher, SortedListDispatcher};
    use crate::models::{ActivityId, JobId};

    fn ready(id: u64, processing: i64, need_date: i64) -> ReadyActivity {
        ReadyActivity::new(ActivityId(id), JobId(id))
            .with_processing(processing)
            .with_need_date(need_date)
    }

    #[test]
    fn test_spt_ordering() {
        let mut d = SortedListDispatcher::new(RuleEngine::new().with_rule(rules::Spt));
        d.add(ready(1, 5000, 0));
        d.add(ready(2, 1000, 0));
        d.add(ready(3, 3000, 0));
        assert_eq!(
            d.ordered(),
            vec![ActivityId(2), ActivityId(3), ActivityId(1)]
        );
    }

    #[test]
    fn test_sequential_with_tie_breaker() {
        let engine = RuleEngine::new()
            .with_rule(rules::Edd)
            .with_tie_breaker(rules::Spt);
        let mut d = SortedListDispatcher::new(engine);
        d.add(ready(1, 2000, 10_000));
        d.add(ready(2, 1000, 10_000));
        // EDD ties, SPT breaks it
        assert_eq!(d.ordered()[0], ActivityId(2));
    }

    #[test]
    fn test_id_is_final_tie_breaker() {
        let mut d = SortedListDispatcher::new(RuleEngine::new().with_rule(rules::Spt));
        d.add(ready(9, 1000, 0));
        d.add(ready(4, 1000, 0));
        assert_eq!(d.ordered(), vec![ActivityId(4), ActivityId(9)]);
    }

    #[test]
    fn test_tier_dominates_scores() {
        let mut d = SortedListDispatcher::new(RuleEngine::new().with_rule(rules::Spt));
        d.add(ready(1, 1, 0));
        d.add(ready(2, 9999, 0).with_tier(DispatchTier::MoveActivity));
        assert_eq!(d.ordered()[0], ActivityId(2));
    }

    #[test]
    fn test_evaluate_scores() {
        let engine = RuleEngine::new()
            .with_rule(rules::Spt)
            .with_rule(rules::Edd);
        assert_eq!(engine.evaluate(&ready(1, 3000, 20_000)), vec![3000, 20_000]);
        assert!(format!("{engine:?}").contains("SPT"));
    }
}
