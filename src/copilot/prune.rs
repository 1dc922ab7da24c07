//! PruneScenario: simplify a scenario without hurting its schedule.
//!
//! Each [`PruneModule`] proposes transmissions that remove planning data
//! nobody needs. The proposals are applied to a trial copy first; they are
//! safe when every one applies, no more work ends up unscheduled and the
//! KPI does not get worse. Safe proposals are replayed live as one unit. An unsafe
//! module is asked to reconfigure and retried, or dropped.

use std::fmt::Debug;

use tracing::{debug, info, warn};

use super::kpi::{Kpi, Makespan};
use crate::error::ApsError;
use crate::models::{ActivityId, AlternatePath, ProductionStatus};
use crate::scenario::{
    ActivityFinishT, AlternatePathDeleteT, HelperRequirementDeleteT, ManufacturingOrderDeleteT,
    Scenario, ScenarioDetail, ScenarioSnapshot, Transmission,
};
use crate::simulation::SimulationHooks;

const DEFAULT_LIMIT: usize = 16;
const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// One kind of simplification.
pub trait PruneModule: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Transmissions to try; empty when there is nothing to prune.
    fn propose(&self, detail: &ScenarioDetail) -> Vec<Transmission>;

    /// Narrows the next proposal after an unsafe one. Returns `false` when
    /// the module has nothing narrower to offer.
    fn reconfigure(&mut self) -> bool;
}

fn has_progress(path: &AlternatePath) -> bool {
    path.operations
        .values()
        .flat_map(|op| op.activities.values())
        .any(|a| a.status != ProductionStatus::NotStarted)
}

/// Halves a proposal limit; `false` once it reaches zero.
fn halve(limit: &mut usize) -> bool {
    *limit /= 2;
    *limit > 0
}

/// Deletes alternate paths that are not current and carry no progress.
#[derive(Debug, Clone)]
pub struct DeleteUnusedPaths {
    pub limit: usize,
}

impl Default for DeleteUnusedPaths {
    fn default() -> Self {
        Self { limit: DEFAULT_LIMIT }
    }
}

impl PruneModule for DeleteUnusedPaths {
    fn name(&self) -> &'static str {
        "DeleteUnusedPaths"
    }

    fn propose(&self, detail: &ScenarioDetail) -> Vec<Transmission> {
        detail
            .jobs
            .values()
            .flat_map(|j| j.orders.values())
            .flat_map(|mo| {
                mo.paths
                    .values()
                    .filter(move |p| p.id != mo.current_path && !has_progress(p))
                    .map(move |p| Transmission::from(AlternatePathDeleteT { mo: mo.id, path: p.id }))
            })
            .take(self.limit)
            .collect()
    }

    fn reconfigure(&mut self) -> bool {
        halve(&mut self.limit)
    }
}

/// Deletes helper requirements of operations that have not started.
#[derive(Debug, Clone)]
pub struct DeleteHelperRequirements {
    pub limit: usize,
}

impl Default for DeleteHelperRequirements {
    fn default() -> Self {
        Self { limit: DEFAULT_LIMIT }
    }
}

impl PruneModule for DeleteHelperRequirements {
    fn name(&self) -> &'static str {
        "DeleteHelperRequirements"
    }

    fn propose(&self, detail: &ScenarioDetail) -> Vec<Transmission> {
        detail
            .jobs
            .values()
            .flat_map(|j| j.orders.values())
            .filter_map(|mo| mo.current())
            .flat_map(|p| p.operations.values())
            .filter(|op| {
                op.activities
                    .values()
                    .all(|a| a.status == ProductionStatus::NotStarted)
            })
            .flat_map(|op| {
                op.helper_requirements().map(move |r| {
                    Transmission::from(HelperRequirementDeleteT {
                        operation: op.id,
                        requirement: r.id,
                    })
                })
            })
            .take(self.limit)
            .collect()
    }

    fn reconfigure(&mut self) -> bool {
        halve(&mut self.limit)
    }
}

/// Deletes every order of a job but the first, unless it has progress.
#[derive(Debug, Clone)]
pub struct DeleteExtraOrders {
    pub limit: usize,
}

impl Default for DeleteExtraOrders {
    fn default() -> Self {
        Self { limit: DEFAULT_LIMIT }
    }
}

impl PruneModule for DeleteExtraOrders {
    fn name(&self) -> &'static str {
        "DeleteExtraOrders"
    }

    fn propose(&self, detail: &ScenarioDetail) -> Vec<Transmission> {
        detail
            .jobs
            .values()
            .flat_map(|j| j.orders.values().skip(1))
            .filter(|mo| !mo.paths.values().any(has_progress))
            .map(|mo| Transmission::from(ManufacturingOrderDeleteT { mo: mo.id }))
            .take(self.limit)
            .collect()
    }

    fn reconfigure(&mut self) -> bool {
        halve(&mut self.limit)
    }
}

/// Finishes activities the floor has evidently moved past: unfinished work
/// whose successor already started, and started work with no run left.
#[derive(Debug, Clone)]
pub struct FinishStrayActivities {
    pub limit: usize,
}

impl Default for FinishStrayActivities {
    fn default() -> Self {
        Self { limit: DEFAULT_LIMIT }
    }
}

impl FinishStrayActivities {
    fn strays(&self, detail: &ScenarioDetail) -> Vec<ActivityId> {
        let mut out = Vec::new();
        let paths = detail
            .jobs
            .values()
            .flat_map(|j| j.orders.values())
            .filter_map(|mo| mo.current());
        for path in paths {
            for op in path.operations.values() {
                let successor_moved = path
                    .successors_of(op.id)
                    .filter_map(|a| path.operations.get(&a.successor))
                    .flat_map(|s| s.activities.values())
                    .any(|a| a.status != ProductionStatus::NotStarted);
                for act in op.activities.values().filter(|a| !a.is_finished()) {
                    let spent = act.status == ProductionStatus::Started && act.remaining_run == Some(0);
                    if successor_moved || spent {
                        out.push(act.id);
                    }
                }
            }
        }
        out.truncate(self.limit);
        out
    }
}

impl PruneModule for FinishStrayActivities {
    fn name(&self) -> &'static str {
        "FinishStrayActivities"
    }

    fn propose(&self, detail: &ScenarioDetail) -> Vec<Transmission> {
        let activities = self.strays(detail);
        if activities.is_empty() {
            return Vec::new();
        }
        vec![ActivityFinishT { activities }.into()]
    }

    fn reconfigure(&mut self) -> bool {
        halve(&mut self.limit)
    }
}

/// How one module's pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneResult {
    /// This many transmissions were replayed live.
    Applied(usize),
    NothingToDo,
    /// Every attempt was unsafe; the module was removed.
    Dropped { attempts: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneStep {
    pub module: &'static str,
    pub result: PruneResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub steps: Vec<PruneStep>,
}

impl PruneReport {
    /// Transmissions replayed across all modules.
    pub fn applied(&self) -> usize {
        self.steps
            .iter()
            .map(|s| match s.result {
                PruneResult::Applied(n) => n,
                _ => 0,
            })
            .sum()
    }
}

/// Runs prune modules in order against a live scenario.
#[derive(Debug)]
pub struct PruneScenario {
    modules: Vec<Box<dyn PruneModule>>,
    kpi: Box<dyn Kpi>,
    max_attempts: usize,
}

impl Default for PruneScenario {
    /// All built-in modules, judged by [`Makespan`].
    fn default() -> Self {
        Self::empty()
            .with_module(DeleteUnusedPaths::default())
            .with_module(DeleteHelperRequirements::default())
            .with_module(DeleteExtraOrders::default())
            .with_module(FinishStrayActivities::default())
    }
}

impl PruneScenario {
    pub fn empty() -> Self {
        Self {
            modules: Vec::new(),
            kpi: Box::new(Makespan::default()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_module(mut self, module: impl PruneModule + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn with_kpi(mut self, kpi: impl Kpi + 'static) -> Self {
        self.kpi = Box::new(kpi);
        self
    }

    pub fn with_max_attempts(mut self, n: usize) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Names of the modules still active.
    pub fn modules(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// One pass over every module. Dropped modules are removed for later
    /// passes; on error every module not yet dropped is kept.
    pub fn run(&mut self, scenario: &Scenario) -> Result<PruneReport, ApsError> {
        let mut report = PruneReport::default();
        let mut keep = Vec::with_capacity(self.modules.len());
        let mut modules = std::mem::take(&mut self.modules).into_iter();
        while let Some(mut module) = modules.next() {
            let result = match self.prune_with(module.as_mut(), scenario) {
                Ok(result) => result,
                Err(error) => {
                    keep.push(module);
                    keep.extend(modules);
                    self.modules = keep;
                    return Err(error);
                }
            };
            info!(module = module.name(), ?result, "prune step");
            report.steps.push(PruneStep {
                module: module.name(),
                result,
            });
            if !matches!(result, PruneResult::Dropped { .. }) {
                keep.push(module);
            }
        }
        self.modules = keep;
        Ok(report)
    }

    fn prune_with(
        &self,
        module: &mut dyn PruneModule,
        scenario: &Scenario,
    ) -> Result<PruneResult, ApsError> {
        let mut attempts = 0;
        loop {
            let snapshot = scenario.snapshot()?;
            let proposals = module.propose(&snapshot.restore_detail()?);
            if proposals.is_empty() {
                return Ok(PruneResult::NothingToDo);
            }
            if self.is_safe(&snapshot, &proposals, scenario.hooks())? {
                scenario.receive_all(&proposals)?;
                return Ok(PruneResult::Applied(proposals.len()));
            }
            attempts += 1;
            if attempts >= self.max_attempts || !module.reconfigure() {
                warn!(module = module.name(), attempts, "prune module dropped");
                return Ok(PruneResult::Dropped { attempts });
            }
            debug!(module = module.name(), attempts, "prune module reconfigured");
        }
    }

    fn is_safe(
        &self,
        snapshot: &ScenarioSnapshot,
        proposals: &[Transmission],
        hooks: &dyn SimulationHooks,
    ) -> Result<bool, ApsError> {
        let mut trial = snapshot.restore_detail()?;
        let baseline_unscheduled = trial.schedule.unscheduled.len();
        let baseline = self.kpi.score(&trial, &[]);
        for t in proposals {
            match t.apply(&mut trial, hooks) {
                Ok(applied) if applied.report.is_some() => {}
                Ok(_) => return Ok(false),
                Err(error) if error.is_handleable() => {
                    debug!(transmission = t.name(), %error, "prune proposal rejected");
                    return Ok(false);
                }
                Err(ApsError::Simulation(error)) => {
                    debug!(transmission = t.name(), %error, "prune proposal failed to simulate");
                    return Ok(false);
                }
                Err(error) => return Err(error),
            }
        }
        if trial.validate().is_err() || trial.schedule.unscheduled.len() > baseline_unscheduled {
            return Ok(false);
        }
        Ok(!self.kpi.is_better(baseline, self.kpi.score(&trial, &[])))
    }
}
