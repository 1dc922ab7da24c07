//! Live scenario and its transmission pipeline.
//!
//! A [`Scenario`] owns one [`ScenarioDetail`] behind a timed reader/writer
//! lock. Transmissions are applied under the write lock as one unit:
//!
//! 1. Encode the current detail and summary (rollback and undo bytes).
//! 2. Validate, mutate and re-simulate.
//! 3. On failure restore the encoded state; readers never see a partial
//!    change.
//! 4. On success diff the before and after graphs into audit entries, push
//!    an undo record and bump the summary version.
//!
//! Logging happens after the lock is released.

mod audit;
mod changes;
mod detail;
mod lock;
mod logger;
mod moves;
mod transmissions;
mod undo;

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug_span, info, warn};

pub use audit::{diff, AuditEntry, Auditable, FieldChange, ObjectType};
pub use changes::{EntityChanges, ScenarioDataChanges};
pub use detail::{RetiredIds, ScenarioDetail, ScenarioSummary};
pub use lock::ScenarioLock;
pub use logger::{LogRecord, MemoryLogger, ScenarioLogger, TracingLogger};
pub use moves::{MoveFailure, MoveOutcome, MoveProblems};
pub use transmissions::{
    ActivityFinishT, ActivityMoveT, ActivityStatusT, AlternatePathChangeT, AlternatePathDeleteT,
    ClockAdvanceT, HelperRequirementDeleteT, JobDeleteT, JobExpediteT, JobInsertT,
    ManufacturingOrderDeleteT, OptimizeT, ResourceCapacityT, ResourceInsertT, ScenarioOptionsT,
    Transmission,
};
pub use undo::{UndoRecord, UndoStack};

use crate::codec;
use crate::config::EngineConfig;
use crate::error::{ApsError, DesyncError, LockTimeout};
use crate::simulation::{NoHooks, SimulationHooks, SimulationMode, SimulationReport};

/// Everything guarded by the scenario lock.
#[derive(Debug)]
pub struct ScenarioState {
    pub detail: ScenarioDetail,
    pub summary: ScenarioSummary,
    undo: UndoStack,
}

impl ScenarioState {
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }
}

/// Encoded detail and summary, as used by trial copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSnapshot {
    pub detail: Vec<u8>,
    pub summary: Vec<u8>,
}

impl ScenarioSnapshot {
    /// A private copy of the detail.
    pub fn restore_detail(&self) -> Result<ScenarioDetail, ApsError> {
        Ok(ScenarioDetail::restore(&self.detail)?)
    }

    pub fn restore_summary(&self) -> Result<ScenarioSummary, ApsError> {
        Ok(codec::decode(&self.summary)?)
    }
}

/// What one received transmission did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveOutcome {
    /// Summary version after the transmission.
    pub version: u64,
    pub changes: ScenarioDataChanges,
    pub audit: Vec<AuditEntry>,
    /// `None` when the transmission was refused without mutating.
    pub report: Option<SimulationReport>,
    pub move_outcome: Option<MoveOutcome>,
}

/// A live scenario.
#[derive(Debug)]
pub struct Scenario {
    state: ScenarioLock<ScenarioState>,
    config: EngineConfig,
    logger: Arc<dyn ScenarioLogger>,
    hooks: Arc<dyn SimulationHooks>,
}

impl Scenario {
    /// Validates `detail`, simulates it and wraps it.
    pub fn new(
        name: impl Into<String>,
        detail: ScenarioDetail,
        config: EngineConfig,
    ) -> Result<Self, ApsError> {
        Self::with_collaborators(name, detail, config, Arc::new(TracingLogger), Arc::new(NoHooks))
    }

    pub fn with_collaborators(
        name: impl Into<String>,
        mut detail: ScenarioDetail,
        config: EngineConfig,
        logger: Arc<dyn ScenarioLogger>,
        hooks: Arc<dyn SimulationHooks>,
    ) -> Result<Self, ApsError> {
        config.validate()?;
        detail.validate()?;
        detail.simulate(SimulationMode::Optimize, hooks.as_ref())?;
        let mut summary = ScenarioSummary::new(name);
        summary.kpi = Some(detail.kpi());
        let state = ScenarioState {
            detail,
            summary,
            undo: UndoStack::new(config.undo.max_depth),
        };
        Ok(Self {
            state: ScenarioLock::new(state, &config.lock),
            config,
            logger,
            hooks,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hooks(&self) -> &dyn SimulationHooks {
        self.hooks.as_ref()
    }

    /// Runs `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&ScenarioState) -> R) -> Result<R, LockTimeout> {
        let state = self.state.read()?;
        Ok(f(&state))
    }

    pub fn summary(&self) -> Result<ScenarioSummary, LockTimeout> {
        self.read(|s| s.summary.clone())
    }

    /// Encodes the live detail and summary for trial copies.
    pub fn snapshot(&self) -> Result<ScenarioSnapshot, ApsError> {
        let state = self.state.read()?;
        Ok(ScenarioSnapshot {
            detail: state.detail.snapshot()?,
            summary: codec::encode(&state.summary)?,
        })
    }

    /// SHA-256 of the encoded detail, hex encoded.
    pub fn checksum(&self) -> Result<String, ApsError> {
        let state = self.state.read()?;
        Ok(checksum_of(&state.detail.snapshot()?))
    }

    /// Compares a client's checksum with the live state.
    pub fn verify_checksum(&self, expected: &str) -> Result<(), ApsError> {
        let actual = self.checksum()?;
        if actual != expected {
            warn!(%expected, %actual, "scenario checksum mismatch");
            return Err(DesyncError {
                expected: expected.to_string(),
                actual,
            }
            .into());
        }
        Ok(())
    }

    /// Applies one transmission under the write lock.
    pub fn receive(&self, transmission: &Transmission) -> Result<ReceiveOutcome, ApsError> {
        let id = transmission.unique_id();
        let span = debug_span!("transmission", id, name = transmission.name());
        let _guard = span.enter();

        let result = self.receive_locked(transmission);
        match &result {
            Ok(outcome) => {
                for entry in &outcome.audit {
                    self.logger.log_audit(entry);
                }
                self.logger.log_transmission(id, outcome.version, &outcome.changes);
            }
            Err(error) => self.logger.log_exception(id, error),
        }
        result
    }

    /// Applies transmissions in order under one write lock. If any of them
    /// fails, the detail, summary and undo history from before the first
    /// are restored and the error is returned.
    pub fn receive_all(&self, transmissions: &[Transmission]) -> Result<Vec<ReceiveOutcome>, ApsError> {
        if transmissions.is_empty() {
            return Ok(Vec::new());
        }
        let span = debug_span!("transmissions", count = transmissions.len());
        let _guard = span.enter();

        match self.receive_all_locked(transmissions) {
            Ok(outcomes) => {
                for (t, outcome) in transmissions.iter().zip(&outcomes) {
                    for entry in &outcome.audit {
                        self.logger.log_audit(entry);
                    }
                    self.logger.log_transmission(t.unique_id(), outcome.version, &outcome.changes);
                }
                Ok(outcomes)
            }
            Err((failed, error)) => {
                self.logger.log_exception(transmissions[failed].unique_id(), &error);
                Err(error)
            }
        }
    }

    fn receive_all_locked(
        &self,
        transmissions: &[Transmission],
    ) -> Result<Vec<ReceiveOutcome>, (usize, ApsError)> {
        let mut guard = self.state.write().map_err(|e| (0, ApsError::from(e)))?;
        let state = &mut *guard;
        let (detail, summary, undo) = (state.detail.clone(), state.summary.clone(), state.undo.clone());
        let mut outcomes = Vec::with_capacity(transmissions.len());
        for (i, t) in transmissions.iter().enumerate() {
            match self.apply_locked(state, t) {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    warn!(%error, applied = i, "transmission batch rolled back");
                    state.detail = detail;
                    state.summary = summary;
                    state.undo = undo;
                    return Err((i, error));
                }
            }
        }
        Ok(outcomes)
    }

    fn receive_locked(&self, transmission: &Transmission) -> Result<ReceiveOutcome, ApsError> {
        let mut guard = self.state.write()?;
        self.apply_locked(&mut guard, transmission)
    }

    fn apply_locked(
        &self,
        state: &mut ScenarioState,
        transmission: &Transmission,
    ) -> Result<ReceiveOutcome, ApsError> {
        let before = state.detail.snapshot()?;
        let before_summary = codec::encode(&state.summary)?;
        // Nothing fallible runs between the mutation and its rollback.
        let old = ScenarioDetail::restore(&before)?;

        let applied = match transmission.apply(&mut state.detail, self.hooks.as_ref()) {
            Ok(applied) => applied,
            Err(error) => {
                warn!(%error, "transmission rolled back");
                state.detail = old;
                return Err(error);
            }
        };
        let Some(report) = applied.report else {
            return Ok(ReceiveOutcome {
                version: state.summary.version,
                changes: ScenarioDataChanges::default(),
                audit: Vec::new(),
                report: None,
                move_outcome: applied.move_outcome,
            });
        };

        let audit = diff(
            &old.jobs,
            &old.resources,
            &state.detail.jobs,
            &state.detail.resources,
        );
        let changes = ScenarioDataChanges::from_audit(&audit)
            .with_schedule_changed(old.schedule.blocks != state.detail.schedule.blocks);

        let id = transmission.unique_id();
        state.undo.push(UndoRecord {
            transmission: id,
            detail: before,
            summary: before_summary,
        });
        let kpi = state.detail.kpi();
        let summary = &mut state.summary;
        summary.version += 1;
        summary.last_transmission = Some(id);
        summary.kpi = Some(kpi);
        info!(version = summary.version, audit = audit.len(), "transmission applied");

        Ok(ReceiveOutcome {
            version: summary.version,
            changes,
            audit,
            report: Some(report),
            move_outcome: applied.move_outcome,
        })
    }

    /// Restores the state from before the most recent transmission.
    pub fn undo(&self) -> Result<u64, ApsError> {
        let mut state = self.state.write()?;
        let record = state.undo.pop().ok_or(ApsError::NothingToUndo)?;
        let detail = ScenarioDetail::restore(&record.detail)?;
        let mut summary: ScenarioSummary = codec::decode(&record.summary)?;
        summary.version = state.summary.version + 1;
        state.detail = detail;
        state.summary = summary;
        info!(
            transmission = record.transmission,
            version = state.summary.version,
            "transmission undone"
        );
        Ok(state.summary.version)
    }
}

fn checksum_of(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use crate::error::{LockMode, SimulationError};
    use crate::models::time::hours;
    use crate::models::{ActivityId, JobId, ResourceId};
    use crate::simulation::{ChangeableValues, StageView};
    use super::detail::tests::{detail, job, op};

    fn scenario() -> Scenario {
        Scenario::new("base", detail(), EngineConfig::default()).unwrap()
    }

    fn insert(id: u64) -> Transmission {
        JobInsertT { jobs: vec![job(id, vec![op(id * 10 + 1, 1, hours(1), &[2])])] }.into()
    }

    #[test]
    fn test_new_simulates() {
        let s = scenario();
        let summary = s.summary().unwrap();
        assert_eq!(summary.version, 0);
        assert_eq!(summary.kpi.unwrap().unscheduled_count, 0);
        assert!(s.read(|st| st.detail.schedule.is_scheduled(ActivityId(21))).unwrap());
    }

    #[test]
    fn test_receive_audits_and_versions() {
        let log = Arc::new(MemoryLogger::new());
        let s = Scenario::with_collaborators(
            "base",
            detail(),
            EngineConfig::default(),
            log.clone(),
            Arc::new(NoHooks),
        )
        .unwrap();

        let outcome = s.receive(&insert(3)).unwrap();
        assert_eq!(outcome.version, 1);
        assert!(outcome.changes.schedule_changed);
        assert!(outcome.changes.of(ObjectType::Job).unwrap().added.contains(&3));
        assert_eq!(outcome.audit.len(), 5);
        assert_eq!(s.summary().unwrap().last_transmission, Some(1001));

        let records = log.records();
        assert_eq!(log.audit_entries(), outcome.audit);
        assert!(matches!(
            records.last(),
            Some(LogRecord::Transmission { transmission: 1001, version: 1, .. })
        ));
    }

    #[test]
    fn test_failed_transmission_rolls_back() {
        let log = Arc::new(MemoryLogger::new());
        let s = Scenario::with_collaborators(
            "base",
            detail(),
            EngineConfig::default(),
            log.clone(),
            Arc::new(NoHooks),
        )
        .unwrap();
        let before = s.checksum().unwrap();

        // Expediting a known and an unknown job fails after nothing changed.
        let bad: Transmission = JobExpediteT::new(vec![JobId(1), JobId(404)], 0).into();
        let err = s.receive(&bad).unwrap_err();
        assert!(err.is_handleable());
        assert_eq!(s.checksum().unwrap(), before);
        assert_eq!(s.summary().unwrap().version, 0);
        assert!(matches!(
            log.records().last(),
            Some(LogRecord::Exception { transmission: 1005, .. })
        ));
    }

    #[test]
    fn test_receive_all_is_one_unit() {
        let log = Arc::new(MemoryLogger::new());
        let s = Scenario::with_collaborators(
            "base",
            detail(),
            EngineConfig::default(),
            log.clone(),
            Arc::new(NoHooks),
        )
        .unwrap();
        let before = s.checksum().unwrap();

        let bad: Transmission = JobExpediteT::new(vec![JobId(404)], 0).into();
        let err = s.receive_all(&[insert(3), bad]).unwrap_err();
        assert!(err.is_handleable());
        assert_eq!(s.checksum().unwrap(), before);
        assert_eq!(s.summary().unwrap().version, 0);
        assert_eq!(s.read(|st| st.undo_depth()).unwrap(), 0);
        assert!(matches!(
            log.records().last(),
            Some(LogRecord::Exception { transmission: 1005, .. })
        ));

        let outcomes = s.receive_all(&[insert(3), insert(4)]).unwrap();
        assert_eq!(outcomes.iter().map(|o| o.version).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(s.read(|st| st.undo_depth()).unwrap(), 2);
        assert!(s.receive_all(&[]).unwrap().is_empty());
    }

    #[derive(Debug)]
    struct FailAfterFirst(parking_lot::Mutex<u32>);

    impl SimulationHooks for FailAfterFirst {
        fn end_of_simulation(
            &self,
            _view: StageView<'_>,
        ) -> Result<Option<ChangeableValues>, SimulationError> {
            let mut runs = self.0.lock();
            *runs += 1;
            if *runs > 1 {
                return Err(SimulationError::Hook("package refused".into()));
            }
            Ok(None)
        }
    }

    #[test]
    fn test_simulation_error_rolls_back_mutation() {
        let s = Scenario::with_collaborators(
            "base",
            detail(),
            EngineConfig::default(),
            Arc::new(MemoryLogger::new()),
            Arc::new(FailAfterFirst(parking_lot::Mutex::new(0))),
        )
        .unwrap();
        let before = s.checksum().unwrap();
        let err = s.receive(&insert(3)).unwrap_err();
        assert!(matches!(err, ApsError::Simulation(SimulationError::Hook(_))));
        assert!(!err.is_handleable());
        assert_eq!(s.checksum().unwrap(), before);
        assert!(!s.read(|st| st.detail.jobs.contains_key(&JobId(3))).unwrap());
        assert_eq!(s.read(|st| st.undo_depth()).unwrap(), 0);
    }

    #[test]
    fn test_undo_restores_previous_state() {
        let s = scenario();
        let base = s.checksum().unwrap();
        s.receive(&insert(3)).unwrap();
        let one = s.checksum().unwrap();
        s.receive(&insert(4)).unwrap();

        assert_eq!(s.undo().unwrap(), 3);
        assert_eq!(s.checksum().unwrap(), one);
        s.undo().unwrap();
        assert_eq!(s.checksum().unwrap(), base);
        assert!(matches!(s.undo(), Err(ApsError::NothingToUndo)));
    }

    #[test]
    fn test_undo_depth_bound() {
        let s = Scenario::new("base", detail(), EngineConfig::default().with_undo_depth(1)).unwrap();
        s.receive(&insert(3)).unwrap();
        s.receive(&insert(4)).unwrap();
        assert_eq!(s.read(|st| st.undo_depth()).unwrap(), 1);
        s.undo().unwrap();
        assert!(s.read(|st| st.detail.jobs.contains_key(&JobId(3))).unwrap());
        assert!(matches!(s.undo(), Err(ApsError::NothingToUndo)));
    }

    #[test]
    fn test_refused_move_is_not_versioned() {
        let s = scenario();
        // Op 11 is only eligible on M1.
        let mv: Transmission = ActivityMoveT::new(ActivityId(11), ResourceId(2), hours(1)).into();
        let outcome = s.receive(&mv).unwrap();
        assert!(outcome.report.is_none());
        assert_eq!(outcome.move_outcome.unwrap().failure, MoveFailure::ALL_BLOCKS_HAD_PROBLEMS);
        assert_eq!(outcome.version, 0);
        assert!(outcome.changes.is_empty());
        assert!(matches!(s.undo(), Err(ApsError::NothingToUndo)));
    }

    #[test]
    fn test_checksum_desync() {
        let s = scenario();
        let client = s.checksum().unwrap();
        assert_eq!(client.len(), 64);
        s.verify_checksum(&client).unwrap();

        s.receive(&insert(3)).unwrap();
        let err = s.verify_checksum(&client).unwrap_err();
        assert!(matches!(err, ApsError::Desync(DesyncError { ref expected, .. }) if *expected == client));
        assert!(!err.is_handleable());
    }

    #[test]
    fn test_snapshot_copies_are_private() {
        let s = scenario();
        let snap = s.snapshot().unwrap();
        let mut copy = snap.restore_detail().unwrap();
        copy.jobs.clear();
        assert_eq!(snap.restore_summary().unwrap().name, "base");
        assert_eq!(s.read(|st| st.detail.jobs.len()).unwrap(), 2);
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let run = || {
            let s = scenario();
            let log: Vec<Transmission> = vec![
                insert(3),
                ActivityMoveT::new(ActivityId(12), ResourceId(2), hours(7)).into(),
                ClockAdvanceT { clock: hours(2) }.into(),
                OptimizeT { clear_pins: false }.into(),
            ];
            for t in &log {
                let bytes = t.encode().unwrap();
                s.receive(&Transmission::decode(&bytes).unwrap()).unwrap();
            }
            let snap = s.snapshot().unwrap();
            let order = s.read(|st| st.detail.schedule.dispatch_order.clone()).unwrap();
            (snap.detail, order)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_reader_times_out_while_writer_holds() {
        let config = EngineConfig::default().with_lock_timeouts(20, 20);
        let s = Arc::new(Scenario::new("base", detail(), config).unwrap());
        let (held, hold) = mpsc::channel();
        let (release, released) = mpsc::channel::<()>();

        let writer = {
            let s = Arc::clone(&s);
            thread::spawn(move || {
                let _guard = s.state.write_for(Duration::from_secs(5)).unwrap();
                held.send(()).unwrap();
                released.recv().unwrap();
            })
        };
        hold.recv().unwrap();

        match s.summary() {
            Err(LockTimeout { mode, .. }) => assert_eq!(mode, LockMode::Read),
            Ok(_) => panic!("read succeeded while the writer held the lock"),
        }
        let err = s.receive(&insert(3)).unwrap_err();
        assert!(matches!(err, ApsError::LockTimeout(_)));
        assert!(err.is_handleable());

        release.send(()).unwrap();
        writer.join().unwrap();
        assert_eq!(s.summary().unwrap().version, 0);
    }
}
