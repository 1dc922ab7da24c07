//! Simulation events.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{ActivityId, JobId, MoId, OperationId, PathId, ResourceId, Ticks};

/// Identity of an event within one queue; also its creation sequence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

/// What an event triggers.
///
/// Variants carry ids only; handlers resolve them against the planning
/// graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// The order's release date has been reached.
    ManufacturingOrderReleased { mo: MoId },
    /// The order's (or its job's) hold has expired.
    HoldReleased { job: JobId, mo: MoId },
    /// Every constraint of the operation is satisfied.
    OperationReady { operation: OperationId },
    /// An activity of the operation finished its run on the primary resource.
    OperationFinished {
        operation: OperationId,
        activity: ActivityId,
    },
    /// The predecessor's output is available to the successor, before the
    /// association's transfer span.
    PredecessorOperationAvailable {
        predecessor: OperationId,
        successor: OperationId,
    },
    /// A predecessor order completed.
    PredecessorMOAvailable { predecessor: MoId, successor: MoId },
    /// Material for the operation arrived.
    MaterialAvailable { operation: OperationId },
    /// The path's validity window opened.
    AlternatePathRelease { mo: MoId, path: PathId },
    /// The path's validity window closed; unstarted work on it is abandoned.
    AlternatePathValidityEnd { mo: MoId, path: PathId },
    /// The association's transfer span elapsed; the precedence is satisfied.
    TransferSpan {
        predecessor: OperationId,
        successor: OperationId,
    },
    /// The association's resource-transfer span elapsed.
    ResourceTransferSpan {
        predecessor: OperationId,
        successor: OperationId,
    },
    /// A moved activity's target time was reached.
    Move { activity: ActivityId },
    /// Reserve a moved activity's target slot so no other block takes it.
    PreventMoveIntersection {
        activity: ActivityId,
        resource: ResourceId,
    },
    /// An expedite's target time was reached; the order releases ignoring
    /// its release date and hold.
    MoveTicks { mo: MoId },
    /// Day-skip boundary of a trial build; scheduling stops here.
    TrialEvent { day: i64 },
    /// Retry dispatching on a resource.
    ResourceAvailable { resource: ResourceId },
}

impl EventKind {
    /// Fixed type id.
    pub fn type_id(&self) -> i32 {
        match self {
            EventKind::ManufacturingOrderReleased { .. } => 1,
            EventKind::HoldReleased { .. } => 2,
            EventKind::OperationReady { .. } => 3,
            EventKind::OperationFinished { .. } => 4,
            EventKind::PredecessorOperationAvailable { .. } => 5,
            EventKind::PredecessorMOAvailable { .. } => 6,
            EventKind::MaterialAvailable { .. } => 7,
            EventKind::AlternatePathRelease { .. } => 8,
            EventKind::AlternatePathValidityEnd { .. } => 9,
            EventKind::TransferSpan { .. } => 10,
            EventKind::ResourceTransferSpan { .. } => 11,
            EventKind::Move { .. } => 12,
            EventKind::PreventMoveIntersection { .. } => 13,
            EventKind::MoveTicks { .. } => 14,
            EventKind::TrialEvent { .. } => 15,
            EventKind::ResourceAvailable { .. } => 16,
        }
    }

    /// Processing rank among events sharing a timestamp (lower first).
    ///
    /// Terminations come first, then resource and precedence releases, then
    /// order-level releases, then readiness, then move handling and finally
    /// dispatch retries.
    pub fn rank(&self) -> u8 {
        match self {
            EventKind::TrialEvent { .. } => 0,
            EventKind::AlternatePathValidityEnd { .. } => 1,
            EventKind::OperationFinished { .. } => 2,
            EventKind::ResourceTransferSpan { .. } => 3,
            EventKind::PredecessorOperationAvailable { .. } => 4,
            EventKind::TransferSpan { .. } => 5,
            EventKind::PredecessorMOAvailable { .. } => 6,
            EventKind::ManufacturingOrderReleased { .. } => 7,
            EventKind::HoldReleased { .. } => 8,
            EventKind::AlternatePathRelease { .. } => 9,
            EventKind::MoveTicks { .. } => 10,
            EventKind::MaterialAvailable { .. } => 11,
            EventKind::OperationReady { .. } => 12,
            EventKind::PreventMoveIntersection { .. } => 13,
            EventKind::Move { .. } => 14,
            EventKind::ResourceAvailable { .. } => 15,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ManufacturingOrderReleased { .. } => "ManufacturingOrderReleased",
            EventKind::HoldReleased { .. } => "HoldReleased",
            EventKind::OperationReady { .. } => "OperationReady",
            EventKind::OperationFinished { .. } => "OperationFinished",
            EventKind::PredecessorOperationAvailable { .. } => "PredecessorOperationAvailable",
            EventKind::PredecessorMOAvailable { .. } => "PredecessorMOAvailable",
            EventKind::MaterialAvailable { .. } => "MaterialAvailable",
            EventKind::AlternatePathRelease { .. } => "AlternatePathRelease",
            EventKind::AlternatePathValidityEnd { .. } => "AlternatePathValidityEnd",
            EventKind::TransferSpan { .. } => "TransferSpan",
            EventKind::ResourceTransferSpan { .. } => "ResourceTransferSpan",
            EventKind::Move { .. } => "Move",
            EventKind::PreventMoveIntersection { .. } => "PreventMoveIntersection",
            EventKind::MoveTicks { .. } => "MoveTicks",
            EventKind::TrialEvent { .. } => "TrialEvent",
            EventKind::ResourceAvailable { .. } => "ResourceAvailable",
        }
    }
}

/// A timestamped, cancellable trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub time: Ticks,
    pub kind: EventKind,
    pub cancelled: bool,
}

impl Event {
    /// Total ordering key: `(time, type rank, creation sequence)`.
    #[inline]
    pub fn key(&self) -> EventKey {
        EventKey {
            time: self.time,
            rank: self.kind.rank(),
            seq: self.id.0,
        }
    }
}

/// Queue ordering key of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub time: Ticks,
    pub rank: u8,
    pub seq: u64,
}
