//! Event and clock.
//!
//! A simulation run is driven by an [`EventQueue`]: handlers consume typed,
//! cancellable [`Event`]s in time order and publish follow-up events no
//! earlier than the clock.
//!
//! # Same-time ordering
//!
//! Events sharing a timestamp are processed by type rank, then creation
//! sequence. Handlers must not rely on the sequence for correctness; two
//! same-time events of equal rank are expected to commute.

mod event;
mod queue;

pub use event::{Event, EventId, EventKey, EventKind};
pub use queue::{EventQueue, Flow, QueueStats, Step};
