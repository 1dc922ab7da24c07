//! Strongly typed identifiers.
//!
//! Every planning entity is identified by a `u64` drawn from the scenario's
//! [`IdGenerator`]. Ids are issued monotonically and never reused within a
//! scenario's lifetime, so an id observed in an audit trail or undo snapshot
//! always refers to the same entity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generate a typed id wrapper around `u64`.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
        $vis struct $name(pub u64);

        impl $name {
            /// Raw integer value.
            #[inline(always)]
            pub fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<$name> for u64 {
            #[inline(always)]
            fn from(id: $name) -> u64 {
                id.0
            }
        }
    };
}

typed_id! {
    /// Identifies a [`Job`](super::Job).
    pub struct JobId;
}

typed_id! {
    /// Identifies a [`ManufacturingOrder`](super::ManufacturingOrder).
    pub struct MoId;
}

typed_id! {
    /// Identifies an [`AlternatePath`](super::AlternatePath).
    pub struct PathId;
}

typed_id! {
    /// Identifies an [`Operation`](super::Operation).
    pub struct OperationId;
}

typed_id! {
    /// Identifies an [`Activity`](super::Activity).
    pub struct ActivityId;
}

typed_id! {
    /// Identifies a [`ResourceRequirement`](super::ResourceRequirement).
    pub struct RequirementId;
}

typed_id! {
    /// Identifies a [`Resource`](super::Resource).
    pub struct ResourceId;
}

typed_id! {
    /// Identifies a [`ResourceBlock`](super::ResourceBlock).
    pub struct BlockId;
}

typed_id! {
    /// Identifies a batch of blocks sharing one time slot on a resource.
    pub struct BatchId;
}

typed_id! {
    /// Identifies a capacity interval (one-off or recurring).
    pub struct IntervalId;
}

/// Monotonic id source owned by a scenario.
///
/// The counter is part of the scenario snapshot, so a restored scenario keeps
/// issuing ids after the highest one it has ever handed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    /// Creates a generator whose first id is 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Issues the next raw id.
    pub fn next_raw(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The id that will be issued next.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Ensures future ids are strictly greater than `seen`.
    ///
    /// Used when externally supplied entities carry ids of their own.
    pub fn observe(&mut self, seen: u64) {
        if seen >= self.next {
            self.next = seen + 1;
        }
    }

    pub fn job(&mut self) -> JobId {
        JobId(self.next_raw())
    }

    pub fn mo(&mut self) -> MoId {
        MoId(self.next_raw())
    }

    pub fn path(&mut self) -> PathId {
        PathId(self.next_raw())
    }

    pub fn operation(&mut self) -> OperationId {
        OperationId(self.next_raw())
    }

    pub fn activity(&mut self) -> ActivityId {
        ActivityId(self.next_raw())
    }

    pub fn requirement(&mut self) -> RequirementId {
        RequirementId(self.next_raw())
    }

    pub fn resource(&mut self) -> ResourceId {
        ResourceId(self.next_raw())
    }

    pub fn block(&mut self) -> BlockId {
        BlockId(self.next_raw())
    }

    pub fn batch(&mut self) -> BatchId {
        BatchId(self.next_raw())
    }

    pub fn interval(&mut self) -> IntervalId {
        IntervalId(self.next_raw())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
