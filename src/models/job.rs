//! Job and manufacturing order model.
//!
//! A job is a customer-facing unit of demand holding one or more
//! manufacturing orders. Each order follows exactly one current alternate
//! path at a time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::{JobId, MoId, PathId};
use super::path::AlternatePath;
use super::time::Ticks;

/// A job to be scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    /// Scheduling priority (higher = more important).
    pub priority: i32,
    /// Date the job is due.
    pub need_date: Ticks,
    /// No work may start before this time.
    pub hold_until: Option<Ticks>,
    /// Expedite target set by an expedite transmission.
    pub expedite_at: Option<Ticks>,
    /// Excluded from scheduling when set.
    pub do_not_schedule: bool,
    pub orders: BTreeMap<MoId, ManufacturingOrder>,
}

impl Job {
    pub fn new(id: JobId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            priority: 0,
            need_date: super::time::END_OF_TIME,
            hold_until: None,
            expedite_at: None,
            do_not_schedule: false,
            orders: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_need_date(mut self, need_date: Ticks) -> Self {
        self.need_date = need_date;
        self
    }

    pub fn with_hold_until(mut self, hold_until: Ticks) -> Self {
        self.hold_until = Some(hold_until);
        self
    }

    pub fn with_order(mut self, order: ManufacturingOrder) -> Self {
        self.orders.insert(order.id, order);
        self
    }

    /// Total activities across the current paths of all orders.
    pub fn activity_count(&self) -> usize {
        self.orders
            .values()
            .filter_map(|mo| mo.current())
            .map(AlternatePath::activity_count)
            .sum()
    }

    pub fn has_orders(&self) -> bool {
        !self.orders.is_empty()
    }
}

/// A production order within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingOrder {
    pub id: MoId,
    pub name: String,
    /// Earliest time work may start.
    pub release_date: Ticks,
    pub hold_until: Option<Ticks>,
    pub quantity: f64,
    pub paths: BTreeMap<PathId, AlternatePath>,
    /// The selected routing; must name an entry of `paths`.
    pub current_path: PathId,
    /// Orders that must complete before this one may start.
    pub predecessor_orders: Vec<MoId>,
}

impl ManufacturingOrder {
    /// Creates an order whose current path is `path`.
    pub fn new(id: MoId, name: impl Into<String>, path: AlternatePath) -> Self {
        let current_path = path.id;
        let mut paths = BTreeMap::new();
        paths.insert(path.id, path);
        Self {
            id,
            name: name.into(),
            release_date: 0,
            hold_until: None,
            quantity: 1.0,
            paths,
            current_path,
            predecessor_orders: Vec::new(),
        }
    }

    pub fn with_release_date(mut self, release_date: Ticks) -> Self {
        self.release_date = release_date;
        self
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity;
        self
    }

    /// Adds an alternate path without selecting it.
    pub fn with_alternate(mut self, path: AlternatePath) -> Self {
        self.paths.insert(path.id, path);
        self
    }

    pub fn with_predecessor_order(mut self, mo: MoId) -> Self {
        self.predecessor_orders.push(mo);
        self
    }

    /// The current path, if it exists.
    pub fn current(&self) -> Option<&AlternatePath> {
        self.paths.get(&self.current_path)
    }

    pub fn current_mut(&mut self) -> Option<&mut AlternatePath> {
        self.paths.get_mut(&self.current_path)
    }

    /// Alternate paths ordered by preference (descending), then id.
    pub fn paths_by_preference(&self) -> Vec<&AlternatePath> {
        let mut paths: Vec<&AlternatePath> = self.paths.values().collect();
        paths.sort_by(|a, b| b.preference.cmp(&a.preference).then(a.id.cmp(&b.id)));
        paths
    }
}
