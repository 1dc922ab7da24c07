//! Resource model.
//!
//! Resources are the machines, cells, people and tools that host resource
//! blocks. Each resource carries its own capacity definition (one-off and
//! recurring intervals) and the dispatching-relevant settings: capacity type,
//! batching, allowed helpers and frozen span.

use serde::{Deserialize, Serialize};

use super::ids::ResourceId;
use super::time::Ticks;
use crate::capacity::{CapacityInterval, RecurringCapacityInterval};

/// How many blocks a resource may host at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacityType {
    /// One block (or one batch) at a time.
    #[default]
    Finite,
    /// Any number of overlapping blocks.
    Infinite,
}

/// Batch processing limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Maximum summed activity quantity per batch.
    pub max_volume: f64,
    /// Maximum number of activities processed in one cycle.
    pub max_cycle_count: u32,
}

impl BatchSettings {
    pub fn new(max_volume: f64, max_cycle_count: u32) -> Self {
        Self {
            max_volume,
            max_cycle_count,
        }
    }
}

/// A resource that can host activities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub department: String,
    /// Inactive resources are skipped by the simulation.
    pub active: bool,
    pub capacity_type: CapacityType,
    pub intervals: Vec<CapacityInterval>,
    pub recurring: Vec<RecurringCapacityInterval>,
    pub batch: Option<BatchSettings>,
    /// Helper resources usable together with this resource as primary.
    /// Empty = any helper is allowed.
    pub allowed_helpers: Vec<ResourceId>,
    /// Blocks starting within `[clock, clock + frozen_span)` keep their place.
    pub frozen_span: Ticks,
    /// Whether interactive moves onto or off this resource are allowed.
    pub allow_drag_and_drop: bool,
}

impl Resource {
    pub fn new(id: ResourceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            department: String::new(),
            active: true,
            capacity_type: CapacityType::Finite,
            intervals: Vec::new(),
            recurring: Vec::new(),
            batch: None,
            allowed_helpers: Vec::new(),
            frozen_span: 0,
            allow_drag_and_drop: true,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into();
        self
    }

    pub fn with_capacity_type(mut self, capacity_type: CapacityType) -> Self {
        self.capacity_type = capacity_type;
        self
    }

    pub fn with_interval(mut self, interval: CapacityInterval) -> Self {
        self.intervals.push(interval);
        self
    }

    pub fn with_recurring(mut self, recurring: RecurringCapacityInterval) -> Self {
        self.recurring.push(recurring);
        self
    }

    pub fn with_batch(mut self, batch: BatchSettings) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn with_allowed_helper(mut self, helper: ResourceId) -> Self {
        self.allowed_helpers.push(helper);
        self
    }

    pub fn with_frozen_span(mut self, frozen_span: Ticks) -> Self {
        self.frozen_span = frozen_span;
        self
    }

    pub fn with_drag_and_drop(mut self, allowed: bool) -> Self {
        self.allow_drag_and_drop = allowed;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn is_finite(&self) -> bool {
        self.capacity_type == CapacityType::Finite
    }

    pub fn is_batch(&self) -> bool {
        self.batch.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ids::IntervalId;

    #[test]
    fn test_resource_builder() {
        let r = Resource::new(ResourceId(1), "Oven")
            .with_department("Heat")
            .with_batch(BatchSettings::new(10.0, 4))
            .with_allowed_helper(ResourceId(2))
            .with_frozen_span(500)
            .with_interval(CapacityInterval::new(IntervalId(9), 0, 1_000));

        assert_eq!(r.name, "Oven");
        assert_eq!(r.department, "Heat");
        assert!(r.is_batch());
        assert!(r.is_finite());
        assert!(r.active);
        assert_eq!(r.allowed_helpers, vec![ResourceId(2)]);
        assert_eq!(r.frozen_span, 500);
        assert_eq!(r.intervals.len(), 1);
    }

    #[test]
    fn test_inactive_infinite() {
        let r = Resource::new(ResourceId(1), "Queue")
            .with_capacity_type(CapacityType::Infinite)
            .inactive();
        assert!(!r.active);
        assert!(!r.is_finite());
    }
}
