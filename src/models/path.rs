//! Alternate paths and precedence associations.
//!
//! An alternate path is one selectable routing of a manufacturing order: an
//! ordered map of operations plus directed associations between them. An
//! association carries two delays applied after the predecessor's release
//! point: the resource-transfer span and the transfer span.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::activity::Operation;
use super::ids::{OperationId, PathId};
use super::time::Ticks;

/// A predecessor → successor edge between two operations of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub predecessor: OperationId,
    pub successor: OperationId,
    /// Delay before the successor may start, counted from availability.
    pub transfer_span: Ticks,
    /// Time to move material between resources, counted from the
    /// predecessor's material release.
    pub resource_transfer_span: Ticks,
}

impl Association {
    pub fn new(predecessor: OperationId, successor: OperationId) -> Self {
        Self {
            predecessor,
            successor,
            transfer_span: 0,
            resource_transfer_span: 0,
        }
    }

    pub fn with_transfer_span(mut self, ticks: Ticks) -> Self {
        self.transfer_span = ticks;
        self
    }

    pub fn with_resource_transfer_span(mut self, ticks: Ticks) -> Self {
        self.resource_transfer_span = ticks;
        self
    }
}

/// Stage boundaries of a scheduled predecessor, used for release timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageBoundaries {
    pub start: Ticks,
    pub setup_end: Ticks,
    pub run_end: Ticks,
}

/// Time a successor may consume the predecessor's output.
///
/// The predecessor's stages are consumed in fixed order: setup, processing,
/// material post-processing, then the resource-transfer span. The result is
/// the latest applicable boundary of that chain; resource post-processing
/// never delays the successor. The association's transfer span is applied on
/// top of this by the caller.
pub fn predecessor_release_time(
    boundaries: StageBoundaries,
    material_post_processing: Ticks,
    association: &Association,
) -> Ticks {
    let mut release = boundaries.start;
    release = release.max(boundaries.setup_end);
    release = release.max(boundaries.run_end);
    release += material_post_processing.max(0);
    release + association.resource_transfer_span.max(0)
}

/// One selectable routing of a manufacturing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternatePath {
    pub id: PathId,
    pub name: String,
    /// Higher preference is tried first by preference-sorted searches.
    pub preference: i32,
    /// Earliest time operations of this path may become ready.
    pub validity_start: Option<Ticks>,
    /// After this time no operation of this path may start.
    pub validity_end: Option<Ticks>,
    pub operations: BTreeMap<OperationId, Operation>,
    pub associations: Vec<Association>,
}

impl AlternatePath {
    pub fn new(id: PathId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            preference: 0,
            validity_start: None,
            validity_end: None,
            operations: BTreeMap::new(),
            associations: Vec::new(),
        }
    }

    pub fn with_preference(mut self, preference: i32) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_validity(mut self, start: Option<Ticks>, end: Option<Ticks>) -> Self {
        self.validity_start = start;
        self.validity_end = end;
        self
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.insert(operation.id, operation);
        self
    }

    pub fn with_association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// Chains operations in sequence order with zero-delay associations.
    pub fn chained(mut self) -> Self {
        let mut ordered: Vec<(u32, OperationId)> =
            self.operations.values().map(|o| (o.sequence, o.id)).collect();
        ordered.sort();
        for pair in ordered.windows(2) {
            self.associations.push(Association::new(pair[0].1, pair[1].1));
        }
        self
    }

    /// Associations leaving `operation`.
    pub fn successors_of(&self, operation: OperationId) -> impl Iterator<Item = &Association> {
        self.associations
            .iter()
            .filter(move |a| a.predecessor == operation)
    }

    /// Number of associations entering each operation.
    pub fn predecessor_counts(&self) -> HashMap<OperationId, usize> {
        let mut counts: HashMap<OperationId, usize> =
            self.operations.keys().map(|id| (*id, 0)).collect();
        for a in &self.associations {
            *counts.entry(a.successor).or_insert(0) += 1;
        }
        counts
    }

    /// Operations with no outgoing association.
    pub fn final_operations(&self) -> BTreeSet<OperationId> {
        let with_successor: BTreeSet<OperationId> =
            self.associations.iter().map(|a| a.predecessor).collect();
        self.operations
            .keys()
            .filter(|id| !with_successor.contains(id))
            .copied()
            .collect()
    }

    /// Whether the path may start work at `time`.
    pub fn is_valid_at(&self, time: Ticks) -> bool {
        self.validity_start.map_or(true, |s| time >= s)
            && self.validity_end.map_or(true, |e| time < e)
    }

    /// Total activity count across all operations.
    pub fn activity_count(&self) -> usize {
        self.operations.values().map(|o| o.activities.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::activity::StageDurations;

    fn boundaries() -> StageBoundaries {
        StageBoundaries {
            start: 0,
            setup_end: 100,
            run_end: 600,
        }
    }

    #[test]
    fn test_release_is_run_end_without_delays() {
        let assoc = Association::new(OperationId(1), OperationId(2));
        assert_eq!(predecessor_release_time(boundaries(), 0, &assoc), 600);
    }

    #[test]
    fn test_release_adds_material_then_resource_transfer() {
        let assoc = Association::new(OperationId(1), OperationId(2)).with_resource_transfer_span(30);
        assert_eq!(predecessor_release_time(boundaries(), 50, &assoc), 680);
    }

    #[test]
    fn test_release_ignores_transfer_span() {
        let assoc = Association::new(OperationId(1), OperationId(2)).with_transfer_span(1_000);
        assert_eq!(predecessor_release_time(boundaries(), 0, &assoc), 600);
    }

    #[test]
    fn test_chained_path() {
        let path = AlternatePath::new(PathId(1), "main")
            .with_operation(
                Operation::new(OperationId(20), "b", 2).with_durations(StageDurations::run_only(5)),
            )
            .with_operation(Operation::new(OperationId(10), "a", 1))
            .with_operation(Operation::new(OperationId(30), "c", 3))
            .chained();

        assert_eq!(path.associations.len(), 2);
        assert_eq!(path.associations[0].predecessor, OperationId(10));
        assert_eq!(path.associations[0].successor, OperationId(20));
        let counts = path.predecessor_counts();
        assert_eq!(counts[&OperationId(10)], 0);
        assert_eq!(counts[&OperationId(30)], 1);
        assert_eq!(
            path.final_operations().into_iter().collect::<Vec<_>>(),
            vec![OperationId(30)]
        );
    }

    #[test]
    fn test_validity_window() {
        let path = AlternatePath::new(PathId(1), "p").with_validity(Some(100), Some(200));
        assert!(!path.is_valid_at(99));
        assert!(path.is_valid_at(100));
        assert!(!path.is_valid_at(200));
        assert!(AlternatePath::new(PathId(2), "open").is_valid_at(-5));
    }
}
