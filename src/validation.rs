//! Structural validation of planning data.
//!
//! Runs before any mutation becomes visible. Detects:
//! - Duplicate ids across the containment hierarchy
//! - References to unknown resources, operations or orders
//! - Circular associations within a path (DAG validation)
//! - Orders or paths without operations, operations without activities
//! - Current paths that do not exist
//!
//! # Reference
//! Cormen et al. (2009), "Introduction to Algorithms", Ch. 22.4 (Topological Sort)

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;

use crate::models::{AlternatePath, Job, JobId, OperationId, Resource, ResourceId};

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A handleable, user-facing validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    /// Two entities share the same id.
    DuplicateId,
    /// A reference points at an entity that doesn't exist.
    UnknownReference,
    /// Associations of a path contain a cycle.
    CyclicAssociation,
    /// An order, path or operation has nothing to schedule.
    EmptyRouting,
    /// An order's current path is not one of its paths.
    InvalidCurrentPath,
    /// A value is out of range or inconsistent.
    InvalidArgument,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown(what: &str, id: impl std::fmt::Display) -> Self {
        Self::new(ValidationErrorKind::UnknownReference, format!("unknown {what} {id}"))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::InvalidArgument, message)
    }
}

/// Keeps the first error of a validation run.
pub fn first_error(result: ValidationResult) -> Result<(), ValidationError> {
    result.map_err(|mut errors| errors.swap_remove(0))
}

/// Validates the planning graph against the resource set.
///
/// Checks:
/// 1. Map keys match entity ids
/// 2. No order, path, operation or activity id appears twice
/// 3. Every order has a path, the current path exists, every path has
///    operations and every operation has activities
/// 4. Each operation has exactly one primary requirement and durations
///    are non-negative
/// 5. Eligible resources, association endpoints and predecessor orders
///    exist
/// 6. Associations of each path are acyclic
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_planning(
    jobs: &BTreeMap<JobId, Job>,
    resources: &BTreeMap<ResourceId, Resource>,
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut push = |kind, message: String| errors.push(ValidationError::new(kind, message));

    for (key, resource) in resources {
        if *key != resource.id {
            push(
                ValidationErrorKind::InvalidArgument,
                format!("resource keyed {key} has id {}", resource.id),
            );
        }
    }

    let mut mo_ids = HashSet::new();
    let mut path_ids = HashSet::new();
    let mut op_ids = HashSet::new();
    let mut activity_ids = HashSet::new();

    for (key, job) in jobs {
        if *key != job.id {
            push(
                ValidationErrorKind::InvalidArgument,
                format!("job keyed {key} has id {}", job.id),
            );
        }
        if !job.has_orders() {
            push(ValidationErrorKind::EmptyRouting, format!("{} has no orders", job.id));
        }
        for mo in job.orders.values() {
            if !mo_ids.insert(mo.id) {
                push(ValidationErrorKind::DuplicateId, format!("duplicate order id {}", mo.id));
            }
            if mo.quantity <= 0.0 {
                push(
                    ValidationErrorKind::InvalidArgument,
                    format!("{} has non-positive quantity", mo.id),
                );
            }
            if mo.paths.is_empty() {
                push(ValidationErrorKind::EmptyRouting, format!("{} has no paths", mo.id));
            } else if !mo.paths.contains_key(&mo.current_path) {
                push(
                    ValidationErrorKind::InvalidCurrentPath,
                    format!("{} current path {} does not exist", mo.id, mo.current_path),
                );
            }
            for path in mo.paths.values() {
                if !path_ids.insert(path.id) {
                    push(ValidationErrorKind::DuplicateId, format!("duplicate path id {}", path.id));
                }
                if path.operations.is_empty() {
                    push(ValidationErrorKind::EmptyRouting, format!("{} has no operations", path.id));
                }
                for op in path.operations.values() {
                    if !op_ids.insert(op.id) {
                        push(
                            ValidationErrorKind::DuplicateId,
                            format!("duplicate operation id {}", op.id),
                        );
                    }
                    if op.activities.is_empty() {
                        push(ValidationErrorKind::EmptyRouting, format!("{} has no activities", op.id));
                    }
                    let d = op.durations;
                    if d.setup < 0 || d.run < 0 || d.post_processing < 0 || d.material_post_processing < 0 {
                        push(
                            ValidationErrorKind::InvalidArgument,
                            format!("{} has a negative duration", op.id),
                        );
                    }
                    let primaries = op.requirements.iter().filter(|r| r.primary).count();
                    if primaries != 1 {
                        push(
                            ValidationErrorKind::InvalidArgument,
                            format!("{} has {primaries} primary requirements", op.id),
                        );
                    }
                    for req in &op.requirements {
                        for r in req.eligible.iter().filter(|r| !resources.contains_key(*r)) {
                            push(
                                ValidationErrorKind::UnknownReference,
                                format!("{} requirement {} references unknown {r}", op.id, req.id),
                            );
                        }
                    }
                    for act in op.activities.values() {
                        if !activity_ids.insert(act.id) {
                            push(
                                ValidationErrorKind::DuplicateId,
                                format!("duplicate activity id {}", act.id),
                            );
                        }
                        if act.operation != op.id {
                            push(
                                ValidationErrorKind::InvalidArgument,
                                format!("{} points at {} but lives in {}", act.id, act.operation, op.id),
                            );
                        }
                    }
                }
                for assoc in &path.associations {
                    for end in [assoc.predecessor, assoc.successor] {
                        if !path.operations.contains_key(&end) {
                            push(
                                ValidationErrorKind::UnknownReference,
                                format!("{} association references unknown {end}", path.id),
                            );
                        }
                    }
                }
                if let Some(op) = detect_cycles(path) {
                    push(
                        ValidationErrorKind::CyclicAssociation,
                        format!("circular association in {} involving {op}", path.id),
                    );
                }
            }
        }
    }

    for job in jobs.values() {
        for mo in job.orders.values() {
            for pred in mo.predecessor_orders.iter().filter(|p| !mo_ids.contains(*p)) {
                push(
                    ValidationErrorKind::UnknownReference,
                    format!("{} waits for unknown order {pred}", mo.id),
                );
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Finds an operation on a cycle of the path's associations.
///
/// # Algorithm
/// Topological sort via DFS. If a back-edge is found (visiting a node
/// currently in the recursion stack), a cycle exists.
///
/// # Reference
/// Cormen et al. (2009), "Introduction to Algorithms", Ch. 22.4
fn detect_cycles(path: &AlternatePath) -> Option<OperationId> {
    let mut adj: HashMap<OperationId, Vec<OperationId>> = HashMap::new();
    for assoc in &path.associations {
        adj.entry(assoc.predecessor).or_default().push(assoc.successor);
    }

    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();
    path.operations
        .keys()
        .copied()
        .find(|&node| !visited.contains(&node) && has_cycle_dfs(node, &adj, &mut visited, &mut in_stack))
}

fn has_cycle_dfs(
    node: OperationId,
    adj: &HashMap<OperationId, Vec<OperationId>>,
    visited: &mut HashSet<OperationId>,
    in_stack: &mut HashSet<OperationId>,
) -> bool {
    visited.insert(node);
    in_stack.insert(node);

    if let Some(neighbors) = adj.get(&node) {
        for &next in neighbors {
            if in_stack.contains(&next) {
                return true; // Back edge → cycle
            }
            if !visited.contains(&next) && has_cycle_dfs(next, adj, visited, in_stack) {
                return true;
            }
        }
    }

    in_stack.remove(&node);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::CapacityInterval;
    use crate::models::{
        Activity, ActivityId, Association, IntervalId, ManufacturingOrder, MoId, Operation, PathId,
        RequirementId, ResourceRequirement, StageDurations,
    };

    fn sample_resources() -> BTreeMap<ResourceId, Resource> {
        [1, 2]
            .into_iter()
            .map(|i| {
                let r = Resource::new(ResourceId(i), format!("M{i}"))
                    .with_interval(CapacityInterval::new(IntervalId(i), 0, 1_000));
                (r.id, r)
            })
            .collect()
    }

    fn op(id: u64, seq: u32, resource: u64) -> Operation {
        Operation::new(OperationId(id), format!("op{id}"), seq)
            .with_durations(StageDurations::run_only(100))
            .with_requirement(ResourceRequirement::primary(
                RequirementId(id),
                vec![ResourceId(resource)],
            ))
            .with_activity(Activity::new(ActivityId(id), OperationId(id)))
    }

    fn job(id: u64, path: AlternatePath) -> Job {
        Job::new(JobId(id), format!("J{id}"))
            .with_order(ManufacturingOrder::new(MoId(id), format!("mo{id}"), path))
    }

    fn sample_jobs() -> BTreeMap<JobId, Job> {
        let p1 = AlternatePath::new(PathId(1), "a")
            .with_operation(op(11, 1, 1))
            .with_operation(op(12, 2, 2))
            .chained();
        let p2 = AlternatePath::new(PathId(2), "a").with_operation(op(21, 1, 1));
        [job(1, p1), job(2, p2)].into_iter().map(|j| (j.id, j)).collect()
    }

    fn kinds(result: ValidationResult) -> Vec<ValidationErrorKind> {
        result.unwrap_err().into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_valid_input() {
        assert!(validate_planning(&sample_jobs(), &sample_resources()).is_ok());
    }

    #[test]
    fn test_duplicate_activity_id() {
        let mut jobs = sample_jobs();
        let dup = Operation::new(OperationId(13), "dup", 3)
            .with_requirement(ResourceRequirement::primary(RequirementId(13), vec![ResourceId(1)]))
            .with_activity(Activity::new(ActivityId(11), OperationId(13)));
        let path = jobs
            .get_mut(&JobId(1))
            .and_then(|j| j.orders.get_mut(&MoId(1)))
            .and_then(|m| m.current_mut())
            .unwrap();
        path.operations.insert(dup.id, dup);

        let errors = validate_planning(&jobs, &sample_resources()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::DuplicateId && e.message.contains("activity")));
    }

    #[test]
    fn test_unknown_resource_reference() {
        let mut jobs = sample_jobs();
        jobs.insert(JobId(3), job(3, AlternatePath::new(PathId(3), "a").with_operation(op(31, 1, 9))));
        assert!(kinds(validate_planning(&jobs, &sample_resources()))
            .contains(&ValidationErrorKind::UnknownReference));
    }

    #[test]
    fn test_empty_routing_and_current_path() {
        let mut jobs = BTreeMap::new();
        let mut mo = ManufacturingOrder::new(MoId(5), "mo5", AlternatePath::new(PathId(5), "empty"));
        mo.current_path = PathId(99);
        jobs.insert(JobId(5), Job::new(JobId(5), "J5").with_order(mo));

        let kinds = kinds(validate_planning(&jobs, &sample_resources()));
        assert!(kinds.contains(&ValidationErrorKind::EmptyRouting));
        assert!(kinds.contains(&ValidationErrorKind::InvalidCurrentPath));
    }

    #[test]
    fn test_cyclic_association() {
        // 41 → 42 → 43 → 41
        let path = AlternatePath::new(PathId(4), "loop")
            .with_operation(op(41, 1, 1))
            .with_operation(op(42, 2, 1))
            .with_operation(op(43, 3, 1))
            .chained()
            .with_association(Association::new(OperationId(43), OperationId(41)));
        let jobs: BTreeMap<JobId, Job> = [(JobId(4), job(4, path))].into_iter().collect();
        assert!(kinds(validate_planning(&jobs, &sample_resources()))
            .contains(&ValidationErrorKind::CyclicAssociation));
    }

    #[test]
    fn test_no_cycle_in_chain() {
        let path = AlternatePath::new(PathId(4), "line")
            .with_operation(op(41, 1, 1))
            .with_operation(op(42, 2, 1))
            .with_operation(op(43, 3, 2))
            .chained();
        assert!(detect_cycles(&path).is_none());
    }

    #[test]
    fn test_primary_requirement_count() {
        let mut jobs = sample_jobs();
        let bad = Operation::new(OperationId(61), "no primary", 1)
            .with_activity(Activity::new(ActivityId(61), OperationId(61)));
        jobs.insert(JobId(6), job(6, AlternatePath::new(PathId(6), "a").with_operation(bad)));
        let errors = validate_planning(&jobs, &sample_resources()).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == ValidationErrorKind::InvalidArgument
            && e.message.contains("0 primary")));
    }

    #[test]
    fn test_unknown_predecessor_order() {
        let mut jobs = sample_jobs();
        jobs.get_mut(&JobId(2))
            .and_then(|j| j.orders.get_mut(&MoId(2)))
            .unwrap()
            .predecessor_orders
            .push(MoId(77));
        let errors = validate_planning(&jobs, &sample_resources()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("MoId(77)"));
        assert_eq!(
            first_error(Err(errors)).unwrap_err().kind,
            ValidationErrorKind::UnknownReference
        );
    }

    #[test]
    fn test_multiple_errors() {
        let mut jobs = sample_jobs();
        jobs.insert(JobId(7), Job::new(JobId(7), "empty"));
        jobs.insert(JobId(8), job(8, AlternatePath::new(PathId(8), "a").with_operation(op(81, 1, 42))));
        let errors = validate_planning(&jobs, &sample_resources()).unwrap_err();
        assert!(errors.len() >= 2);
    }
}
