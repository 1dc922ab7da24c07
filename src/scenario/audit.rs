//! Field-level audit trail.
//!
//! Each auditable type declares its fields as an explicit list of
//! `(name, rendered value)` pairs. [`diff`] walks the before and after
//! graphs side by side and emits one [`AuditEntry`] per added, deleted or
//! changed entity.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::{
    Activity, AlternatePath, Job, JobId, ManufacturingOrder, Operation, Resource, ResourceId,
};

/// Kind of audited entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    Job,
    ManufacturingOrder,
    AlternatePath,
    Operation,
    Activity,
    Resource,
}

/// One changed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: String,
    pub new: String,
}

/// Audit record for one entity touched by a transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub object_type: ObjectType,
    pub id: u64,
    pub parent_id: Option<u64>,
    pub added: bool,
    pub deleted: bool,
    pub changes: Vec<FieldChange>,
}

impl AuditEntry {
    pub fn added(object_type: ObjectType, id: u64, parent_id: Option<u64>) -> Self {
        Self {
            object_type,
            id,
            parent_id,
            added: true,
            deleted: false,
            changes: Vec::new(),
        }
    }

    pub fn deleted(object_type: ObjectType, id: u64, parent_id: Option<u64>) -> Self {
        Self {
            deleted: true,
            added: false,
            ..Self::added(object_type, id, parent_id)
        }
    }

    /// Compares two versions of one entity; `None` when nothing changed.
    pub fn compare<T: Auditable>(before: &T, after: &T, parent_id: Option<u64>) -> Option<Self> {
        let changes: Vec<FieldChange> = before
            .audit_fields()
            .into_iter()
            .zip(after.audit_fields())
            .filter(|((_, old), (_, new))| old != new)
            .map(|((field, old), (_, new))| FieldChange {
                field: field.to_string(),
                old,
                new,
            })
            .collect();
        if changes.is_empty() {
            return None;
        }
        Some(Self {
            object_type: T::OBJECT_TYPE,
            id: after.audit_id(),
            parent_id,
            added: false,
            deleted: false,
            changes,
        })
    }

    pub fn is_update(&self) -> bool {
        !self.added && !self.deleted
    }
}

/// An entity with a declared audit field list.
pub trait Auditable {
    const OBJECT_TYPE: ObjectType;

    fn audit_id(&self) -> u64;

    /// Field names and rendered values, always in the same order.
    fn audit_fields(&self) -> Vec<(&'static str, String)>;
}

fn show<T: std::fmt::Debug>(value: &T) -> String {
    format!("{value:?}")
}

impl Auditable for Job {
    const OBJECT_TYPE: ObjectType = ObjectType::Job;

    fn audit_id(&self) -> u64 {
        self.id.value()
    }

    fn audit_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("priority", show(&self.priority)),
            ("need_date", show(&self.need_date)),
            ("hold_until", show(&self.hold_until)),
            ("expedite_at", show(&self.expedite_at)),
            ("do_not_schedule", show(&self.do_not_schedule)),
        ]
    }
}

impl Auditable for ManufacturingOrder {
    const OBJECT_TYPE: ObjectType = ObjectType::ManufacturingOrder;

    fn audit_id(&self) -> u64 {
        self.id.value()
    }

    fn audit_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("release_date", show(&self.release_date)),
            ("hold_until", show(&self.hold_until)),
            ("quantity", show(&self.quantity)),
            ("current_path", show(&self.current_path)),
            ("predecessor_orders", show(&self.predecessor_orders)),
        ]
    }
}

impl Auditable for AlternatePath {
    const OBJECT_TYPE: ObjectType = ObjectType::AlternatePath;

    fn audit_id(&self) -> u64 {
        self.id.value()
    }

    fn audit_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("preference", show(&self.preference)),
            ("validity_start", show(&self.validity_start)),
            ("validity_end", show(&self.validity_end)),
            ("associations", show(&self.associations)),
        ]
    }
}

impl Auditable for Operation {
    const OBJECT_TYPE: ObjectType = ObjectType::Operation;

    fn audit_id(&self) -> u64 {
        self.id.value()
    }

    fn audit_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("sequence", show(&self.sequence)),
            ("durations", show(&self.durations)),
            ("requirements", show(&self.requirements)),
            ("material_available", show(&self.material_available)),
            ("batch_code", show(&self.batch_code)),
        ]
    }
}

impl Auditable for Activity {
    const OBJECT_TYPE: ObjectType = ObjectType::Activity;

    fn audit_id(&self) -> u64 {
        self.id.value()
    }

    fn audit_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("quantity", show(&self.quantity)),
            ("status", show(&self.status)),
            ("remaining_run", show(&self.remaining_run)),
            ("locked_resource", show(&self.locked_resource)),
            ("move_request", show(&self.move_request)),
        ]
    }
}

impl Auditable for Resource {
    const OBJECT_TYPE: ObjectType = ObjectType::Resource;

    fn audit_id(&self) -> u64 {
        self.id.value()
    }

    fn audit_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("department", self.department.clone()),
            ("active", show(&self.active)),
            ("capacity_type", show(&self.capacity_type)),
            ("intervals", show(&self.intervals)),
            ("recurring", show(&self.recurring)),
            ("batch", show(&self.batch)),
            ("allowed_helpers", show(&self.allowed_helpers)),
            ("frozen_span", show(&self.frozen_span)),
            ("allow_drag_and_drop", show(&self.allow_drag_and_drop)),
        ]
    }
}

type Pair<'a, T> = (Option<&'a T>, Option<&'a T>);

/// Emits entries for one level and returns the pairs to descend into.
fn diff_level<'a, K: Ord + Copy, T: Auditable>(
    before: Option<&'a BTreeMap<K, T>>,
    after: Option<&'a BTreeMap<K, T>>,
    parent_id: Option<u64>,
    out: &mut Vec<AuditEntry>,
) -> Vec<Pair<'a, T>> {
    let keys: BTreeSet<K> = before
        .into_iter()
        .chain(after)
        .flat_map(|m| m.keys().copied())
        .collect();
    let mut pairs = Vec::with_capacity(keys.len());
    for key in keys {
        let old = before.and_then(|m| m.get(&key));
        let new = after.and_then(|m| m.get(&key));
        match (old, new) {
            (None, Some(n)) => out.push(AuditEntry::added(T::OBJECT_TYPE, n.audit_id(), parent_id)),
            (Some(o), None) => {
                out.push(AuditEntry::deleted(T::OBJECT_TYPE, o.audit_id(), parent_id))
            }
            (Some(o), Some(n)) => out.extend(AuditEntry::compare(o, n, parent_id)),
            (None, None) => {}
        }
        pairs.push((old, new));
    }
    pairs
}

fn id_of<T: Auditable>((old, new): Pair<'_, T>) -> Option<u64> {
    new.or(old).map(Auditable::audit_id)
}

/// Audit entries for every entity that differs between two graphs.
///
/// Parents come before their children; siblings are in id order.
pub fn diff(
    before_jobs: &BTreeMap<JobId, Job>,
    before_resources: &BTreeMap<ResourceId, Resource>,
    after_jobs: &BTreeMap<JobId, Job>,
    after_resources: &BTreeMap<ResourceId, Resource>,
) -> Vec<AuditEntry> {
    let mut out = Vec::new();
    for job in diff_level(Some(before_jobs), Some(after_jobs), None, &mut out) {
        let parent = id_of(job);
        let (old, new) = job;
        let orders = diff_level(old.map(|j| &j.orders), new.map(|j| &j.orders), parent, &mut out);
        for mo in orders {
            let parent = id_of(mo);
            let (old, new) = mo;
            let paths = diff_level(old.map(|m| &m.paths), new.map(|m| &m.paths), parent, &mut out);
            for path in paths {
                let parent = id_of(path);
                let (old, new) = path;
                let ops = diff_level(
                    old.map(|p| &p.operations),
                    new.map(|p| &p.operations),
                    parent,
                    &mut out,
                );
                for op in ops {
                    let parent = id_of(op);
                    let (old, new) = op;
                    diff_level(
                        old.map(|o| &o.activities),
                        new.map(|o| &o.activities),
                        parent,
                        &mut out,
                    );
                }
            }
        }
    }
    diff_level(Some(before_resources), Some(after_resources), None, &mut out);
    out
}
