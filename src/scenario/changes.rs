//! Per-transmission change sets.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::audit::{AuditEntry, ObjectType};

/// Ids added, updated and deleted for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChanges {
    pub added: BTreeSet<u64>,
    pub updated: BTreeSet<u64>,
    pub deleted: BTreeSet<u64>,
}

impl EntityChanges {
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What one transmission changed, for downstream consumers such as the UI
/// or a report exporter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDataChanges {
    pub entities: BTreeMap<ObjectType, EntityChanges>,
    /// Whether any block moved, appeared or disappeared.
    pub schedule_changed: bool,
}

impl ScenarioDataChanges {
    pub fn from_audit(entries: &[AuditEntry]) -> Self {
        let mut changes = Self::default();
        for entry in entries {
            let kind = changes.entities.entry(entry.object_type).or_default();
            let set = if entry.added {
                &mut kind.added
            } else if entry.deleted {
                &mut kind.deleted
            } else {
                &mut kind.updated
            };
            set.insert(entry.id);
        }
        changes
    }

    pub fn with_schedule_changed(mut self, changed: bool) -> Self {
        self.schedule_changed = changed;
        self
    }

    pub fn of(&self, kind: ObjectType) -> Option<&EntityChanges> {
        self.entities.get(&kind)
    }

    /// Entity changes across all kinds.
    pub fn len(&self) -> usize {
        self.entities.values().map(EntityChanges::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && !self.schedule_changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_audit_groups_by_kind() {
        let mut update = AuditEntry::added(ObjectType::Activity, 9, Some(8));
        update.added = false;
        let entries = vec![
            AuditEntry::added(ObjectType::Job, 1, None),
            AuditEntry::deleted(ObjectType::Job, 2, None),
            update,
        ];
        let changes = ScenarioDataChanges::from_audit(&entries);
        assert_eq!(changes.len(), 3);

        let jobs = changes.of(ObjectType::Job).unwrap();
        assert!(jobs.added.contains(&1) && jobs.deleted.contains(&2));
        assert!(changes.of(ObjectType::Activity).unwrap().updated.contains(&9));
        assert!(changes.of(ObjectType::Resource).is_none());
    }

    #[test]
    fn test_empty() {
        let changes = ScenarioDataChanges::default();
        assert!(changes.is_empty());
        assert!(!changes.with_schedule_changed(true).is_empty());
    }
}
