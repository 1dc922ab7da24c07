//! Allowed-helper lookup.
//!
//! A resource acting as primary may restrict which resources can satisfy the
//! helper requirements of the activities it runs. The relation is available
//! in two forms with identical answers:
//!
//! - [`AllowedHelperList`]: hash sets, built ad hoc for single queries.
//! - [`AllowedHelperMatrix`]: dense booleans over compact resource indices,
//!   built once per simulation run for the dispatch hot path.
//!
//! For both, a pair is allowed iff both resources are known and the
//! primary's allowed list is empty or contains the helper.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{Resource, ResourceId};

/// Answers "may `helper` assist `primary`?".
pub trait HelperLookup {
    fn is_allowed(&self, primary: ResourceId, helper: ResourceId) -> bool;
}

/// Hash-set form of the allowed-helper relation.
#[derive(Debug, Clone, Default)]
pub struct AllowedHelperList {
    /// `None` means any known helper is allowed.
    allowed: HashMap<ResourceId, Option<HashSet<ResourceId>>>,
}

impl AllowedHelperList {
    pub fn build<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Self {
        let allowed = resources
            .into_iter()
            .map(|r| {
                let set = if r.allowed_helpers.is_empty() {
                    None
                } else {
                    Some(r.allowed_helpers.iter().copied().collect())
                };
                (r.id, set)
            })
            .collect();
        Self { allowed }
    }
}

impl HelperLookup for AllowedHelperList {
    fn is_allowed(&self, primary: ResourceId, helper: ResourceId) -> bool {
        if !self.allowed.contains_key(&helper) {
            return false;
        }
        match self.allowed.get(&primary) {
            Some(None) => true,
            Some(Some(set)) => set.contains(&helper),
            None => false,
        }
    }
}

/// Compact resource indices assigned once per simulation run.
///
/// Indices follow ascending resource id, so the same resource set always
/// maps to the same indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceIndex {
    ids: Vec<ResourceId>,
    positions: HashMap<ResourceId, usize>,
}

impl ResourceIndex {
    pub fn build(resources: &BTreeMap<ResourceId, Resource>) -> Self {
        let ids: Vec<ResourceId> = resources.keys().copied().collect();
        let positions = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        Self { ids, positions }
    }

    #[inline]
    pub fn index_of(&self, id: ResourceId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    #[inline]
    pub fn id_at(&self, index: usize) -> Option<ResourceId> {
        self.ids.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }
}

/// Dense boolean form of the allowed-helper relation.
///
/// Run-scoped; rebuild whenever the resource set changes.
#[derive(Debug, Clone, Default)]
pub struct AllowedHelperMatrix {
    index: ResourceIndex,
    cells: Vec<bool>,
}

impl AllowedHelperMatrix {
    pub fn build(resources: &BTreeMap<ResourceId, Resource>) -> Self {
        let index = ResourceIndex::build(resources);
        let n = index.len();
        let mut cells = vec![false; n * n];
        for (row, resource) in resources.values().enumerate() {
            if resource.allowed_helpers.is_empty() {
                cells[row * n..(row + 1) * n].fill(true);
            } else {
                for helper in &resource.allowed_helpers {
                    if let Some(col) = index.index_of(*helper) {
                        cells[row * n + col] = true;
                    }
                }
            }
        }
        Self { index, cells }
    }

    /// Lookup by compact indices.
    #[inline]
    pub fn is_allowed_at(&self, primary: usize, helper: usize) -> bool {
        let n = self.index.len();
        primary < n && helper < n && self.cells[primary * n + helper]
    }

    pub fn index(&self) -> &ResourceIndex {
        &self.index
    }

    /// Whether the matrix was built for exactly this resource set.
    pub fn matches(&self, resources: &BTreeMap<ResourceId, Resource>) -> bool {
        self.index.len() == resources.len()
            && resources.keys().zip(self.index.ids()).all(|(a, b)| a == b)
    }
}

impl HelperLookup for AllowedHelperMatrix {
    fn is_allowed(&self, primary: ResourceId, helper: ResourceId) -> bool {
        match (self.index.index_of(primary), self.index.index_of(helper)) {
            (Some(p), Some(h)) => self.is_allowed_at(p, h),
            _ => false,
        }
    }
}
