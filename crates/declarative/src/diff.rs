//! Diff computation for resources

use crate::planner::Operation;
use crate::resource::ResourceSpec;
use crate::types::{OperationKind, Properties, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One property that differs between observed and desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub name: String,
    /// Observed value (`None` if the property is not observed)
    pub from: Option<Value>,
    /// Desired value (`None` for deletes)
    pub to: Option<Value>,
}

/// Compare a spec against an observed property snapshot
///
/// Only declared properties are compared, minus `ignore_changes`. Extra
/// properties the provider reports (server defaults, timestamps) never
/// count as drift.
pub fn diff_properties(desired: &ResourceSpec, observed: &Properties) -> Vec<PropertyChange> {
    desired
        .properties
        .iter()
        .filter(|(name, _)| !desired.ignore_changes.contains(name.as_str()))
        .filter_map(|(name, want)| match observed.get(name) {
            Some(have) if have == want => None,
            have => Some(PropertyChange {
                name: name.clone(),
                from: have.cloned(),
                to: Some(want.clone()),
            }),
        })
        .collect()
}

/// Every declared property as an addition (used for creates)
pub fn all_additions(desired: &ResourceSpec) -> Vec<PropertyChange> {
    desired
        .properties
        .iter()
        .map(|(name, value)| PropertyChange {
            name: name.clone(),
            from: None,
            to: Some(value.clone()),
        })
        .collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to create
    pub creates: usize,
    /// Number of resources to update in place
    pub updates: usize,
    /// Number of resources to delete
    pub deletes: usize,
}

impl DiffSummary {
    /// Create a summary from a list of operations
    pub fn from_operations<'a>(ops: impl IntoIterator<Item = &'a Operation>) -> Self {
        let mut summary = Self::default();
        for op in ops {
            match op.kind {
                OperationKind::Create => summary.creates += 1,
                OperationKind::Update => summary.updates += 1,
                OperationKind::Delete => summary.deletes += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group operations by resource type, preserving plan order within a group
pub fn group_by_type<'a>(
    ops: impl IntoIterator<Item = &'a Operation>,
) -> BTreeMap<&'a str, Vec<&'a Operation>> {
    let mut groups: BTreeMap<&str, Vec<&Operation>> = BTreeMap::new();
    for op in ops {
        groups
            .entry(op.key.resource_type.as_str())
            .or_default()
            .push(op);
    }
    groups
}
