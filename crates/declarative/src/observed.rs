//! Observed state - what the remote providers currently hold

use crate::executor::RunReport;
use crate::planner::Plan;
use crate::resource::RemoteRecord;
use crate::types::{OperationKind, OperationStatus, Properties, ResourceKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of one remote resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedResource {
    pub record: RemoteRecord,
    /// Last known properties (last applied, overlaid with what refresh read)
    #[serde(default)]
    pub properties: Properties,
    /// Dependencies recorded when the resource was applied
    #[serde(default)]
    pub depends_on: Vec<ResourceKey>,
    /// Resolved by a lookup rather than managed
    #[serde(default)]
    pub lookup: bool,
}

impl ObservedResource {
    pub fn managed(record: RemoteRecord, properties: Properties, depends_on: Vec<ResourceKey>) -> Self {
        Self {
            record,
            properties,
            depends_on,
            lookup: false,
        }
    }

    pub fn looked_up(record: RemoteRecord, query: Properties) -> Self {
        Self {
            record,
            properties: query,
            depends_on: Vec::new(),
            lookup: true,
        }
    }
}

/// Mapping of resource identity to observed snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    resources: BTreeMap<ResourceKey, ObservedResource>,
}

impl ObservedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ResourceKey, resource: ObservedResource) {
        self.resources.insert(key, resource);
    }

    pub fn remove(&mut self, key: &ResourceKey) -> Option<ObservedResource> {
        self.resources.remove(key)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ObservedResource> {
        self.resources.get(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &ObservedResource)> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Remote records of every observed resource
    pub fn records(&self) -> BTreeMap<ResourceKey, RemoteRecord> {
        self.resources
            .iter()
            .map(|(k, r)| (k.clone(), r.record.clone()))
            .collect()
    }

    /// Fold the outcome of a run into this snapshot
    ///
    /// Only succeeded operations change anything: creates and updates
    /// record the new remote identity and the declared properties, deletes
    /// drop the entry. Failed and skipped operations keep the prior entry.
    pub fn apply_report(&mut self, plan: &Plan, report: &RunReport) {
        for (op, outcome) in plan.operations().iter().zip(report.outcomes()) {
            if outcome.status != OperationStatus::Succeeded {
                continue;
            }
            match op.kind {
                OperationKind::Create | OperationKind::Update => {
                    let (Some(spec), Some(record)) = (&op.spec, report.resolved().get(&op.key))
                    else {
                        continue;
                    };
                    self.insert(
                        op.key.clone(),
                        ObservedResource::managed(
                            record.clone(),
                            spec.properties.clone(),
                            spec.depends_on.clone(),
                        ),
                    );
                }
                OperationKind::Delete => {
                    self.remove(&op.key);
                }
            }
        }
    }
}

impl FromIterator<(ResourceKey, ObservedResource)> for ObservedState {
    fn from_iter<I: IntoIterator<Item = (ResourceKey, ObservedResource)>>(iter: I) -> Self {
        Self {
            resources: iter.into_iter().collect(),
        }
    }
}
