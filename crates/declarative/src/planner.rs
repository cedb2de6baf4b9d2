//! Reconciler - turns a declaration and an observed snapshot into a plan
//!
//! Creates and updates are ordered by the declaration's dependency graph;
//! deletes of resources that fell out of the declaration follow in reverse
//! dependency order. Operations are grouped into topological levels: every
//! operation in a level only waits on operations in earlier levels.

use crate::declaration::Declaration;
use crate::diff::{DiffSummary, PropertyChange, all_additions, diff_properties};
use crate::error::DeclarationError;
use crate::observed::{ObservedResource, ObservedState};
use crate::resource::ResourceSpec;
use crate::types::{OperationKind, ResourceKey};
use std::collections::{BTreeSet, HashMap};

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub key: ResourceKey,
    pub kind: OperationKind,
    /// Desired state (absent for deletes)
    pub spec: Option<ResourceSpec>,
    /// Observed state before the run (absent for creates)
    pub prior: Option<ObservedResource>,
    /// Resources whose remote records this operation needs
    pub inputs: Vec<ResourceKey>,
    /// Indices of operations in the same plan that must succeed first
    pub after: Vec<usize>,
    pub changes: Vec<PropertyChange>,
    pub level: usize,
}

impl Operation {
    pub fn resource_type(&self) -> &str {
        &self.key.resource_type
    }
}

/// Ordered operations reconciling observed state to declared state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    operations: Vec<Operation>,
    levels: Vec<Vec<usize>>,
}

impl Plan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations in execution order
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Operation indices grouped by topological level
    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_operations(&self.operations)
    }

    pub fn position(&self, key: &ResourceKey) -> Option<usize> {
        self.operations.iter().position(|op| &op.key == key)
    }

    /// Operations matching a target pattern
    ///
    /// Target format: "type" or "type.name"; a type matches by prefix so
    /// that "github" selects every GitHub resource.
    pub fn matching(&self, target: Option<&str>) -> Vec<&Operation> {
        match target {
            None => self.operations.iter().collect(),
            Some(t) => {
                let (resource_type, name) = parse_target(t);
                self.operations
                    .iter()
                    .filter(|op| matches_filter(op, resource_type.as_deref(), name.as_deref()))
                    .collect()
            }
        }
    }
}

/// Compute the plan that converges `observed` to `declaration`
pub fn reconcile(
    declaration: &Declaration,
    observed: &ObservedState,
) -> Result<Plan, DeclarationError> {
    check_dependencies(declaration, observed)?;

    let mut operations: Vec<Operation> = Vec::new();
    let mut op_index: HashMap<ResourceKey, usize> = HashMap::new();

    for i in declaration.topological_order() {
        let spec = &declaration.resources()[i];
        let prior = observed.get(&spec.key);

        let (kind, changes) = match prior {
            None => (OperationKind::Create, all_additions(spec)),
            Some(prior) => {
                let changes = diff_properties(spec, &prior.properties);
                if changes.is_empty() {
                    continue;
                }
                (OperationKind::Update, changes)
            }
        };

        let after: Vec<usize> = spec
            .depends_on
            .iter()
            .filter_map(|dep| op_index.get(dep).copied())
            .collect();
        let level = after
            .iter()
            .map(|&d| operations[d].level + 1)
            .max()
            .unwrap_or(0);

        op_index.insert(spec.key.clone(), operations.len());
        operations.push(Operation {
            key: spec.key.clone(),
            kind,
            spec: Some(spec.clone()),
            prior: prior.cloned(),
            inputs: spec.depends_on.clone(),
            after,
            changes,
            level,
        });
    }

    let first_delete_level = operations.iter().map(|op| op.level + 1).max().unwrap_or(0);
    plan_deletes(declaration, observed, first_delete_level, &mut operations);

    // Stable sort keeps dependency order within a level
    let mut order: Vec<usize> = (0..operations.len()).collect();
    order.sort_by_key(|&i| operations[i].level);
    let operations = reindex(operations, &order);

    let level_count = operations.last().map_or(0, |op| op.level + 1);
    let mut levels = vec![Vec::new(); level_count];
    for (i, op) in operations.iter().enumerate() {
        levels[op.level].push(i);
    }
    levels.retain(|l| !l.is_empty());

    log::debug!(
        "planned {} operations in {} levels",
        operations.len(),
        levels.len()
    );
    Ok(Plan { operations, levels })
}

/// Every dependency must be declared, or be an observed lookup
///
/// Observed managed resources that are no longer declared are about to be
/// deleted, so they cannot satisfy a dependency.
fn check_dependencies(
    declaration: &Declaration,
    observed: &ObservedState,
) -> Result<(), DeclarationError> {
    for spec in declaration.resources() {
        for dep in &spec.depends_on {
            let resolved = declaration.contains(dep)
                || observed.get(dep).is_some_and(|o| o.lookup);
            if !resolved {
                return Err(DeclarationError::UnresolvedDependency {
                    resource: spec.key.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Append deletes for observed managed resources missing from the declaration
///
/// A resource is deleted only after every deleted resource that depends on
/// it, so the dependency graph is walked in reverse.
fn plan_deletes(
    declaration: &Declaration,
    observed: &ObservedState,
    base_level: usize,
    operations: &mut Vec<Operation>,
) {
    let doomed: Vec<(&ResourceKey, &ObservedResource)> = observed
        .iter()
        .filter(|(key, res)| !res.lookup && !declaration.contains(key))
        .collect();
    if doomed.is_empty() {
        return;
    }

    let position: HashMap<&ResourceKey, usize> =
        doomed.iter().enumerate().map(|(i, (k, _))| (*k, i)).collect();

    // dependents[i]: doomed resources that depend on doomed resource i
    let n = doomed.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut waiting = vec![0usize; n];
    for (i, (_, res)) in doomed.iter().enumerate() {
        for dep in &res.depends_on {
            if let Some(&d) = position.get(dep) {
                dependents[d].push(i);
                waiting[d] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| waiting[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    let mut local_level = vec![0usize; n];
    while let Some(i) = ready.pop_first() {
        order.push(i);
        let (_, res) = doomed[i];
        for dep in &res.depends_on {
            if let Some(&d) = position.get(dep) {
                local_level[d] = local_level[d].max(local_level[i] + 1);
                waiting[d] -= 1;
                if waiting[d] == 0 {
                    ready.insert(d);
                }
            }
        }
    }

    if order.len() < n {
        // Recorded dependencies should never be cyclic; delete the rest last
        log::warn!("observed state has cyclic dependencies; deleting remainder in key order");
        let tail = order.iter().map(|&i| local_level[i]).max().unwrap_or(0) + 1;
        for i in 0..n {
            if !order.contains(&i) {
                local_level[i] = tail;
                order.push(i);
            }
        }
    }

    let mut op_of = vec![usize::MAX; n];
    for &i in &order {
        op_of[i] = operations.len();
        let (key, res) = doomed[i];
        operations.push(Operation {
            key: key.clone(),
            kind: OperationKind::Delete,
            spec: None,
            prior: Some(res.clone()),
            inputs: Vec::new(),
            after: Vec::new(),
            changes: res
                .properties
                .iter()
                .map(|(name, value)| PropertyChange {
                    name: name.clone(),
                    from: Some(value.clone()),
                    to: None,
                })
                .collect(),
            level: base_level + local_level[i],
        });
    }
    for (i, deps) in dependents.iter().enumerate() {
        let op = op_of[i];
        operations[op].after = deps.iter().map(|&d| op_of[d]).collect();
    }
}

/// Reorder operations, rewriting `after` indices to the new positions
fn reindex(operations: Vec<Operation>, order: &[usize]) -> Vec<Operation> {
    let mut new_pos = vec![0usize; order.len()];
    for (new, &old) in order.iter().enumerate() {
        new_pos[old] = new;
    }
    let mut slots: Vec<Option<Operation>> = operations.into_iter().map(Some).collect();
    order
        .iter()
        .filter_map(|&old| slots[old].take())
        .map(|mut op| {
            op.after = op.after.iter().map(|&a| new_pos[a]).collect();
            op
        })
        .collect()
}

/// Parse a target string like "type.name" into (type, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some((t, n)) => (Some(t.to_string()), Some(n.to_string())),
    }
}

/// Check if an operation matches the filter criteria
fn matches_filter(op: &Operation, resource_type: Option<&str>, name: Option<&str>) -> bool {
    if let Some(rt) = resource_type
        && !op.resource_type().starts_with(rt)
    {
        return false;
    }

    if let Some(n) = name
        && !op.key.name.contains(n)
    {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::RemoteRecord;
    use crate::types::{Properties, properties};

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new("test", name)
    }

    fn observed_from(decl: &Declaration) -> ObservedState {
        decl.resources()
            .iter()
            .map(|spec| {
                (
                    spec.key.clone(),
                    ObservedResource::managed(
                        RemoteRecord::new(format!("id-{}", spec.key.name)),
                        spec.properties.clone(),
                        spec.depends_on.clone(),
                    ),
                )
            })
            .collect()
    }

    fn diamond() -> Declaration {
        let mut decl = Declaration::new();
        let a = decl
            .add_resource("test", "a", properties([("x", 1_i64)]), &[])
            .unwrap();
        let b = decl
            .add_resource("test", "b", Properties::new(), &[a.key().clone()])
            .unwrap();
        let c = decl
            .add_resource("test", "c", Properties::new(), &[a.key().clone()])
            .unwrap();
        decl.add_resource(
            "test",
            "d",
            Properties::new(),
            &[b.key().clone(), c.key().clone()],
        )
        .unwrap();
        decl
    }

    #[test]
    fn test_plan_respects_dependency_edges() {
        let decl = diamond();
        let plan = reconcile(&decl, &ObservedState::new()).unwrap();
        assert_eq!(plan.len(), 4);

        for (i, op) in plan.operations().iter().enumerate() {
            let spec = op.spec.as_ref().unwrap();
            for dep in &spec.depends_on {
                let d = plan.position(dep).unwrap();
                assert!(d < i, "{dep} must precede {}", op.key);
                assert!(plan.operations()[d].level < op.level);
            }
        }

        let levels: Vec<Vec<&str>> = plan
            .levels()
            .iter()
            .map(|l| {
                l.iter()
                    .map(|&i| plan.operations()[i].key.name.as_str())
                    .collect()
            })
            .collect();
        assert_eq!(levels, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn test_idempotent_against_own_result() {
        let decl = diamond();
        let observed = observed_from(&decl);
        let plan = reconcile(&decl, &observed).unwrap();
        assert!(plan.is_empty());
        assert!(plan.levels().is_empty());
    }

    #[test]
    fn test_update_only_changed_resources() {
        let decl = diamond();
        let mut observed = observed_from(&decl);
        let mut stale = observed.get(&key("a")).unwrap().clone();
        stale.properties.insert("x".into(), 2_i64.into());
        observed.insert(key("a"), stale);

        let plan = reconcile(&decl, &observed).unwrap();
        assert_eq!(plan.len(), 1);
        let op = &plan.operations()[0];
        assert_eq!(op.kind, OperationKind::Update);
        assert_eq!(op.level, 0);
        assert_eq!(op.changes[0].name, "x");
    }

    #[test]
    fn test_dependent_of_unchanged_resource_starts_at_level_zero() {
        let mut decl = diamond();
        let observed = observed_from(&decl);
        decl.add_resource("test", "e", Properties::new(), &[key("d")])
            .unwrap();
        let plan = reconcile(&decl, &observed).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.operations()[0].level, 0);
        assert!(plan.operations()[0].after.is_empty());
    }

    #[test]
    fn test_deletes_in_reverse_dependency_order() {
        let observed = observed_from(&diamond());
        let plan = reconcile(&Declaration::new(), &observed).unwrap();
        assert_eq!(plan.summary().deletes, 4);

        let names: Vec<&str> = plan
            .operations()
            .iter()
            .map(|op| op.key.name.as_str())
            .collect();
        assert_eq!(names, vec!["d", "b", "c", "a"]);

        // a waits for b and c, which wait for d
        let a = plan.position(&key("a")).unwrap();
        let mut after_a: Vec<usize> = plan.operations()[a].after.clone();
        after_a.sort_unstable();
        assert_eq!(
            after_a,
            vec![plan.position(&key("b")).unwrap(), plan.position(&key("c")).unwrap()]
        );
        assert_eq!(plan.levels().len(), 3);
    }

    #[test]
    fn test_deletes_follow_creates() {
        let mut observed = ObservedState::new();
        observed.insert(
            key("old"),
            ObservedResource::managed(RemoteRecord::new("1"), Properties::new(), Vec::new()),
        );
        let mut decl = Declaration::new();
        decl.add_resource("test", "new", Properties::new(), &[])
            .unwrap();

        let plan = reconcile(&decl, &observed).unwrap();
        assert_eq!(plan.operations()[0].kind, OperationKind::Create);
        assert_eq!(plan.operations()[1].kind, OperationKind::Delete);
        assert_eq!(plan.operations()[1].level, 1);
    }

    #[test]
    fn test_lookups_are_never_deleted() {
        let mut observed = ObservedState::new();
        observed.insert(
            ResourceKey::new("group", "g"),
            ObservedResource::looked_up(RemoteRecord::new("7"), Properties::new()),
        );
        let plan = reconcile(&Declaration::new(), &observed).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_unresolved_dependency() {
        let mut decl = Declaration::new();
        let group = ResourceKey::new("group", "g");
        decl.add_lookup("group", "g", Properties::new()).unwrap();
        decl.add_resource("test", "project", Properties::new(), &[group.clone()])
            .unwrap();

        // Lookup not resolved into observed state
        let err = reconcile(&decl, &ObservedState::new()).unwrap_err();
        assert_eq!(
            err,
            DeclarationError::UnresolvedDependency {
                resource: key("project"),
                dependency: group.clone(),
            }
        );

        let mut observed = ObservedState::new();
        observed.insert(
            group,
            ObservedResource::looked_up(RemoteRecord::new("7"), Properties::new()),
        );
        let plan = reconcile(&decl, &observed).unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_dependency_on_undeclared_managed_resource_is_unresolved() {
        let mut observed = ObservedState::new();
        observed.insert(
            key("gone"),
            ObservedResource::managed(RemoteRecord::new("1"), Properties::new(), Vec::new()),
        );
        let mut decl = Declaration::new();
        decl.add_resource("test", "x", Properties::new(), &[key("gone")])
            .unwrap();
        assert!(matches!(
            reconcile(&decl, &observed),
            Err(DeclarationError::UnresolvedDependency { .. })
        ));
    }

    #[test]
    fn test_matching_target() {
        let mut decl = Declaration::new();
        decl.add_resource("github_repository", "desired-state", Properties::new(), &[])
            .unwrap();
        decl.add_resource("github_issue_label", "docker", Properties::new(), &[])
            .unwrap();
        decl.add_resource("gitlab_project", "desired-state", Properties::new(), &[])
            .unwrap();
        let plan = reconcile(&decl, &ObservedState::new()).unwrap();

        assert_eq!(plan.matching(None).len(), 3);
        assert_eq!(plan.matching(Some("github")).len(), 2);
        assert_eq!(plan.matching(Some("github_issue_label.dock")).len(), 1);
        assert_eq!(plan.matching(Some("gitlab_project.nope")).len(), 0);
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("github"), (Some("github".to_string()), None));
        assert_eq!(
            parse_target("github_issue_label.docker"),
            (
                Some("github_issue_label".to_string()),
                Some("docker".to_string())
            )
        );
    }
}
