//! Declaration builder - the desired-state resource graph
//!
//! Resources are kept in declaration order; edges point from a resource to
//! the resources that must exist before it. The graph is kept acyclic at
//! every step: a rejected edge leaves the declaration untouched.

use crate::error::DeclarationError;
use crate::resource::{Lookup, ResourceRef, ResourceSpec};
use crate::types::{Properties, ResourceKey};
use std::collections::{BTreeSet, HashMap, HashSet};

/// The desired-state resource graph
#[derive(Debug, Clone, Default)]
pub struct Declaration {
    resources: Vec<ResourceSpec>,
    index: HashMap<ResourceKey, usize>,
    lookups: Vec<Lookup>,
}

impl Declaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a managed resource
    ///
    /// Dependencies may name keys that are not declared yet (or are
    /// expected in observed state); those are checked at reconcile time.
    pub fn add_resource(
        &mut self,
        resource_type: &str,
        name: &str,
        properties: Properties,
        depends_on: &[ResourceKey],
    ) -> Result<ResourceRef, DeclarationError> {
        let mut spec = ResourceSpec::new(resource_type, name).properties(properties);
        for dep in depends_on {
            spec = spec.depends_on(dep.clone());
        }
        self.add_spec(spec)
    }

    /// Declare a managed resource from a fully built spec
    pub fn add_spec(&mut self, spec: ResourceSpec) -> Result<ResourceRef, DeclarationError> {
        self.ensure_unique(&spec.key)?;

        // A new node can only close a cycle through edges that already
        // point at its key (dependencies declared before it was).
        for dep in &spec.depends_on {
            if let Some(path) = self.path_between(dep, &spec.key) {
                let mut cycle = vec![spec.key.clone()];
                cycle.extend(path);
                return Err(DeclarationError::CyclicDependency { cycle });
            }
        }

        let key = spec.key.clone();
        self.index.insert(key.clone(), self.resources.len());
        self.resources.push(spec);
        log::debug!("declared {key}");
        Ok(ResourceRef::new(key))
    }

    /// Declare a read-only lookup of an existing remote resource
    pub fn add_lookup(
        &mut self,
        resource_type: &str,
        name: &str,
        query: Properties,
    ) -> Result<ResourceRef, DeclarationError> {
        let lookup = Lookup::new(resource_type, name, query);
        self.ensure_unique(&lookup.key)?;
        let key = lookup.key.clone();
        self.lookups.push(lookup);
        Ok(ResourceRef::new(key))
    }

    /// Add an edge `from` depends on `to`
    ///
    /// Fails with [`DeclarationError::CyclicDependency`] if the edge would
    /// close a cycle; the declaration is unchanged in that case.
    pub fn add_dependency(
        &mut self,
        from: &ResourceKey,
        to: &ResourceKey,
    ) -> Result<(), DeclarationError> {
        let Some(&idx) = self.index.get(from) else {
            return Err(DeclarationError::UnknownResource(from.clone()));
        };

        if let Some(path) = self.path_between(to, from) {
            let mut cycle = vec![from.clone()];
            cycle.extend(path);
            return Err(DeclarationError::CyclicDependency { cycle });
        }

        let deps = &mut self.resources[idx].depends_on;
        if !deps.contains(to) {
            deps.push(to.clone());
        }
        Ok(())
    }

    fn ensure_unique(&self, key: &ResourceKey) -> Result<(), DeclarationError> {
        if self.index.contains_key(key) || self.lookups.iter().any(|l| &l.key == key) {
            return Err(DeclarationError::DuplicateName { key: key.clone() });
        }
        Ok(())
    }

    /// Follow dependency edges from `start`; return the path to `target`
    /// (inclusive of both ends) if one exists.
    fn path_between(&self, start: &ResourceKey, target: &ResourceKey) -> Option<Vec<ResourceKey>> {
        if start == target {
            return Some(vec![start.clone()]);
        }

        let mut visited = HashSet::new();
        let mut stack = vec![vec![start.clone()]];
        while let Some(path) = stack.pop() {
            let Some(current) = path.last() else { continue };
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(spec) = self.get(current) else {
                continue;
            };
            for dep in &spec.depends_on {
                let mut next = path.clone();
                next.push(dep.clone());
                if dep == target {
                    return Some(next);
                }
                stack.push(next);
            }
        }
        None
    }

    /// Managed resources in declaration order
    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn lookups(&self) -> &[Lookup] {
        &self.lookups
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ResourceSpec> {
        self.index.get(key).map(|&i| &self.resources[i])
    }

    pub fn get_lookup(&self, key: &ResourceKey) -> Option<&Lookup> {
        self.lookups.iter().find(|l| &l.key == key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn is_lookup(&self, key: &ResourceKey) -> bool {
        self.get_lookup(key).is_some()
    }

    /// Resources plus lookups
    pub fn len(&self) -> usize {
        self.resources.len() + self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.lookups.is_empty()
    }

    /// Declared resources in dependency order, ties broken by declaration order
    ///
    /// Returns indices into [`Declaration::resources`]. Edges to keys that are
    /// not declared resources are ignored.
    pub fn topological_order(&self) -> Vec<usize> {
        let n = self.resources.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, spec) in self.resources.iter().enumerate() {
            for dep in &spec.depends_on {
                if let Some(&d) = self.index.get(dep) {
                    in_degree[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &d in &dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.insert(d);
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new("test", name)
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut decl = Declaration::new();
        decl.add_resource("test", "a", Properties::new(), &[]).unwrap();
        let err = decl
            .add_resource("test", "a", Properties::new(), &[])
            .unwrap_err();
        assert_eq!(err, DeclarationError::DuplicateName { key: key("a") });

        // Same name in another type namespace is fine
        decl.add_resource("other", "a", Properties::new(), &[])
            .unwrap();
        assert_eq!(decl.len(), 2);
    }

    #[test]
    fn test_lookup_shares_namespace() {
        let mut decl = Declaration::new();
        decl.add_lookup("test", "group", Properties::new()).unwrap();
        assert_eq!(decl.len(), 1);
        assert!(!decl.is_empty());
        assert!(matches!(
            decl.add_resource("test", "group", Properties::new(), &[]),
            Err(DeclarationError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let mut decl = Declaration::new();
        let err = decl
            .add_resource("test", "a", Properties::new(), &[key("a")])
            .unwrap_err();
        assert!(matches!(err, DeclarationError::CyclicDependency { .. }));
        assert!(decl.is_empty());
    }

    #[test]
    fn test_forward_reference_cycle_detected() {
        let mut decl = Declaration::new();
        // a depends on b before b is declared
        decl.add_resource("test", "a", Properties::new(), &[key("b")])
            .unwrap();
        let err = decl
            .add_resource("test", "b", Properties::new(), &[key("a")])
            .unwrap_err();
        assert_eq!(
            err,
            DeclarationError::CyclicDependency {
                cycle: vec![key("b"), key("a"), key("b")]
            }
        );
        assert!(!decl.contains(&key("b")));
    }

    #[test]
    fn test_add_dependency_cycle_leaves_declaration_unchanged() {
        let mut decl = Declaration::new();
        let a = decl.add_resource("test", "a", Properties::new(), &[]).unwrap();
        let b = decl
            .add_resource("test", "b", Properties::new(), &[a.key().clone()])
            .unwrap();
        let c = decl
            .add_resource("test", "c", Properties::new(), &[b.key().clone()])
            .unwrap();

        let before = decl.get(a.key()).unwrap().depends_on.clone();
        let err = decl.add_dependency(a.key(), c.key()).unwrap_err();
        assert!(matches!(err, DeclarationError::CyclicDependency { .. }));
        assert_eq!(decl.get(a.key()).unwrap().depends_on, before);

        // A non-cyclic edge is accepted
        decl.add_dependency(c.key(), a.key()).unwrap();
        assert_eq!(decl.get(c.key()).unwrap().depends_on.len(), 2);
    }

    #[test]
    fn test_add_dependency_unknown_from() {
        let mut decl = Declaration::new();
        assert_eq!(
            decl.add_dependency(&key("x"), &key("y")),
            Err(DeclarationError::UnknownResource(key("x")))
        );
    }

    #[test]
    fn test_topological_order_ties_by_declaration_order() {
        let mut decl = Declaration::new();
        // c is declared first but depends on a
        decl.add_resource("test", "c", Properties::new(), &[key("a")])
            .unwrap();
        decl.add_resource("test", "a", Properties::new(), &[]).unwrap();
        decl.add_resource("test", "b", Properties::new(), &[]).unwrap();

        let order: Vec<&str> = decl
            .topological_order()
            .into_iter()
            .map(|i| decl.resources()[i].key.name.as_str())
            .collect();
        assert_eq!(order, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_topological_order_ignores_external_edges() {
        let mut decl = Declaration::new();
        decl.add_lookup("group", "g", Properties::new()).unwrap();
        decl.add_resource(
            "test",
            "project",
            Properties::new(),
            &[ResourceKey::new("group", "g")],
        )
        .unwrap();
        assert_eq!(decl.topological_order(), vec![0]);
    }
}
