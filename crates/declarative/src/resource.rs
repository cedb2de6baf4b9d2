//! Resource specifications, lookups and remote records
//!
//! A [`ResourceSpec`] is the desired state of one managed resource. A
//! [`Lookup`] references something that already exists remotely and is
//! never created or deleted. Both resolve to a [`RemoteRecord`] once the
//! provider has assigned or reported an identity.

use crate::types::{Properties, ResourceKey, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Suffix of the property that carries the digest of a sensitive input
pub const DIGEST_SUFFIX: &str = "_digest";

/// Hex blake3 digest of a sensitive value
pub fn digest(value: &str) -> String {
    blake3::hash(value.as_bytes()).to_hex().to_string()
}

/// Desired state of one managed resource
///
/// # Example
///
/// ```
/// use declarative::{ResourceKey, ResourceSpec};
///
/// let repo = ResourceKey::new("github_repository", "desired-state");
/// let secret = ResourceSpec::new("github_actions_secret", "gitlab-token")
///     .property("secret_name", "GITLAB_TOKEN")
///     .sensitive("value", "glpat-example")
///     .depends_on(repo.clone());
///
/// assert!(secret.properties.contains_key("value_digest"));
/// assert_eq!(secret.depends_on, vec![repo]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub key: ResourceKey,
    /// Diffed and persisted properties
    pub properties: Properties,
    /// Write-only inputs; passed to the provider, never diffed or persisted
    pub sensitive: BTreeMap<String, String>,
    /// Resources that must exist before this one
    pub depends_on: Vec<ResourceKey>,
    /// Declared properties excluded from drift detection
    pub ignore_changes: BTreeSet<String>,
}

impl ResourceSpec {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: ResourceKey::new(resource_type, name),
            properties: Properties::new(),
            sensitive: BTreeMap::new(),
            depends_on: Vec::new(),
            ignore_changes: BTreeSet::new(),
        }
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Add a write-only input
    ///
    /// The plaintext is kept out of `properties`; a `<name>_digest` property
    /// is recorded instead so that a changed value still shows up as drift.
    pub fn sensitive(mut self, name: impl Into<String>, plaintext: impl Into<String>) -> Self {
        let name = name.into();
        let plaintext = plaintext.into();
        self.properties.insert(
            format!("{name}{DIGEST_SUFFIX}"),
            Value::String(digest(&plaintext)),
        );
        self.sensitive.insert(name, plaintext);
        self
    }

    pub fn depends_on(mut self, key: impl Into<ResourceKey>) -> Self {
        let key = key.into();
        if !self.depends_on.contains(&key) {
            self.depends_on.push(key);
        }
        self
    }

    pub fn ignore_changes(mut self, name: impl Into<String>) -> Self {
        self.ignore_changes.insert(name.into());
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.key.resource_type
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    pub fn get_sensitive(&self, name: &str) -> Option<&str> {
        self.sensitive.get(name).map(String::as_str)
    }
}

/// Read-only reference to a resource that already exists remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub key: ResourceKey,
    /// Provider-specific query (e.g. `full_path` for a GitLab group)
    pub query: Properties,
}

impl Lookup {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>, query: Properties) -> Self {
        Self {
            key: ResourceKey::new(resource_type, name),
            query,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.query.get(name).and_then(Value::as_str)
    }
}

/// Remote identity assigned by a provider, plus output properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    #[serde(default)]
    pub outputs: Properties,
}

impl RemoteRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            outputs: Properties::new(),
        }
    }

    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }

    pub fn output_str(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).and_then(Value::as_str)
    }

    pub fn output_int(&self, name: &str) -> Option<i64> {
        self.outputs.get(name).and_then(Value::as_int)
    }
}

/// Handle to a declared resource or lookup, usable as a dependency
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    key: ResourceKey,
}

impl ResourceRef {
    pub(crate) fn new(key: ResourceKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }
}

impl From<ResourceRef> for ResourceKey {
    fn from(r: ResourceRef) -> Self {
        r.key
    }
}

impl From<&ResourceRef> for ResourceKey {
    fn from(r: &ResourceRef) -> Self {
        r.key.clone()
    }
}
