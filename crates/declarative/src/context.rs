//! Provider and callback traits
//!
//! These traits keep the engine free of any particular remote API, prompt
//! library or output format. Implementations live in the calling crates.

use crate::error::ApiError;
use crate::resource::{Lookup, RemoteRecord, ResourceSpec};
use crate::types::{Properties, ResourceKey};
use anyhow::Result;
use std::collections::BTreeMap;

/// Remote records of the resources an operation depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inputs {
    records: BTreeMap<ResourceKey, RemoteRecord>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ResourceKey, record: RemoteRecord) {
        self.records.insert(key, record);
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&RemoteRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.records.contains_key(key)
    }

    /// First input of the given type, in key order
    pub fn first_of_type(&self, resource_type: &str) -> Option<(&ResourceKey, &RemoteRecord)> {
        self.records
            .iter()
            .find(|(k, _)| k.resource_type == resource_type)
    }

    /// Input record of the given type, or a permanent error naming it
    pub fn require(&self, resource_type: &str) -> Result<&RemoteRecord, ApiError> {
        self.first_of_type(resource_type)
            .map(|(_, record)| record)
            .ok_or_else(|| {
                ApiError::permanent(format!("missing dependency of type {resource_type}"))
            })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<(ResourceKey, RemoteRecord)> for Inputs {
    fn from_iter<I: IntoIterator<Item = (ResourceKey, RemoteRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// A remote API that owns one or more resource types
///
/// Calls are blocking and may run concurrently from the executor's thread
/// pool. Implementations classify failures through [`ApiError`]; only
/// [`ApiError::Transient`] is retried.
pub trait Provider: Send + Sync {
    /// Short name used in logs ("github", "gitlab")
    fn name(&self) -> &str;

    /// Whether this provider manages the given resource type
    fn handles(&self, resource_type: &str) -> bool;

    /// Read the live properties of a remote object
    fn get(&self, resource_type: &str, id: &str) -> Result<Properties, ApiError>;

    /// Create the object; returns its provider-assigned identity
    fn create(&self, spec: &ResourceSpec, inputs: &Inputs) -> Result<RemoteRecord, ApiError>;

    /// Converge an existing object to `spec`
    fn update(
        &self,
        spec: &ResourceSpec,
        current: &RemoteRecord,
        inputs: &Inputs,
    ) -> Result<RemoteRecord, ApiError>;

    fn delete(&self, resource_type: &str, current: &RemoteRecord) -> Result<(), ApiError>;

    /// Resolve a read-only lookup
    fn lookup(&self, lookup: &Lookup) -> Result<RemoteRecord, ApiError> {
        Err(ApiError::Unsupported(format!(
            "{} does not support lookups of {}",
            self.name(),
            lookup.key.resource_type
        )))
    }
}

/// Routes each call to the first provider that handles the resource type
#[derive(Default)]
pub struct ProviderSet {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl Provider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn push(&mut self, provider: Box<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn route(&self, resource_type: &str) -> Result<&dyn Provider, ApiError> {
        self.providers
            .iter()
            .find(|p| p.handles(resource_type))
            .map(AsRef::as_ref)
            .ok_or_else(|| {
                ApiError::Unsupported(format!("no provider configured for {resource_type}"))
            })
    }
}

impl Provider for ProviderSet {
    fn name(&self) -> &str {
        "providers"
    }

    fn handles(&self, resource_type: &str) -> bool {
        self.providers.iter().any(|p| p.handles(resource_type))
    }

    fn get(&self, resource_type: &str, id: &str) -> Result<Properties, ApiError> {
        self.route(resource_type)?.get(resource_type, id)
    }

    fn create(&self, spec: &ResourceSpec, inputs: &Inputs) -> Result<RemoteRecord, ApiError> {
        self.route(spec.resource_type())?.create(spec, inputs)
    }

    fn update(
        &self,
        spec: &ResourceSpec,
        current: &RemoteRecord,
        inputs: &Inputs,
    ) -> Result<RemoteRecord, ApiError> {
        self.route(spec.resource_type())?
            .update(spec, current, inputs)
    }

    fn delete(&self, resource_type: &str, current: &RemoteRecord) -> Result<(), ApiError> {
        self.route(resource_type)?.delete(resource_type, current)
    }

    fn lookup(&self, lookup: &Lookup) -> Result<RemoteRecord, ApiError> {
        self.route(&lookup.key.resource_type)?.lookup(lookup)
    }
}

/// Confirmation callback for user interaction
///
/// Implement this trait to handle user confirmations.
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;

    #[test]
    fn test_inputs_require_by_type() {
        let inputs: Inputs = [(
            ResourceKey::new("gitlab_group", "mirror"),
            RemoteRecord::new("42"),
        )]
        .into_iter()
        .collect();
        assert_eq!(inputs.require("gitlab_group").unwrap().id, "42");
        let err = inputs.require("github_repository").unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("github_repository"));
    }

    #[test]
    fn test_provider_set_routes_by_type() {
        let set = ProviderSet::new().with(MockProvider::new());
        assert!(set.handles("test"));
        assert!(!set.handles("github_repository"));

        let spec = ResourceSpec::new("test", "a");
        assert!(set.create(&spec, &Inputs::new()).is_ok());

        let other = ResourceSpec::new("github_repository", "r");
        let err = set.create(&other, &Inputs::new()).unwrap_err();
        assert!(matches!(err, ApiError::Unsupported(_)));
    }

    #[test]
    fn test_default_lookup_is_unsupported() {
        struct Bare;
        impl Provider for Bare {
            fn name(&self) -> &str {
                "bare"
            }
            fn handles(&self, _: &str) -> bool {
                true
            }
            fn get(&self, t: &str, id: &str) -> Result<Properties, ApiError> {
                Err(ApiError::not_found(t, id))
            }
            fn create(&self, _: &ResourceSpec, _: &Inputs) -> Result<RemoteRecord, ApiError> {
                Ok(RemoteRecord::new("1"))
            }
            fn update(
                &self,
                _: &ResourceSpec,
                current: &RemoteRecord,
                _: &Inputs,
            ) -> Result<RemoteRecord, ApiError> {
                Ok(current.clone())
            }
            fn delete(&self, _: &str, _: &RemoteRecord) -> Result<(), ApiError> {
                Ok(())
            }
        }

        let lookup = Lookup::new("group", "g", Properties::new());
        assert!(matches!(Bare.lookup(&lookup), Err(ApiError::Unsupported(_))));
    }
}
