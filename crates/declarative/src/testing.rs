//! In-memory provider for engine tests

use crate::context::{Inputs, Provider};
use crate::error::ApiError;
use crate::resource::{Lookup, RemoteRecord, ResourceSpec};
use crate::types::Properties;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

/// Provider for type `test` and lookups of type `group`
///
/// Remote ids equal the resource name. Creates fail permanently if a
/// dependency's record is missing from the inputs.
#[derive(Default)]
pub struct MockProvider {
    calls: Mutex<Vec<String>>,
    permanent: BTreeSet<String>,
    transient: Mutex<HashMap<String, u32>>,
    remote: Mutex<BTreeMap<String, Properties>>,
    groups: BTreeMap<String, RemoteRecord>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_permanently(mut self, name: &str) -> Self {
        self.permanent.insert(name.to_string());
        self
    }

    pub fn fail_transiently(self, name: &str, times: u32) -> Self {
        self.transient
            .lock()
            .unwrap()
            .insert(name.to_string(), times);
        self
    }

    pub fn with_remote(self, id: &str, properties: Properties) -> Self {
        self.remote
            .lock()
            .unwrap()
            .insert(id.to_string(), properties);
        self
    }

    pub fn with_group(mut self, full_path: &str, id: &str) -> Self {
        self.groups
            .insert(full_path.to_string(), RemoteRecord::new(id));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remote_ids(&self) -> Vec<String> {
        self.remote.lock().unwrap().keys().cloned().collect()
    }

    fn record_call(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_failure(&self, name: &str) -> Result<(), ApiError> {
        if self.permanent.contains(name) {
            return Err(ApiError::Permanent {
                message: format!("{name} rejected"),
                status: Some(422),
            });
        }
        let mut transient = self.transient.lock().unwrap();
        if let Some(remaining) = transient.get_mut(name)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ApiError::transient(format!("{name} rate limited")));
        }
        Ok(())
    }

    fn store(&self, spec: &ResourceSpec, inputs: &Inputs) -> Result<RemoteRecord, ApiError> {
        for dep in &spec.depends_on {
            if !inputs.contains(dep) {
                return Err(ApiError::permanent(format!("missing input {dep}")));
            }
        }
        let id = spec.key.name.clone();
        self.remote
            .lock()
            .unwrap()
            .insert(id.clone(), spec.properties.clone());
        Ok(RemoteRecord::new(id.clone()).with_output("url", format!("mock://{id}")))
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn handles(&self, resource_type: &str) -> bool {
        resource_type == "test" || resource_type == "group"
    }

    fn get(&self, resource_type: &str, id: &str) -> Result<Properties, ApiError> {
        self.record_call(format!("get {resource_type}.{id}"));
        self.remote
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(resource_type, id))
    }

    fn create(&self, spec: &ResourceSpec, inputs: &Inputs) -> Result<RemoteRecord, ApiError> {
        self.record_call(format!("create {}", spec.key));
        self.check_failure(&spec.key.name)?;
        self.store(spec, inputs)
    }

    fn update(
        &self,
        spec: &ResourceSpec,
        _current: &RemoteRecord,
        inputs: &Inputs,
    ) -> Result<RemoteRecord, ApiError> {
        self.record_call(format!("update {}", spec.key));
        self.check_failure(&spec.key.name)?;
        self.store(spec, inputs)
    }

    fn delete(&self, resource_type: &str, current: &RemoteRecord) -> Result<(), ApiError> {
        self.record_call(format!("delete {resource_type}.{}", current.id));
        self.check_failure(&current.id)?;
        self.remote
            .lock()
            .unwrap()
            .remove(&current.id)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(resource_type, &current.id))
    }

    fn lookup(&self, lookup: &Lookup) -> Result<RemoteRecord, ApiError> {
        self.record_call(format!("lookup {}", lookup.key));
        let path = lookup.get_str("full_path").unwrap_or_default();
        self.groups
            .get(path)
            .cloned()
            .ok_or_else(|| ApiError::not_found(&lookup.key.resource_type, path))
    }
}
