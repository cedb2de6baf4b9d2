//! GitLab REST v4 provider.
//!
//! Resolves groups by full path (lookup only) and manages projects inside
//! them. Project ids are GitLab's numeric ids.

use crate::client::{Auth, DEFAULT_TIMEOUT, RestClient};
use crate::convert::{self, int_field, str_field};
use crate::error::{Error, Result};
use declarative::{ApiError, Inputs, Lookup, Properties, Provider, RemoteRecord, ResourceSpec};
use serde_json::{Value as Json, json};
use std::time::Duration;

/// Default GitLab API base.
pub const GITLAB_API: &str = "https://gitlab.com/api/v4";

pub const GROUP: &str = "gitlab_group";
pub const PROJECT: &str = "gitlab_project";

const PROJECT_FIELDS: &[&str] = &[
    "name",
    "description",
    "visibility",
    "topics",
    "issues_enabled",
    "lfs_enabled",
    "merge_requests_enabled",
    "merge_method",
    "only_allow_merge_if_pipeline_succeeds",
    "remove_source_branch_after_merge",
    "shared_runners_enabled",
    "auto_cancel_pending_pipelines",
    "builds_access_level",
];

/// Declared project properties that are not sent as-is.
const LOCAL_PROPERTIES: &[&str] = &["namespace"];

pub struct GitLabProvider {
    client: RestClient,
}

impl GitLabProvider {
    /// Create a provider against gitlab.com.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(GITLAB_API, token, DEFAULT_TIMEOUT)
    }

    /// Create a provider with a custom API base (self-managed GitLab).
    #[must_use]
    pub fn with_api_base(
        api_base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: RestClient::new(api_base, token, Auth::PrivateToken, timeout),
        }
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        self.client.api_base()
    }

    fn lookup_group(&self, lookup: &Lookup) -> Result<RemoteRecord> {
        let full_path = lookup
            .get_str("full_path")
            .ok_or_else(|| Error::missing(GROUP, "full_path"))?;
        let response = self.client.get(&["groups", full_path])?;
        group_record(&response)
    }

    fn create_project(&self, spec: &ResourceSpec, inputs: &Inputs) -> Result<RemoteRecord> {
        let mut body = convert::body(&spec.properties, LOCAL_PROPERTIES);
        body.insert("namespace_id".into(), json!(namespace_id(inputs)?));
        if let Some(name) = spec.get_str("name") {
            body.entry("path").or_insert_with(|| json!(name));
        }
        let response = self.client.post(&["projects"], &Json::Object(body))?;
        project_record(&response)
    }

    fn update_project(&self, spec: &ResourceSpec, current: &RemoteRecord) -> Result<RemoteRecord> {
        let body = convert::body(&spec.properties, LOCAL_PROPERTIES);
        let response = self
            .client
            .put(&["projects", &current.id], &Json::Object(body))?;
        project_record(&response)
    }

    fn get_project(&self, id: &str) -> Result<Properties> {
        let response = self.client.get(&["projects", id])?;
        Ok(project_properties(&response))
    }
}

impl Provider for GitLabProvider {
    fn name(&self) -> &str {
        "gitlab"
    }

    fn handles(&self, resource_type: &str) -> bool {
        matches!(resource_type, GROUP | PROJECT)
    }

    fn get(&self, resource_type: &str, id: &str) -> std::result::Result<Properties, ApiError> {
        let result = match resource_type {
            PROJECT => self.get_project(id),
            other => Err(Error::UnsupportedType(other.to_string())),
        };
        result.map_err(|e| e.into_api(resource_type, id))
    }

    fn create(
        &self,
        spec: &ResourceSpec,
        inputs: &Inputs,
    ) -> std::result::Result<RemoteRecord, ApiError> {
        let result = match spec.resource_type() {
            PROJECT => self.create_project(spec, inputs),
            other => Err(Error::UnsupportedType(other.to_string())),
        };
        result.map_err(|e| e.into_api(spec.resource_type(), &spec.key.name))
    }

    fn update(
        &self,
        spec: &ResourceSpec,
        current: &RemoteRecord,
        _inputs: &Inputs,
    ) -> std::result::Result<RemoteRecord, ApiError> {
        let result = match spec.resource_type() {
            PROJECT => self.update_project(spec, current),
            other => Err(Error::UnsupportedType(other.to_string())),
        };
        result.map_err(|e| e.into_api(spec.resource_type(), &current.id))
    }

    fn delete(
        &self,
        resource_type: &str,
        current: &RemoteRecord,
    ) -> std::result::Result<(), ApiError> {
        let result = match resource_type {
            PROJECT => self.client.delete(&["projects", &current.id]),
            other => Err(Error::UnsupportedType(other.to_string())),
        };
        result.map_err(|e| e.into_api(resource_type, &current.id))
    }

    fn lookup(&self, lookup: &Lookup) -> std::result::Result<RemoteRecord, ApiError> {
        let resource_type = lookup.key.resource_type.as_str();
        let result = match resource_type {
            GROUP => self.lookup_group(lookup),
            other => Err(Error::UnsupportedType(other.to_string())),
        };
        let query = lookup.get_str("full_path").unwrap_or(&lookup.key.name);
        result.map_err(|e| e.into_api(resource_type, query))
    }
}

/// Numeric id of the group the project is created in.
fn namespace_id(inputs: &Inputs) -> Result<i64> {
    let (_, group) = inputs
        .first_of_type(GROUP)
        .ok_or_else(|| Error::missing(PROJECT, "namespace_id"))?;
    group
        .output_int("group_id")
        .or_else(|| group.id.parse().ok())
        .ok_or_else(|| Error::InvalidResponse(format!("group id '{}' is not numeric", group.id)))
}

fn group_record(response: &Json) -> Result<RemoteRecord> {
    let id = int_field(response, "id")?;
    let mut record = RemoteRecord::new(id.to_string()).with_output("group_id", id);
    for field in ["full_path", "web_url"] {
        if let Some(value) = response.get(field).and_then(Json::as_str) {
            record = record.with_output(field, value);
        }
    }
    Ok(record)
}

fn project_record(response: &Json) -> Result<RemoteRecord> {
    let id = int_field(response, "id")?;
    Ok(RemoteRecord::new(id.to_string())
        .with_output("name", str_field(response, "name")?)
        .with_output("web_url", str_field(response, "web_url")?)
        .with_output(
            "path_with_namespace",
            response
                .get("path_with_namespace")
                .and_then(Json::as_str)
                .unwrap_or_default(),
        ))
}

fn project_properties(response: &Json) -> Properties {
    let mut props = convert::pick(response, PROJECT_FIELDS);
    if let Some(namespace) = response
        .pointer("/namespace/full_path")
        .and_then(Json::as_str)
    {
        props.insert("namespace".into(), namespace.into());
    }
    props
}
