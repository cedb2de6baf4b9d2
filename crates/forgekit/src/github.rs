//! GitHub REST v3 provider.
//!
//! Manages repositories, branch protection, issue labels and Actions
//! secrets for one owner (user or organization).
//!
//! Composite remote ids are `repo:name` for objects that live inside a
//! repository (`desired-state:main`, `desired-state:GITLAB_TOKEN`).

use crate::client::{Auth, DEFAULT_TIMEOUT, RestClient};
use crate::convert::{self, str_field};
use crate::error::{Error, Result};
use crate::seal::seal;
use declarative::{ApiError, Inputs, Properties, Provider, RemoteRecord, ResourceSpec, Value};
use serde_json::{Value as Json, json};
use std::time::Duration;

/// Default GitHub API base.
pub const GITHUB_API: &str = "https://api.github.com";

pub const REPOSITORY: &str = "github_repository";
pub const BRANCH_PROTECTION: &str = "github_branch_protection";
pub const ISSUE_LABEL: &str = "github_issue_label";
pub const ACTIONS_SECRET: &str = "github_actions_secret";

const REPOSITORY_FIELDS: &[&str] = &[
    "name",
    "description",
    "visibility",
    "has_issues",
    "has_projects",
    "delete_branch_on_merge",
    "topics",
];

const LABEL_FIELDS: &[&str] = &["name", "color", "description"];

/// GitHub provider bound to one owner.
///
/// # Example
///
/// ```no_run
/// use forgekit::GitHubProvider;
/// use declarative::Provider;
///
/// let github = GitHubProvider::new("ghp_token", "softwaredevelop");
/// assert!(github.handles("github_repository"));
/// ```
pub struct GitHubProvider {
    client: RestClient,
    owner: String,
}

impl GitHubProvider {
    /// Create a provider against api.github.com.
    #[must_use]
    pub fn new(token: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::with_api_base(GITHUB_API, token, owner, DEFAULT_TIMEOUT)
    }

    /// Create a provider with a custom API base (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_api_base(
        api_base: impl Into<String>,
        token: impl Into<String>,
        owner: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: RestClient::new(api_base, token, Auth::Bearer, timeout)
                .with_accept("application/vnd.github+json"),
            owner: owner.into(),
        }
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Collection URL for new repositories of this owner.
    fn new_repository_path(&self) -> Result<Vec<String>> {
        let account = self.client.get(&["users", &self.owner])?;
        if str_field(&account, "type")? == "Organization" {
            Ok(vec!["orgs".into(), self.owner.clone(), "repos".into()])
        } else {
            Ok(vec!["user".into(), "repos".into()])
        }
    }

    // ---------------------------------------------------------------------
    // Repository
    // ---------------------------------------------------------------------

    fn create_repository(&self, spec: &ResourceSpec) -> Result<RemoteRecord> {
        let mut body = convert::body(&spec.properties, &["topics"]);
        // Branch protection needs a default branch to exist
        body.insert("auto_init".into(), Json::Bool(true));

        let path = self.new_repository_path()?;
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        let response = self.client.post(&segments, &Json::Object(body))?;
        let record = repository_record(&response)?;
        self.put_topics(&record.id, spec)?;
        Ok(record)
    }

    fn update_repository(&self, spec: &ResourceSpec, current: &RemoteRecord) -> Result<RemoteRecord> {
        let body = convert::body(&spec.properties, &["topics"]);
        let response = self.client.patch(
            &["repos", &self.owner, &current.id],
            &Json::Object(body),
        )?;
        let record = repository_record(&response)?;
        self.put_topics(&record.id, spec)?;
        Ok(record)
    }

    fn put_topics(&self, repo: &str, spec: &ResourceSpec) -> Result<()> {
        let Some(topics) = spec.properties.get("topics").and_then(Value::as_list) else {
            return Ok(());
        };
        self.client.put(
            &["repos", &self.owner, repo, "topics"],
            &json!({ "names": topics }),
        )?;
        Ok(())
    }

    fn get_repository(&self, id: &str) -> Result<Properties> {
        let response = self.client.get(&["repos", &self.owner, id])?;
        Ok(convert::pick(&response, REPOSITORY_FIELDS))
    }

    // ---------------------------------------------------------------------
    // Branch protection
    // ---------------------------------------------------------------------

    fn put_branch_protection(&self, spec: &ResourceSpec, inputs: &Inputs) -> Result<RemoteRecord> {
        let repo = repository_name(spec, inputs)?;
        let pattern = required_str(spec, "pattern")?;
        self.client.put(
            &["repos", &self.owner, &repo, "branches", pattern, "protection"],
            &protection_body(spec),
        )?;
        Ok(RemoteRecord::new(format!("{repo}:{pattern}")).with_output("repository", repo))
    }

    fn get_branch_protection(&self, id: &str) -> Result<Properties> {
        let (repo, pattern) = split_id(id)?;
        let response = self.client.get(&[
            "repos",
            &self.owner,
            repo,
            "branches",
            pattern,
            "protection",
        ])?;
        Ok(protection_properties(repo, pattern, &response))
    }

    fn delete_branch_protection(&self, id: &str) -> Result<()> {
        let (repo, pattern) = split_id(id)?;
        self.client.delete(&[
            "repos",
            &self.owner,
            repo,
            "branches",
            pattern,
            "protection",
        ])
    }

    // ---------------------------------------------------------------------
    // Issue labels
    // ---------------------------------------------------------------------

    fn create_label(&self, spec: &ResourceSpec, inputs: &Inputs) -> Result<RemoteRecord> {
        let repo = repository_name(spec, inputs)?;
        let body = convert::body(&spec.properties, &["repository"]);
        let response = self
            .client
            .post(&["repos", &self.owner, &repo, "labels"], &Json::Object(body))?;
        label_record(&repo, &response)
    }

    fn update_label(
        &self,
        spec: &ResourceSpec,
        current: &RemoteRecord,
        inputs: &Inputs,
    ) -> Result<RemoteRecord> {
        let (_, old_name) = split_id(&current.id)?;
        let repo = repository_name(spec, inputs)?;
        let mut body = convert::body(&spec.properties, &["repository", "name"]);
        body.insert("new_name".into(), json!(required_str(spec, "name")?));
        let response = self.client.patch(
            &["repos", &self.owner, &repo, "labels", old_name],
            &Json::Object(body),
        )?;
        label_record(&repo, &response)
    }

    fn get_label(&self, id: &str) -> Result<Properties> {
        let (repo, name) = split_id(id)?;
        let response = self
            .client
            .get(&["repos", &self.owner, repo, "labels", name])?;
        Ok(label_properties(repo, &response))
    }

    // ---------------------------------------------------------------------
    // Actions secrets
    // ---------------------------------------------------------------------

    fn put_secret(&self, spec: &ResourceSpec, inputs: &Inputs) -> Result<RemoteRecord> {
        let repo = repository_name(spec, inputs)?;
        let name = required_str(spec, "secret_name")?;
        let value = spec
            .get_sensitive("value")
            .ok_or_else(|| Error::missing(ACTIONS_SECRET, "value"))?;

        let public_key = self
            .client
            .get(&["repos", &self.owner, &repo, "actions", "secrets", "public-key"])?;
        let encrypted = seal(str_field(&public_key, "key")?, value)?;
        self.client.put(
            &["repos", &self.owner, &repo, "actions", "secrets", name],
            &json!({
                "encrypted_value": encrypted,
                "key_id": str_field(&public_key, "key_id")?,
            }),
        )?;
        log::debug!("stored actions secret {name} on {repo}");
        Ok(RemoteRecord::new(format!("{repo}:{name}")).with_output("repository", repo))
    }

    fn get_secret(&self, id: &str) -> Result<Properties> {
        let (repo, name) = split_id(id)?;
        let response = self
            .client
            .get(&["repos", &self.owner, repo, "actions", "secrets", name])?;
        let mut props = Properties::new();
        props.insert("repository".into(), repo.into());
        props.insert("secret_name".into(), str_field(&response, "name")?.into());
        Ok(props)
    }

    fn delete_nested(&self, id: &str, collection: &[&str]) -> Result<()> {
        let (repo, name) = split_id(id)?;
        let mut segments = vec!["repos", self.owner.as_str(), repo];
        segments.extend_from_slice(collection);
        segments.push(name);
        self.client.delete(&segments)
    }
}

impl Provider for GitHubProvider {
    fn name(&self) -> &str {
        "github"
    }

    fn handles(&self, resource_type: &str) -> bool {
        matches!(
            resource_type,
            REPOSITORY | BRANCH_PROTECTION | ISSUE_LABEL | ACTIONS_SECRET
        )
    }

    fn get(&self, resource_type: &str, id: &str) -> std::result::Result<Properties, ApiError> {
        let result = match resource_type {
            REPOSITORY => self.get_repository(id),
            BRANCH_PROTECTION => self.get_branch_protection(id),
            ISSUE_LABEL => self.get_label(id),
            ACTIONS_SECRET => self.get_secret(id),
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
            REPOSITORY => self.create_repository(spec),
            BRANCH_PROTECTION => self.put_branch_protection(spec, inputs),
            ISSUE_LABEL => self.create_label(spec, inputs),
            ACTIONS_SECRET => self.put_secret(spec, inputs),
            other => Err(Error::UnsupportedType(other.to_string())),
        };
        result.map_err(|e| e.into_api(spec.resource_type(), &spec.key.name))
    }

    fn update(
        &self,
        spec: &ResourceSpec,
        current: &RemoteRecord,
        inputs: &Inputs,
    ) -> std::result::Result<RemoteRecord, ApiError> {
        let result = match spec.resource_type() {
            REPOSITORY => self.update_repository(spec, current),
            BRANCH_PROTECTION => self.put_branch_protection(spec, inputs),
            ISSUE_LABEL => self.update_label(spec, current, inputs),
            ACTIONS_SECRET => self.put_secret(spec, inputs),
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
            REPOSITORY => self.client.delete(&["repos", &self.owner, &current.id]),
            BRANCH_PROTECTION => self.delete_branch_protection(&current.id),
            ISSUE_LABEL => self.delete_nested(&current.id, &["labels"]),
            ACTIONS_SECRET => self.delete_nested(&current.id, &["actions", "secrets"]),
            other => Err(Error::UnsupportedType(other.to_string())),
        };
        result.map_err(|e| e.into_api(resource_type, &current.id))
    }
}

/// Repository a nested resource belongs to: the dependency's record, or the
/// declared `repository` property.
fn repository_name(spec: &ResourceSpec, inputs: &Inputs) -> Result<String> {
    if let Some((_, record)) = inputs.first_of_type(REPOSITORY) {
        return Ok(record.id.clone());
    }
    required_str(spec, "repository").map(str::to_string)
}

fn required_str<'a>(spec: &'a ResourceSpec, property: &str) -> Result<&'a str> {
    spec.get_str(property)
        .ok_or_else(|| Error::missing(spec.resource_type(), property))
}

fn split_id(id: &str) -> Result<(&str, &str)> {
    id.split_once(':')
        .filter(|(repo, name)| !repo.is_empty() && !name.is_empty())
        .ok_or_else(|| Error::InvalidResponse(format!("malformed remote id '{id}'")))
}

fn repository_record(response: &Json) -> Result<RemoteRecord> {
    let mut record = RemoteRecord::new(str_field(response, "name")?);
    for field in ["node_id", "html_url", "full_name"] {
        if let Some(value) = response.get(field).and_then(Json::as_str) {
            record = record.with_output(field, value);
        }
    }
    Ok(record)
}

fn protection_body(spec: &ResourceSpec) -> Json {
    let linear = spec
        .properties
        .get("required_linear_history")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    json!({
        "required_status_checks": null,
        "enforce_admins": null,
        "required_pull_request_reviews": null,
        "restrictions": null,
        "required_linear_history": linear,
    })
}

fn protection_properties(repo: &str, pattern: &str, response: &Json) -> Properties {
    let linear = response
        .pointer("/required_linear_history/enabled")
        .and_then(Json::as_bool)
        .unwrap_or(false);
    let mut props = Properties::new();
    props.insert("repository".into(), repo.into());
    props.insert("pattern".into(), pattern.into());
    props.insert("required_linear_history".into(), linear.into());
    props
}

/// Label properties with the colour upper-cased (GitHub answers lower case).
fn label_properties(repo: &str, response: &Json) -> Properties {
    let mut props = convert::pick(response, LABEL_FIELDS);
    if let Some(Value::String(color)) = props.get_mut("color") {
        *color = color.to_ascii_uppercase();
    }
    props.insert("repository".into(), repo.into());
    props
}

fn label_record(repo: &str, response: &Json) -> Result<RemoteRecord> {
    let name = str_field(response, "name")?;
    let mut record = RemoteRecord::new(format!("{repo}:{name}"));
    if let Some(url) = response.get("url").and_then(Json::as_str) {
        record = record.with_output("url", url);
    }
    Ok(record)
}
