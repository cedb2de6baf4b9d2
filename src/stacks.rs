//! The two stacks of the `gitlab-mirror` project.
//!
//! `dev-desired-state` owns the GitHub side: the repository, its branch
//! protection, issue labels and the Actions secrets the mirror workflow
//! reads. `dev-desired-state-mirrored` owns the GitLab project the
//! repository is mirrored into.

use crate::config::{Config, ConfigError};
use declarative::{
    Declaration, DeclarationError, ObservedState, ProviderSet, ResourceKey, ResourceSpec, Value,
    properties,
};
use forgekit::github::{
    ACTIONS_SECRET, BRANCH_PROTECTION, GITHUB_API, ISSUE_LABEL, REPOSITORY,
};
use forgekit::gitlab::{GITLAB_API, GROUP, PROJECT};
use forgekit::{GitHubProvider, GitLabProvider};

/// Project every stack belongs to
pub const PROJECT_NAME: &str = "gitlab-mirror";

/// Name of the GitHub repository and of its GitLab mirror
pub const REPOSITORY_NAME: &str = "desired-state";

/// Remote API a stack talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forge {
    GitHub,
    GitLab,
}

/// A named declaration with its own state file
pub struct Stack {
    pub name: &'static str,
    pub description: &'static str,
    forges: &'static [Forge],
    build: fn(&Config) -> Result<Declaration, DeclarationError>,
    exports: &'static [Export],
}

/// A value published after a successful `up`
pub struct Export {
    pub name: &'static str,
    resource_type: &'static str,
    resource: &'static str,
    /// Output property to read; `None` exports the remote id
    output: Option<&'static str>,
}

impl Stack {
    pub fn declare(&self, config: &Config) -> Result<Declaration, DeclarationError> {
        (self.build)(config)
    }

    /// Resolve the exports against observed state
    pub fn exports(&self, observed: &ObservedState) -> Vec<(&'static str, Option<String>)> {
        self.exports
            .iter()
            .map(|export| {
                let key = ResourceKey::new(export.resource_type, export.resource);
                let value = observed.get(&key).and_then(|r| match export.output {
                    Some(output) => r.record.output_str(output).map(str::to_string),
                    None => Some(r.record.id.clone()),
                });
                (export.name, value)
            })
            .collect()
    }

    /// `[<org>/]gitlab-mirror/<stack>`
    pub fn qualified_name(&self, config: &Config) -> String {
        match &config.org {
            Some(org) => format!("{org}/{PROJECT_NAME}/{}", self.name),
            None => format!("{PROJECT_NAME}/{}", self.name),
        }
    }

    /// Providers for every forge this stack manages resources on
    ///
    /// Fails if a forge's credentials are not configured.
    pub fn providers(&self, config: &Config) -> Result<ProviderSet, ConfigError> {
        let mut providers = ProviderSet::new();
        for forge in self.forges {
            match forge {
                Forge::GitHub => {
                    let (token, owner) = config.require_github()?;
                    let api = config.github_api.as_deref().unwrap_or(GITHUB_API);
                    providers.push(Box::new(GitHubProvider::with_api_base(
                        api,
                        token,
                        owner,
                        config.timeout,
                    )));
                }
                Forge::GitLab => {
                    let token = config.require_gitlab()?;
                    let api = config.gitlab_api.as_deref().unwrap_or(GITLAB_API);
                    providers.push(Box::new(GitLabProvider::with_api_base(
                        api,
                        token,
                        config.timeout,
                    )));
                }
            }
        }
        Ok(providers)
    }
}

/// Every stack, in the order `--stack all` runs them
pub static STACKS: &[Stack] = &[
    Stack {
        name: "dev-desired-state",
        description: "GitHub repository, branch protection, labels and secrets",
        forges: &[Forge::GitHub],
        build: desired_state,
        exports: &[
            Export {
                name: "repository",
                resource_type: REPOSITORY,
                resource: REPOSITORY_NAME,
                output: None,
            },
            Export {
                name: "repositoryUrl",
                resource_type: REPOSITORY,
                resource: REPOSITORY_NAME,
                output: Some("html_url"),
            },
        ],
    },
    Stack {
        name: "dev-desired-state-mirrored",
        description: "GitLab project mirroring the repository",
        forges: &[Forge::GitLab],
        build: desired_state_mirrored,
        exports: &[
            Export {
                name: "projectName",
                resource_type: PROJECT,
                resource: REPOSITORY_NAME,
                output: Some("name"),
            },
            Export {
                name: "projectWebUrl",
                resource_type: PROJECT,
                resource: REPOSITORY_NAME,
                output: Some("web_url"),
            },
        ],
    },
];

pub fn find(name: &str) -> Option<&'static Stack> {
    STACKS.iter().find(|s| s.name == name)
}

// ============================================================================
// dev-desired-state
// ============================================================================

struct Label {
    name: &'static str,
    label: &'static str,
    color: &'static str,
    description: &'static str,
}

const LABELS: &[Label] = &[
    Label {
        name: "github-actions",
        label: "github-actions dependencies",
        color: "E66E01",
        description: "This issue is related to github-actions dependencies",
    },
    Label {
        name: "docker",
        label: "docker dependencies",
        color: "0A4DFE",
        description: "This issue is related to docker dependencies",
    },
    Label {
        name: "go-modules",
        label: "go-modules dependencies",
        color: "9BE688",
        description: "This issue is related to go modules dependencies",
    },
];

// GitHub returns topics sorted, so they are declared sorted.
const REPOSITORY_TOPICS: &[&str] = &[
    "dagger",
    "devcontainer",
    "docker",
    "github",
    "github-template",
    "gitlab",
    "powershell",
    "pulumi",
    "template-repository",
    "vscode",
];

fn desired_state(config: &Config) -> Result<Declaration, DeclarationError> {
    let mut decl = Declaration::new();

    let repo = decl.add_spec(
        ResourceSpec::new(REPOSITORY, REPOSITORY_NAME)
            .property("name", REPOSITORY_NAME)
            .property(
                "description",
                "This is a repository for PowerShell Desired State Configuration files.",
            )
            .property("visibility", "public")
            .property("has_issues", true)
            .property("has_projects", true)
            .property("delete_branch_on_merge", true)
            .property("topics", Value::list(REPOSITORY_TOPICS.iter().copied())),
    )?;

    decl.add_spec(
        ResourceSpec::new(BRANCH_PROTECTION, "main")
            .property("repository", REPOSITORY_NAME)
            .property("pattern", "main")
            .property("required_linear_history", true)
            .depends_on(repo.clone()),
    )?;

    for label in LABELS {
        decl.add_spec(
            ResourceSpec::new(ISSUE_LABEL, label.name)
                .property("repository", REPOSITORY_NAME)
                .property("name", label.label)
                .property("color", label.color.to_uppercase())
                .property("description", label.description)
                .depends_on(repo.clone()),
        )?;
    }

    for (secret_name, value) in secret_values(config) {
        decl.add_spec(
            ResourceSpec::new(ACTIONS_SECRET, secret_name.to_lowercase().replace('_', "-"))
                .property("repository", REPOSITORY_NAME)
                .property("secret_name", secret_name)
                .sensitive("value", value)
                .depends_on(repo.clone()),
        )?;
    }

    Ok(decl)
}

/// Actions secrets and their plaintext values
///
/// A secret with no configured value is still declared, with an empty
/// value, so the workflow sees it defined.
fn secret_values(config: &Config) -> Vec<(&'static str, String)> {
    let values = [
        ("GITLAB_REPOSITORY", Some(config.gitlab_repository.clone())),
        ("GITLAB_TOKEN", config.gitlab_token.clone()),
        ("GITLAB_OWNER", Some(config.gitlab_owner.clone())),
        ("DAGGER_CLOUD_TOKEN", config.dagger_cloud_token.clone()),
    ];
    values
        .into_iter()
        .map(|(name, value)| {
            let value = value.unwrap_or_else(|| {
                log::warn!("no value configured for secret {name}; storing an empty value");
                String::new()
            });
            (name, value)
        })
        .collect()
}

// ============================================================================
// dev-desired-state-mirrored
// ============================================================================

const PROJECT_TOPICS: &[&str] = &[
    "dagger", "github", "gitlab", "go", "golang", "mirror", "pulumi",
];

fn desired_state_mirrored(config: &Config) -> Result<Declaration, DeclarationError> {
    let mut decl = Declaration::new();

    let group = decl.add_lookup(
        GROUP,
        "mirror",
        properties([("full_path", config.gitlab_group.as_str())]),
    )?;

    decl.add_spec(
        ResourceSpec::new(PROJECT, REPOSITORY_NAME)
            .property("name", REPOSITORY_NAME)
            .property(
                "description",
                format!("A GitLab project for mirroring {REPOSITORY_NAME} GitHub repository."),
            )
            .property("namespace", config.gitlab_group.as_str())
            .property("visibility", "private")
            .property("auto_cancel_pending_pipelines", "enabled")
            .property("builds_access_level", "private")
            .property("issues_enabled", true)
            .property("lfs_enabled", true)
            .property("merge_method", "merge")
            .property("merge_requests_enabled", true)
            .property("only_allow_merge_if_pipeline_succeeds", true)
            .property("remove_source_branch_after_merge", true)
            .property("shared_runners_enabled", true)
            .property("topics", Value::list(PROJECT_TOPICS.iter().copied()))
            .depends_on(group),
    )?;

    Ok(decl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;
    use declarative::{ObservedResource, OperationKind, Provider, RemoteRecord, digest, reconcile};
    use std::path::PathBuf;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::resolve(FileConfig::default(), PathBuf::from("/tmp"), move |name| {
            pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    fn stack(name: &str) -> &'static Stack {
        find(name).unwrap()
    }

    #[test]
    fn test_stacks_are_registered_in_order() {
        let names: Vec<_> = STACKS.iter().map(|s| s.name).collect();
        assert_eq!(names, ["dev-desired-state", "dev-desired-state-mirrored"]);
        assert_eq!(
            stack("dev-desired-state").qualified_name(&config(&[])),
            "gitlab-mirror/dev-desired-state"
        );
        let with_org = config(&[("MIRRORSTACK_ORG", "softwaredevelop")]);
        assert_eq!(
            stack("dev-desired-state-mirrored").qualified_name(&with_org),
            "softwaredevelop/gitlab-mirror/dev-desired-state-mirrored"
        );
        assert!(find("prod").is_none());
    }

    #[test]
    fn test_github_stack_declares_everything_after_the_repository() {
        let decl = stack("dev-desired-state")
            .declare(&config(&[("GITLAB_TOKEN", "glpat")]))
            .unwrap();
        assert_eq!(decl.len(), 9);

        let plan = reconcile(&decl, &ObservedState::new()).unwrap();
        assert_eq!(plan.levels().len(), 2);
        let first = &plan.operations()[plan.levels()[0][0]];
        assert_eq!(first.key, ResourceKey::new(REPOSITORY, REPOSITORY_NAME));
        assert_eq!(plan.levels()[1].len(), 8);
        assert!(plan.operations().iter().all(|op| op.kind == OperationKind::Create));
    }

    #[test]
    fn test_secrets_carry_digests_of_configured_values() {
        let decl = stack("dev-desired-state")
            .declare(&config(&[("GITLAB_TOKEN", "glpat"), ("DAGGER_CLOUD_TOKEN", "dag")]))
            .unwrap();

        let token = decl
            .get(&ResourceKey::new(ACTIONS_SECRET, "gitlab-token"))
            .unwrap();
        assert_eq!(token.get_str("secret_name"), Some("GITLAB_TOKEN"));
        assert_eq!(token.get_sensitive("value"), Some("glpat"));
        assert_eq!(
            token.properties["value_digest"],
            Value::from(digest("glpat"))
        );

        let owner = decl
            .get(&ResourceKey::new(ACTIONS_SECRET, "gitlab-owner"))
            .unwrap();
        assert_eq!(owner.get_sensitive("value"), Some("mirror-e"));
    }

    #[test]
    fn test_unset_secret_is_declared_empty() {
        let decl = stack("dev-desired-state").declare(&config(&[])).unwrap();
        let dagger = decl
            .get(&ResourceKey::new(ACTIONS_SECRET, "dagger-cloud-token"))
            .unwrap();
        assert_eq!(dagger.get_sensitive("value"), Some(""));
    }

    #[test]
    fn test_label_colors_are_uppercase_hex() {
        let decl = stack("dev-desired-state").declare(&config(&[])).unwrap();
        let colors: Vec<_> = decl
            .resources()
            .iter()
            .filter(|r| r.resource_type() == ISSUE_LABEL)
            .filter_map(|r| r.get_str("color"))
            .collect();
        assert_eq!(colors, ["E66E01", "0A4DFE", "9BE688"]);
    }

    #[test]
    fn test_mirrored_stack_needs_the_group_lookup() {
        let decl = stack("dev-desired-state-mirrored")
            .declare(&config(&[]))
            .unwrap();
        assert_eq!(decl.lookups().len(), 1);
        assert_eq!(decl.len(), 2);
        assert_eq!(
            decl.lookups()[0].get_str("full_path"),
            Some("mirror-e/github-softwaredevelop")
        );

        // Not refreshed yet: the group is unknown
        assert!(matches!(
            reconcile(&decl, &ObservedState::new()),
            Err(DeclarationError::UnresolvedDependency { .. })
        ));

        let lookup = &decl.lookups()[0];
        let observed: ObservedState = [(
            lookup.key.clone(),
            ObservedResource::looked_up(
                RemoteRecord::new("4242").with_output("group_id", 4242_i64),
                lookup.query.clone(),
            ),
        )]
        .into_iter()
        .collect();
        let plan = reconcile(&decl, &observed).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.operations()[0].kind, OperationKind::Create);
    }

    #[test]
    fn test_providers_require_credentials() {
        let github = stack("dev-desired-state");
        let err = github.providers(&config(&[])).err().unwrap();
        assert!(err.to_string().contains("GITHUB_TOKEN"));

        let providers = github
            .providers(&config(&[("GITHUB_TOKEN", "ghp"), ("GITHUB_OWNER", "octo")]))
            .unwrap();
        assert!(providers.handles(REPOSITORY));
        assert!(!providers.handles(PROJECT));

        let gitlab = stack("dev-desired-state-mirrored");
        assert!(gitlab.providers(&config(&[("GITHUB_TOKEN", "ghp")])).is_err());
        let providers = gitlab.providers(&config(&[("GITLAB_TOKEN", "glpat")])).unwrap();
        assert!(providers.handles(GROUP));
        assert!(providers.handles(PROJECT));
    }

    #[test]
    fn test_exports_read_observed_records() {
        let observed: ObservedState = [(
            ResourceKey::new(REPOSITORY, REPOSITORY_NAME),
            ObservedResource::managed(
                RemoteRecord::new(REPOSITORY_NAME)
                    .with_output("html_url", "https://github.com/octo/desired-state"),
                properties([("name", REPOSITORY_NAME)]),
                Vec::new(),
            ),
        )]
        .into_iter()
        .collect();

        let exports = stack("dev-desired-state").exports(&observed);
        assert_eq!(
            exports,
            vec![
                ("repository", Some("desired-state".to_string())),
                (
                    "repositoryUrl",
                    Some("https://github.com/octo/desired-state".to_string())
                ),
            ]
        );

        let mirrored = stack("dev-desired-state-mirrored").exports(&observed);
        assert!(mirrored.iter().all(|(_, value)| value.is_none()));
    }
}
