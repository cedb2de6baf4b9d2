//! Configuration: an optional TOML file overlaid by the environment.
//!
//! Tokens and owner names are read once here and handed to the stack
//! builders through [`Config`]. Nothing else reads the environment.

use anyhow::{Context, Result};
use declarative::RetryConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// GitLab group the mirror project is created in.
pub const DEFAULT_GITLAB_GROUP: &str = "mirror-e/github-softwaredevelop";

const DEFAULT_JOBS: usize = 4;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

static OWNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,38})$").expect("static regex")
});

static GROUP_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+(?:/[A-Za-z0-9_.-]+)*$").expect("static regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{variable} is not set (or set it in the config file under {section})")]
    Missing {
        variable: &'static str,
        section: &'static str,
    },

    #[error("invalid GitHub owner '{0}'")]
    InvalidOwner(String),

    #[error("invalid organization '{0}'")]
    InvalidOrg(String),

    #[error("invalid GitLab group path '{0}'")]
    InvalidGroup(String),

    #[error("invalid value '{value}' for {variable}")]
    InvalidNumber { variable: &'static str, value: String },
}

/// Get the config directory path (~/.config/mirrorstack)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("mirrorstack"))
}

/// Get the default state directory path (~/.local/state/mirrorstack)
pub fn default_state_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".local").join("state").join("mirrorstack"))
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// File Format
// ============================================================================

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub github: GitHubSection,
    pub gitlab: GitLabSection,
    pub secrets: SecretsSection,
    pub run: RunSection,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSection {
    pub token: Option<String>,
    pub owner: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitLabSection {
    pub token: Option<String>,
    pub group: Option<String>,
    pub api_base: Option<String>,
}

/// Values stored in the repository's Actions secrets
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsSection {
    pub gitlab_repository: Option<String>,
    pub gitlab_owner: Option<String>,
    pub dagger_cloud_token: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// Prefixes stack names as `<org>/gitlab-mirror/<stack>`
    pub org: Option<String>,
    pub jobs: Option<usize>,
    pub max_attempts: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub state_dir: Option<String>,
}

impl FileConfig {
    /// Read a config file; a missing file yields the empty config
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

// ============================================================================
// Resolved Config
// ============================================================================

/// Fully resolved configuration for one invocation
#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: Option<String>,
    pub github_owner: Option<String>,
    pub github_api: Option<String>,
    pub gitlab_token: Option<String>,
    pub gitlab_group: String,
    pub gitlab_api: Option<String>,
    pub gitlab_repository: String,
    pub gitlab_owner: String,
    pub dagger_cloud_token: Option<String>,
    pub jobs: usize,
    pub retry: RetryConfig,
    pub timeout: Duration,
    pub state_dir: PathBuf,
    pub org: Option<String>,
}

impl Config {
    /// Load the config file (default location unless `path` is given) and
    /// overlay the process environment
    pub fn load(path: Option<&Path>, state_dir: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_dir()?.join("config.toml"),
        };
        let file = FileConfig::load(&path)?;
        let state_dir = match state_dir {
            Some(dir) => dir,
            None => match &file.run.state_dir {
                Some(dir) => expand_path(dir),
                None => default_state_dir()?,
            },
        };
        Ok(Self::resolve(file, state_dir, |name| std::env::var(name).ok())?)
    }

    /// Merge file values with variables from `env`; the environment wins
    pub fn resolve(
        file: FileConfig,
        state_dir: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let pick = |name: &str, fallback: Option<String>| {
            env(name).filter(|v| !v.is_empty()).or(fallback)
        };

        let github_owner = pick("GITHUB_OWNER", file.github.owner);
        if let Some(owner) = &github_owner
            && !OWNER_RE.is_match(owner)
        {
            return Err(ConfigError::InvalidOwner(owner.clone()));
        }

        let org = pick("MIRRORSTACK_ORG", file.run.org);
        if let Some(org) = &org
            && !OWNER_RE.is_match(org)
        {
            return Err(ConfigError::InvalidOrg(org.clone()));
        }

        let gitlab_group = pick("MIRRORSTACK_GITLAB_GROUP", file.gitlab.group)
            .unwrap_or_else(|| DEFAULT_GITLAB_GROUP.to_string());
        if !GROUP_PATH_RE.is_match(&gitlab_group) {
            return Err(ConfigError::InvalidGroup(gitlab_group));
        }

        let gitlab_repository = pick("GITLAB_REPOSITORY", file.secrets.gitlab_repository)
            .unwrap_or_else(|| format!("{gitlab_group}/{}", crate::stacks::REPOSITORY_NAME));
        let gitlab_owner = pick("GITLAB_OWNER", file.secrets.gitlab_owner).unwrap_or_else(|| {
            gitlab_group
                .split('/')
                .next()
                .unwrap_or(&gitlab_group)
                .to_string()
        });

        let jobs = match env("MIRRORSTACK_JOBS") {
            Some(v) => parse_number("MIRRORSTACK_JOBS", &v)?,
            None => file.run.jobs.unwrap_or(DEFAULT_JOBS),
        };
        let max_attempts = match env("MIRRORSTACK_MAX_ATTEMPTS") {
            Some(v) => parse_number("MIRRORSTACK_MAX_ATTEMPTS", &v)?,
            None => file
                .run
                .max_attempts
                .unwrap_or(RetryConfig::default().max_attempts),
        };
        let timeout_secs = match env("MIRRORSTACK_TIMEOUT_SECS") {
            Some(v) => parse_number("MIRRORSTACK_TIMEOUT_SECS", &v)?,
            None => file.run.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            github_token: pick("GITHUB_TOKEN", file.github.token),
            github_owner,
            github_api: pick("MIRRORSTACK_GITHUB_API", file.github.api_base),
            gitlab_token: pick("GITLAB_TOKEN", file.gitlab.token),
            gitlab_group,
            gitlab_api: pick("MIRRORSTACK_GITLAB_API", file.gitlab.api_base),
            gitlab_repository,
            gitlab_owner,
            dagger_cloud_token: pick("DAGGER_CLOUD_TOKEN", file.secrets.dagger_cloud_token),
            jobs: jobs.max(1),
            retry: RetryConfig {
                max_attempts: max_attempts.max(1),
                ..RetryConfig::default()
            },
            timeout: Duration::from_secs(timeout_secs),
            state_dir,
            org,
        })
    }

    pub fn require_github(&self) -> Result<(&str, &str), ConfigError> {
        let token = self.github_token.as_deref().ok_or(ConfigError::Missing {
            variable: "GITHUB_TOKEN",
            section: "[github] token",
        })?;
        let owner = self.github_owner.as_deref().ok_or(ConfigError::Missing {
            variable: "GITHUB_OWNER",
            section: "[github] owner",
        })?;
        Ok((token, owner))
    }

    pub fn require_gitlab(&self) -> Result<&str, ConfigError> {
        self.gitlab_token.as_deref().ok_or(ConfigError::Missing {
            variable: "GITLAB_TOKEN",
            section: "[gitlab] token",
        })
    }
}

fn parse_number<T: std::str::FromStr>(variable: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        variable,
        value: value.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
