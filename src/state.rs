//! Per-stack state files.
//!
//! Each stack records what the last run left behind in
//! `<state dir>/<stack>.toml`: the remote record, the last applied
//! properties and the dependencies of every resource, plus resolved lookups.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{ObservedResource, ObservedState, Properties, RemoteRecord, ResourceKey};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// Everything recorded for one stack
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StackState {
    pub stack: String,

    /// Last time the state was written
    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

/// One recorded resource
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,

    /// Resolved by a lookup; never deleted
    #[serde(default)]
    pub lookup: bool,

    #[serde(default)]
    pub depends_on: Vec<String>,

    pub record: RemoteRecord,

    #[serde(default)]
    pub properties: Properties,
}

impl StackState {
    pub fn new(stack: &str) -> Self {
        Self {
            stack: stack.to_string(),
            last_updated: Utc::now(),
            resources: Vec::new(),
        }
    }

    /// Rebuild the engine's view of this state
    pub fn observed(&self) -> Result<ObservedState> {
        self.resources
            .iter()
            .map(|entry| {
                let depends_on = entry
                    .depends_on
                    .iter()
                    .map(|dep| {
                        ResourceKey::parse(dep).with_context(|| {
                            format!("Invalid dependency '{dep}' recorded for {}", entry.name)
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let resource = ObservedResource {
                    record: entry.record.clone(),
                    properties: entry.properties.clone(),
                    depends_on,
                    lookup: entry.lookup,
                };
                Ok((
                    ResourceKey::new(&entry.resource_type, &entry.name),
                    resource,
                ))
            })
            .collect()
    }

    /// Replace the recorded resources and bump `last_updated`
    pub fn record(&mut self, observed: &ObservedState) {
        self.resources = observed
            .iter()
            .map(|(key, resource)| ResourceEntry {
                resource_type: key.resource_type.clone(),
                name: key.name.clone(),
                lookup: resource.lookup,
                depends_on: resource.depends_on.iter().map(ToString::to_string).collect(),
                record: resource.record.clone(),
                properties: resource.properties.clone(),
            })
            .collect();
        self.last_updated = Utc::now();
    }

    pub fn managed_count(&self) -> usize {
        self.resources.iter().filter(|r| !r.lookup).count()
    }
}

// ============================================================================
// Store
// ============================================================================

/// Directory holding one state file per stack
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stack: &str) -> PathBuf {
        self.dir.join(format!("{stack}.toml"))
    }

    /// Load a stack's state, or a fresh one if it has never been saved
    pub fn load(&self, stack: &str) -> Result<StackState> {
        let path = self.path_for(stack);

        if !path.exists() {
            log::debug!("State file for {stack} does not exist, starting empty");
            return Ok(StackState::new(stack));
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: StackState = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Write a stack's state, replacing the file in one rename
    pub fn save(&self, state: &StackState) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create state directory: {}", self.dir.display())
        })?;

        let path = self.path_for(&state.stack);
        let tmp = path.with_extension("toml.tmp");
        let content = toml::to_string_pretty(state).context("Failed to serialize state to TOML")?;

        fs::write(&tmp, &content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
