//! Command implementations
//!
//! - `refresh` - Re-read live state into the state file
//! - `preview` - Show the plan `up` would run
//! - `up` / `destroy` - Execute a plan and persist the result
//! - `state` - Inspect state files

pub mod destroy;
pub mod preview;
pub mod refresh;
pub mod state;
pub mod up;

use anyhow::{Result, bail};

use crate::Context;
use crate::cli::StackSelector;
use crate::config::Config;
use crate::stacks::{self, STACKS, Stack};
use crate::state::StateStore;

/// Configuration and state store shared by every command
pub struct Session {
    pub config: Config,
    pub store: StateStore,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        let config = Config::load(ctx.config.as_deref(), ctx.state_dir.clone())?;
        let store = StateStore::new(config.state_dir.clone());
        log::debug!("state directory: {}", store.dir().display());
        Ok(Self { config, store })
    }
}

/// Stacks named by a `--stack` selector, in run order
pub fn select(selector: StackSelector) -> Result<Vec<&'static Stack>> {
    match selector.name() {
        None => Ok(STACKS.iter().collect()),
        Some(name) => match stacks::find(name) {
            Some(stack) => Ok(vec![stack]),
            None => bail!("Unknown stack: {name}"),
        },
    }
}
