//! # Declarative
//!
//! A desired-state reconciliation engine.
//!
//! Declare a graph of remote resources, diff it against what the providers
//! currently hold, and apply the minimal set of creates, updates and
//! deletes in dependency order.
//!
//! ## Core Concepts
//!
//! - **Declaration**: the desired resource graph; edges mean "must exist before"
//! - **ObservedState**: the last known remote reality, rebuilt by [`refresh`]
//! - **Plan**: operations grouped into topological levels, from [`reconcile`]
//! - **Executor**: applies a plan level by level against a [`Provider`]
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     Declaration, ExecuteOptions, ObservedState, execute_simple, properties, reconcile,
//! };
//!
//! let mut decl = Declaration::new();
//! let repo = decl.add_resource(
//!     "github_repository",
//!     "desired-state",
//!     properties([("visibility", "public")]),
//!     &[],
//! )?;
//! decl.add_resource(
//!     "github_issue_label",
//!     "docker",
//!     properties([("color", "E66E01")]),
//!     &[repo.key().clone()],
//! )?;
//!
//! let observed = ObservedState::new();
//! let plan = reconcile(&decl, &observed)?;
//! let report = execute_simple(&plan, &observed, &provider, &ExecuteOptions::default())?;
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Provider`]: talks to one remote API
//! - [`EventSink`]: receives per-operation status events
//! - [`ConfirmCallback`]: handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific HTTP clients, UI frameworks or output formats.

pub mod context;
pub mod declaration;
pub mod diff;
pub mod error;
pub mod event;
pub mod executor;
pub mod observed;
pub mod planner;
pub mod refresh;
pub mod resource;
pub mod retry;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, Inputs, Provider, ProviderSet};
pub use declaration::Declaration;
pub use diff::{DiffSummary, PropertyChange, group_by_type};
pub use error::{ApiError, DeclarationError, ErrorCategory, RefreshError};
pub use event::{CollectingSink, EventSink, NullSink, OperationEvent};
pub use executor::{OperationOutcome, RunReport, execute, execute_simple};
pub use observed::{ObservedResource, ObservedState};
pub use planner::{Operation, Plan, reconcile};
pub use refresh::{RefreshReport, refresh};
pub use resource::{Lookup, RemoteRecord, ResourceRef, ResourceSpec, digest};
pub use retry::{RetryCallback, RetryConfig, with_retry};
pub use types::{
    CancelToken, ExecuteOptions, ExecuteSummary, OperationKind, OperationStatus, Properties,
    ResourceKey, Value, properties,
};
