//! Run preparation - load a stack's state, refresh it, reconcile

use anyhow::{Context as AnyhowContext, Result};
use declarative::{
    Declaration, DeclarationError, ObservedState, Plan, Provider, RefreshReport, RetryConfig,
    reconcile, refresh,
};

use crate::config::Config;
use crate::progress;
use crate::stacks::Stack;
use crate::state::{StackState, StateStore};

/// What the plan should converge to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// The stack's declaration
    Converge,
    /// Nothing: every managed resource is deleted
    Destroy,
}

/// Everything needed to show or run one stack's plan
pub struct Prepared {
    pub state: StackState,
    pub observed: ObservedState,
    pub refresh: Option<RefreshReport>,
    pub plan: Plan,
}

/// Re-read live state for a stack and resolve its lookups
pub fn refresh_stack(
    stack: &Stack,
    declaration: &Declaration,
    previous: &ObservedState,
    provider: &dyn Provider,
    retry: &RetryConfig,
    show_progress: bool,
) -> Result<RefreshReport> {
    let pb = if show_progress {
        progress::spinner(&format!("Refreshing {}", stack.name))
    } else {
        progress::hidden()
    };

    match refresh(previous, declaration, provider, retry) {
        Ok(report) => {
            pb.finish_and_clear();
            log::info!(
                "refreshed {}: {} resources, {} vanished, {} drifted",
                stack.name,
                report.observed.len(),
                report.vanished.len(),
                report.drifted.len()
            );
            Ok(report)
        }
        Err(e) => {
            if show_progress {
                progress::finish_error(&pb, &format!("Refresh of {} failed", stack.name));
            }
            Err(e).with_context(|| format!("Failed to refresh stack {}", stack.name))
        }
    }
}

/// Load, optionally refresh, and reconcile one stack
///
/// A refresh is written back to the state file before planning, so the
/// recorded state is current even if the plan is never applied.
pub fn prepare(
    stack: &Stack,
    config: &Config,
    store: &StateStore,
    provider: &dyn Provider,
    intent: Intent,
    do_refresh: bool,
    show_progress: bool,
) -> Result<Prepared> {
    let mut state = store.load(stack.name)?;
    let previous = state.observed()?;
    let declaration = stack
        .declare(config)
        .with_context(|| format!("Invalid declaration for stack {}", stack.name))?;

    let (observed, report) = if do_refresh {
        let report = refresh_stack(
            stack,
            &declaration,
            &previous,
            provider,
            &config.retry,
            show_progress,
        )?;
        state.record(&report.observed);
        store.save(&state)?;
        (report.observed.clone(), Some(report))
    } else {
        (previous, None)
    };

    let target = match intent {
        Intent::Converge => declaration,
        Intent::Destroy => Declaration::new(),
    };

    let plan = match reconcile(&target, &observed) {
        Ok(plan) => plan,
        Err(e @ DeclarationError::UnresolvedDependency { .. }) if !do_refresh => {
            return Err(e).context("Lookups are resolved by refresh; run without --skip-refresh");
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Cannot plan stack {}", stack.name));
        }
    };
    log::debug!(
        "{}: {} operations in {} levels",
        stack.name,
        plan.len(),
        plan.levels().len()
    );

    Ok(Prepared {
        state,
        observed,
        refresh: report,
        plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;
    use crate::stacks;
    use declarative::{
        ApiError, Inputs, Lookup, ObservedResource, OperationKind, Properties, RemoteRecord,
        ResourceKey, ResourceSpec,
    };
    use forgekit::gitlab::{GROUP, PROJECT};
    use std::path::Path;
    use tempfile::TempDir;

    /// Knows one GitLab group and nothing else
    struct GroupOnly;

    impl Provider for GroupOnly {
        fn name(&self) -> &str {
            "group-only"
        }

        fn handles(&self, resource_type: &str) -> bool {
            resource_type == GROUP || resource_type == PROJECT
        }

        fn get(&self, resource_type: &str, id: &str) -> Result<Properties, ApiError> {
            Err(ApiError::not_found(resource_type, id))
        }

        fn create(&self, spec: &ResourceSpec, _inputs: &Inputs) -> Result<RemoteRecord, ApiError> {
            Ok(RemoteRecord::new(&spec.key.name))
        }

        fn update(
            &self,
            _spec: &ResourceSpec,
            current: &RemoteRecord,
            _inputs: &Inputs,
        ) -> Result<RemoteRecord, ApiError> {
            Ok(current.clone())
        }

        fn delete(&self, _resource_type: &str, _current: &RemoteRecord) -> Result<(), ApiError> {
            Ok(())
        }

        fn lookup(&self, _lookup: &Lookup) -> Result<RemoteRecord, ApiError> {
            Ok(RemoteRecord::new("4242").with_output("group_id", 4242_i64))
        }
    }

    fn config(state_dir: &Path) -> Config {
        Config::resolve(FileConfig::default(), state_dir.to_path_buf(), |_| None).unwrap()
    }

    fn mirrored() -> &'static Stack {
        stacks::find("dev-desired-state-mirrored").unwrap()
    }

    #[test]
    fn test_refresh_resolves_lookup_and_saves_state() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let store = StateStore::new(dir.path());

        let prepared = prepare(
            mirrored(),
            &config,
            &store,
            &GroupOnly,
            Intent::Converge,
            true,
            false,
        )
        .unwrap();

        assert_eq!(prepared.plan.len(), 1);
        assert_eq!(prepared.plan.operations()[0].kind, OperationKind::Create);
        assert!(prepared.refresh.is_some());

        let saved = store.load(mirrored().name).unwrap();
        assert_eq!(saved.resources.len(), 1);
        assert!(saved.resources[0].lookup);
    }

    #[test]
    fn test_skip_refresh_without_recorded_lookup_explains_itself() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let store = StateStore::new(dir.path());

        let err = prepare(
            mirrored(),
            &config,
            &store,
            &GroupOnly,
            Intent::Converge,
            false,
            false,
        )
        .err()
        .unwrap();
        assert!(format!("{err:#}").contains("--skip-refresh"));
    }

    #[test]
    fn test_destroy_plans_deletes_for_recorded_resources_only() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let store = StateStore::new(dir.path());

        let observed: ObservedState = [
            (
                ResourceKey::new(GROUP, "mirror"),
                ObservedResource::looked_up(RemoteRecord::new("4242"), Properties::new()),
            ),
            (
                ResourceKey::new(PROJECT, stacks::REPOSITORY_NAME),
                ObservedResource::managed(
                    RemoteRecord::new("99"),
                    Properties::new(),
                    vec![ResourceKey::new(GROUP, "mirror")],
                ),
            ),
        ]
        .into_iter()
        .collect();
        let mut state = StackState::new(mirrored().name);
        state.record(&observed);
        store.save(&state).unwrap();

        let prepared = prepare(
            mirrored(),
            &config,
            &store,
            &GroupOnly,
            Intent::Destroy,
            false,
            false,
        )
        .unwrap();
        assert_eq!(prepared.plan.len(), 1);
        let op = &prepared.plan.operations()[0];
        assert_eq!(op.kind, OperationKind::Delete);
        assert_eq!(op.key, ResourceKey::new(PROJECT, stacks::REPOSITORY_NAME));
    }

    #[test]
    fn test_vanished_project_is_planned_again() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let store = StateStore::new(dir.path());

        let observed: ObservedState = [(
            ResourceKey::new(PROJECT, stacks::REPOSITORY_NAME),
            ObservedResource::managed(RemoteRecord::new("99"), Properties::new(), Vec::new()),
        )]
        .into_iter()
        .collect();
        let mut state = StackState::new(mirrored().name);
        state.record(&observed);
        store.save(&state).unwrap();

        let prepared = prepare(
            mirrored(),
            &config,
            &store,
            &GroupOnly,
            Intent::Converge,
            true,
            false,
        )
        .unwrap();
        let report = prepared.refresh.unwrap();
        assert_eq!(
            report.vanished,
            vec![ResourceKey::new(PROJECT, stacks::REPOSITORY_NAME)]
        );
        assert_eq!(prepared.plan.operations()[0].kind, OperationKind::Create);
    }
}
