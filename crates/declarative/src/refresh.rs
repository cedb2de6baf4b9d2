//! Refresh - re-read live state for everything a previous run recorded
//!
//! Managed resources are read back through [`Provider::get`]. Objects that
//! no longer exist are dropped so the next plan recreates them. Declared
//! lookups are resolved fresh on every refresh.

use crate::context::Provider;
use crate::declaration::Declaration;
use crate::error::{ApiError, RefreshError};
use crate::observed::{ObservedResource, ObservedState};
use crate::retry::{LogCallback, RetryCallback, RetryConfig, with_retry};
use crate::types::ResourceKey;

/// Result of a refresh
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub observed: ObservedState,
    /// Recorded resources the provider no longer has
    pub vanished: Vec<ResourceKey>,
    /// Recorded resources whose live properties differ from the last apply
    pub drifted: Vec<ResourceKey>,
}

/// Rebuild observed state from the providers
///
/// Each refreshed entry keeps its last-applied properties, overlaid with the
/// values the provider reports for those same properties. Properties the
/// provider cannot read back (secret digests, write-only flags) keep their
/// recorded value. Resource types no configured provider handles are kept
/// as recorded.
pub fn refresh(
    previous: &ObservedState,
    declaration: &Declaration,
    provider: &dyn Provider,
    retry: &RetryConfig,
) -> Result<RefreshReport, RefreshError> {
    let callback: Option<&dyn RetryCallback> = Some(&LogCallback);
    let mut report = RefreshReport::default();

    for (key, recorded) in previous.iter().filter(|(_, r)| !r.lookup) {
        let live = with_retry(retry, callback, || {
            provider.get(&key.resource_type, &recorded.record.id)
        })
        .result;

        match live {
            Ok(live) => {
                let mut current = recorded.clone();
                for (name, value) in &mut current.properties {
                    if let Some(reported) = live.get(name) {
                        value.clone_from(reported);
                    }
                }
                if current.properties != recorded.properties {
                    log::info!("{key} drifted since last apply");
                    report.drifted.push(key.clone());
                }
                report.observed.insert(key.clone(), current);
            }
            Err(ApiError::NotFound { .. }) => {
                log::info!("{key} no longer exists remotely");
                report.vanished.push(key.clone());
            }
            Err(ApiError::Unsupported(reason)) => {
                log::warn!("not refreshing {key}: {reason}");
                report.observed.insert(key.clone(), recorded.clone());
            }
            Err(source) => {
                return Err(RefreshError {
                    key: key.clone(),
                    source,
                });
            }
        }
    }

    for lookup in declaration.lookups() {
        let record = with_retry(retry, callback, || provider.lookup(lookup))
            .result
            .map_err(|source| RefreshError {
                key: lookup.key.clone(),
                source,
            })?;
        log::debug!("resolved {} to {}", lookup.key, record.id);
        report.observed.insert(
            lookup.key.clone(),
            ObservedResource::looked_up(record, lookup.query.clone()),
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::reconcile;
    use crate::resource::RemoteRecord;
    use crate::testing::MockProvider;
    use crate::types::{Properties, Value, properties};

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new("test", name)
    }

    fn recorded(name: &str, props: Properties) -> ObservedResource {
        ObservedResource::managed(RemoteRecord::new(name), props, Vec::new())
    }

    #[test]
    fn test_vanished_resources_are_dropped() {
        let mut previous = ObservedState::new();
        previous.insert(key("kept"), recorded("kept", Properties::new()));
        previous.insert(key("gone"), recorded("gone", Properties::new()));
        let provider = MockProvider::new().with_remote("kept", Properties::new());

        let report = refresh(
            &previous,
            &Declaration::new(),
            &provider,
            &RetryConfig::no_retry(),
        )
        .unwrap();
        assert_eq!(report.vanished, vec![key("gone")]);
        assert!(report.observed.contains(&key("kept")));
        assert!(!report.observed.contains(&key("gone")));
    }

    #[test]
    fn test_live_values_overlay_recorded_properties() {
        let mut previous = ObservedState::new();
        previous.insert(
            key("a"),
            recorded(
                "a",
                properties([
                    ("description", Value::from("declared")),
                    ("value_digest", Value::from("abc")),
                ]),
            ),
        );
        let provider = MockProvider::new().with_remote(
            "a",
            properties([("description", "edited by hand"), ("extra", "ignored")]),
        );

        let report = refresh(
            &previous,
            &Declaration::new(),
            &provider,
            &RetryConfig::no_retry(),
        )
        .unwrap();
        let current = report.observed.get(&key("a")).unwrap();
        assert_eq!(
            current.properties["description"],
            Value::from("edited by hand")
        );
        assert_eq!(current.properties["value_digest"], Value::from("abc"));
        assert!(!current.properties.contains_key("extra"));
        assert_eq!(report.drifted, vec![key("a")]);

        // Drift shows up as an update against the original declaration
        let mut decl = Declaration::new();
        decl.add_resource("test", "a", properties([("description", "declared")]), &[])
            .unwrap();
        let plan = reconcile(&decl, &report.observed).unwrap();
        assert_eq!(plan.summary().updates, 1);
    }

    #[test]
    fn test_lookups_resolved_and_failures_fatal() {
        let mut decl = Declaration::new();
        decl.add_lookup(
            "group",
            "mirror",
            properties([("full_path", "dagger-mirror")]),
        )
        .unwrap();

        let provider = MockProvider::new().with_group("dagger-mirror", "4242");
        let report = refresh(
            &ObservedState::new(),
            &decl,
            &provider,
            &RetryConfig::no_retry(),
        )
        .unwrap();
        let group = report
            .observed
            .get(&ResourceKey::new("group", "mirror"))
            .unwrap();
        assert!(group.lookup);
        assert_eq!(group.record.id, "4242");

        let empty = MockProvider::new();
        let err = refresh(
            &ObservedState::new(),
            &decl,
            &empty,
            &RetryConfig::no_retry(),
        )
        .unwrap_err();
        assert_eq!(err.key, ResourceKey::new("group", "mirror"));
        assert!(err.source.is_not_found());
    }

    #[test]
    fn test_unhandled_types_kept_as_recorded() {
        let mut previous = ObservedState::new();
        let other = ResourceKey::new("gitlab_project", "p");
        previous.insert(other.clone(), recorded("p", Properties::new()));
        let report = refresh(
            &previous,
            &Declaration::new(),
            &crate::context::ProviderSet::new().with(MockProvider::new()),
            &RetryConfig::no_retry(),
        )
        .unwrap();
        assert!(report.observed.contains(&other));
        assert!(report.vanished.is_empty());
    }
}
