//! Resource discovery and disambiguation.

use crate::error::Result;
use tidegate_cloud::{
    Clock, CloudError, CloudProvider, ManagedResource, ProvisioningState, ResourceKind,
    RetryPolicy, Scope, with_retry,
};

/// Locate a resource of `kind` within `scope`.
///
/// With an explicit name the resource must exist. Without one, a single
/// candidate in scope is auto-detected; zero candidates is `NotFound` and
/// several are `Ambiguous`. The locator never guesses among candidates.
/// Read-only; transient provider faults are retried within `retry`.
pub async fn locate(
    provider: &dyn CloudProvider,
    clock: &dyn Clock,
    retry: &RetryPolicy,
    scope: &Scope,
    kind: ResourceKind,
    explicit_name: Option<&str>,
) -> Result<ManagedResource> {
    match explicit_name {
        Some(name) => {
            let found = with_retry(retry, clock, || provider.get_resource(scope, kind, name))
                .await?;
            found.map(checked).ok_or_else(|| {
                CloudError::NotFound {
                    kind,
                    name: name.to_string(),
                }
                .into()
            })
        }
        None => {
            let mut candidates =
                with_retry(retry, clock, || provider.find_resources(scope, kind)).await?;
            match candidates.len() {
                0 => Err(CloudError::NotFound {
                    kind,
                    name: format!("<auto-detect in {scope}>"),
                }
                .into()),
                1 => Ok(checked(candidates.remove(0))),
                _ => Err(CloudError::Ambiguous {
                    kind,
                    candidates: candidates.into_iter().map(|r| r.name).collect(),
                }
                .into()),
            }
        }
    }
}

fn checked(resource: ManagedResource) -> ManagedResource {
    if resource.state != ProvisioningState::Succeeded {
        tracing::warn!(
            resource = %resource.name,
            state = ?resource.state,
            "Resource is not in a settled provisioning state"
        );
    }
    resource
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use tidegate_cloud::{ManualClock, MemoryProvider};

    #[tokio::test]
    async fn test_single_candidate_auto_detected() {
        let provider = MemoryProvider::new();
        let clock = ManualClock::new();
        let scope = Scope::new("rg");
        provider.seed_gateway_http(&scope, "edge-gw", 80);

        let found = locate(
            &provider,
            &clock,
            &RetryPolicy::default(),
            &scope,
            ResourceKind::Gateway,
            None,
        )
        .await
        .unwrap();
        assert_eq!(found.name, "edge-gw");
    }

    #[tokio::test]
    async fn test_two_candidates_are_ambiguous() {
        let provider = MemoryProvider::new();
        let clock = ManualClock::new();
        let scope = Scope::new("rg");
        provider.seed_gateway_http(&scope, "gw-a", 80);
        provider.seed_gateway_http(&scope, "gw-b", 80);

        let err = locate(
            &provider,
            &clock,
            &RetryPolicy::default(),
            &scope,
            ResourceKind::Gateway,
            None,
        )
        .await
        .unwrap_err();
        match err {
            EngineError::Cloud(CloudError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, vec!["gw-a".to_string(), "gw-b".to_string()]);
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_name_resolves_among_many() {
        let provider = MemoryProvider::new();
        let clock = ManualClock::new();
        let scope = Scope::new("rg");
        provider.seed_gateway_http(&scope, "gw-a", 80);
        provider.seed_gateway_http(&scope, "gw-b", 80);

        let found = locate(
            &provider,
            &clock,
            &RetryPolicy::default(),
            &scope,
            ResourceKind::Gateway,
            Some("gw-b"),
        )
        .await
        .unwrap();
        assert_eq!(found.name, "gw-b");
    }

    #[tokio::test]
    async fn test_explicit_name_missing_is_not_found() {
        let provider = MemoryProvider::new();
        let clock = ManualClock::new();
        let scope = Scope::new("rg");
        provider.seed_gateway_http(&scope, "gw-a", 80);

        let err = locate(
            &provider,
            &clock,
            &RetryPolicy::default(),
            &scope,
            ResourceKind::Gateway,
            Some("gw-z"),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Cloud(CloudError::NotFound { .. })
        ));
    }
}
