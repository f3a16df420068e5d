//! End-to-end convergence behaviour against the in-memory provider.

use std::sync::Arc;
use std::time::Duration;

use tidegate_cloud::{
    CloudError, CloudProvider, ManualClock, MemoryProvider, Protocol, ResourceKind, RoleKind,
    Scope,
};
use tidegate_core::{
    ConvergeConfig, EngineError, Orchestrator, Outcome, Phase, StaticPrompt,
    ensure_identity_and_access,
};

fn test_config(scope: &Scope) -> ConvergeConfig {
    ConvergeConfig::new(scope.clone(), "shop.example.com")
}

fn orchestrator(provider: &Arc<MemoryProvider>, clock: &Arc<ManualClock>) -> Orchestrator {
    Orchestrator::new(
        provider.clone(),
        clock.clone(),
        Arc::new(StaticPrompt(false)),
    )
}

#[tokio::test]
async fn converges_bootstrap_scope_end_to_end() {
    let provider = Arc::new(MemoryProvider::new());
    let clock = Arc::new(ManualClock::new());
    let scope = Scope::new("sparrow-rg");
    let gateway = provider.seed_gateway_http(&scope, "edge-gw", 80);

    let summary = orchestrator(&provider, &clock)
        .run(&test_config(&scope))
        .await
        .unwrap();

    assert!(summary.changed);
    assert_eq!(summary.gateway, "edge-gw");
    assert_eq!(summary.secret_store, "sparrow-rg-vault");
    assert_eq!(summary.secret_ref, "sparrow-rg-vault/gateway-tls");

    // Exactly one secret store, one certificate version, one binding.
    let stores = provider
        .find_resources(&scope, ResourceKind::SecretStore)
        .await
        .unwrap();
    assert_eq!(stores.len(), 1);
    assert_eq!(provider.secret_version_count(&stores[0], "gateway-tls"), 1);
    assert_eq!(provider.role_binding_count(), 1);

    // One HTTPS listener on 443, bound to the versionless reference, with
    // the routing rule repointed at it and the backend aligned.
    let state = provider.gateway_state(&gateway);
    let listener = state.listener_on_port(443).expect("https listener");
    assert_eq!(listener.protocol, Protocol::Https);
    assert_eq!(
        listener.certificate.as_ref().unwrap().to_string(),
        "sparrow-rg-vault/gateway-tls"
    );
    assert_eq!(listener.host_name.as_deref(), Some("shop.example.com"));
    assert!(state.rule_for_listener(&listener.name).is_some());
    assert_eq!(state.backend.protocol, Protocol::Https);
    assert_eq!(state.backend.host_header.as_deref(), Some("shop.example.com"));

    // Exactly one propagation wait, for the new role binding.
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(60)]);
}

#[tokio::test]
async fn second_run_is_a_pure_read() {
    let provider = Arc::new(MemoryProvider::new());
    let clock = Arc::new(ManualClock::new());
    let scope = Scope::new("sparrow-rg");
    provider.seed_gateway_http(&scope, "edge-gw", 80);

    let engine = orchestrator(&provider, &clock);
    let config = test_config(&scope);

    let first = engine.run(&config).await.unwrap();
    assert!(first.changed);
    let mutations_after_first = provider.mutation_count();
    let waits_after_first = clock.sleeps().len();

    let second = engine.run(&config).await.unwrap();
    let third = engine.run(&config).await.unwrap();

    assert!(!second.changed);
    assert_eq!(second, third);
    assert!(second.reports.iter().all(|r| r.outcome == Outcome::Unchanged));
    // Zero mutating provider calls and zero waits once converged.
    assert_eq!(provider.mutation_count(), mutations_after_first);
    assert_eq!(clock.sleeps().len(), waits_after_first);
}

#[tokio::test]
async fn two_gateways_require_an_explicit_name() {
    let provider = Arc::new(MemoryProvider::new());
    let clock = Arc::new(ManualClock::new());
    let scope = Scope::new("sparrow-rg");
    provider.seed_gateway_http(&scope, "gw-a", 80);
    provider.seed_gateway_http(&scope, "gw-b", 80);

    let engine = orchestrator(&provider, &clock);
    let config = test_config(&scope);

    let err = engine.run(&config).await.unwrap_err();
    assert_eq!(err.phase, Phase::LocateGateway);
    assert_eq!(err.last_completed, Some(Phase::Validate));
    match err.source {
        EngineError::Cloud(CloudError::Ambiguous { candidates, .. }) => {
            assert_eq!(candidates, vec!["gw-a".to_string(), "gw-b".to_string()]);
        }
        other => panic!("expected Ambiguous, got {other:?}"),
    }

    let mut named = test_config(&scope);
    named.gateway_name = Some("gw-b".to_string());
    let summary = engine.run(&named).await.unwrap();
    assert_eq!(summary.gateway, "gw-b");
}

#[tokio::test]
async fn rotation_preserves_the_reference_and_the_listener() {
    let provider = Arc::new(MemoryProvider::new());
    let clock = Arc::new(ManualClock::new());
    let scope = Scope::new("sparrow-rg");
    let gateway = provider.seed_gateway_http(&scope, "edge-gw", 80);

    let engine = orchestrator(&provider, &clock);
    let config = test_config(&scope);
    let first = engine.run(&config).await.unwrap();

    let store = provider
        .get_resource(&scope, ResourceKind::SecretStore, "sparrow-rg-vault")
        .await
        .unwrap()
        .unwrap();
    let v1 = provider.get_latest_secret(&store, "gateway-tls").await.unwrap().unwrap();
    let v1_bundle = tidegate_core::CertificateBundle::from_payload(&v1.payload).unwrap();
    let gateway_before = provider.gateway_state(&gateway);
    let bindings_before = provider.role_binding_count();

    // Later wall-clock, forced rotation.
    clock.advance(Duration::from_secs(24 * 60 * 60));
    let mut forced = test_config(&scope);
    forced.force_rotate = true;
    let second = engine.run(&forced).await.unwrap();

    // The reference string is unchanged while the material rotated.
    assert_eq!(second.secret_ref, first.secret_ref);
    assert_eq!(provider.secret_version_count(&store, "gateway-tls"), 2);
    let v2 = provider.get_latest_secret(&store, "gateway-tls").await.unwrap().unwrap();
    let v2_bundle = tidegate_core::CertificateBundle::from_payload(&v2.payload).unwrap();
    assert!(v2_bundle.expires_at > v1_bundle.expires_at);

    // Same listener object, no new binding: rotation touched nothing else.
    assert_eq!(provider.gateway_state(&gateway), gateway_before);
    assert_eq!(provider.role_binding_count(), bindings_before);
    assert_eq!(
        second.report(Phase::Certificate).unwrap().outcome,
        Outcome::Rotated
    );
    assert_eq!(
        second.report(Phase::Listener).unwrap().outcome,
        Outcome::Unchanged
    );
}

#[tokio::test]
async fn repeated_access_grants_never_duplicate_or_rewait() {
    let provider = Arc::new(MemoryProvider::new());
    let clock = ManualClock::new();
    let scope = Scope::new("sparrow-rg");
    let gateway = provider.seed_gateway_http(&scope, "edge-gw", 80);
    let store = provider.seed_secret_store(&scope, "sparrow-rg-vault");

    let delay = Duration::from_secs(60);
    let first = ensure_identity_and_access(provider.as_ref(), &clock, &gateway, &store, delay)
        .await
        .unwrap();
    assert!(first.granted);
    assert_eq!(clock.sleeps().len(), 1);
    assert_eq!(provider.role_binding_count(), 1);

    let second = ensure_identity_and_access(provider.as_ref(), &clock, &gateway, &store, delay)
        .await
        .unwrap();
    assert!(!second.granted);
    assert_eq!(second.principal, first.principal);
    // No second propagation wait once the binding exists.
    assert_eq!(clock.sleeps().len(), 1);
    assert_eq!(provider.role_binding_count(), 1);
}

#[tokio::test]
async fn grant_conflict_from_stale_reads_is_success_without_wait() {
    let provider = Arc::new(MemoryProvider::new());
    let clock = ManualClock::new();
    let scope = Scope::new("sparrow-rg");
    let gateway = provider.seed_gateway_http(&scope, "edge-gw", 80);
    let store = provider.seed_secret_store(&scope, "sparrow-rg-vault");

    let principal = provider.enable_identity(&gateway).await.unwrap();
    provider.seed_role_binding(&principal, RoleKind::SecretsReader, &store);
    // Listing lags creation: find sees nothing, grant conflicts.
    provider.set_stale_binding_reads(true);

    let outcome = ensure_identity_and_access(
        provider.as_ref(),
        &clock,
        &gateway,
        &store,
        Duration::from_secs(60),
    )
    .await
    .unwrap();

    assert!(!outcome.granted);
    assert!(clock.sleeps().is_empty());
    assert_eq!(provider.role_binding_count(), 1);
}

#[tokio::test]
async fn plaintext_listener_on_target_port_is_removed_first() {
    let provider = Arc::new(MemoryProvider::new());
    let clock = Arc::new(ManualClock::new());
    let scope = Scope::new("sparrow-rg");
    // A misconfigured plaintext listener already occupies 443.
    let gateway = provider.seed_gateway_http(&scope, "edge-gw", 443);

    let summary = orchestrator(&provider, &clock)
        .run(&test_config(&scope))
        .await
        .unwrap();

    // The in-memory provider rejects a second listener on a bound port, so
    // a completed run proves the conflicting listener was removed before
    // the HTTPS one was created.
    let state = provider.gateway_state(&gateway);
    assert_eq!(state.listeners.len(), 1);
    let listener = state.listener_on_port(443).unwrap();
    assert_eq!(listener.protocol, Protocol::Https);
    assert!(state.listeners.iter().all(|l| l.name != "http-443"));

    // The displaced listener's routing rule was repointed, not duplicated.
    let rule = state.rule_for_listener(&listener.name).unwrap();
    assert_eq!(rule.name, "default-rule");
    assert_eq!(summary.report(Phase::Listener).unwrap().outcome, Outcome::Created);
}

#[tokio::test]
async fn missing_gateway_reports_the_failing_phase() {
    let provider = Arc::new(MemoryProvider::new());
    let clock = Arc::new(ManualClock::new());
    let scope = Scope::new("empty-rg");

    let err = orchestrator(&provider, &clock)
        .run(&test_config(&scope))
        .await
        .unwrap_err();

    assert_eq!(err.phase, Phase::LocateGateway);
    assert_eq!(err.last_completed, Some(Phase::Validate));
    assert!(matches!(
        err.source,
        EngineError::Cloud(CloudError::NotFound { .. })
    ));
    // Nothing was created in the scope.
    assert_eq!(provider.mutation_count(), 0);
}

#[tokio::test]
async fn near_expiry_renewal_follows_the_prompt() {
    let provider = Arc::new(MemoryProvider::new());
    let clock = Arc::new(ManualClock::new());
    let scope = Scope::new("sparrow-rg");
    provider.seed_gateway_http(&scope, "edge-gw", 80);

    let config = test_config(&scope);
    let declining = orchestrator(&provider, &clock);
    declining.run(&config).await.unwrap();

    let store = provider
        .get_resource(&scope, ResourceKind::SecretStore, "sparrow-rg-vault")
        .await
        .unwrap()
        .unwrap();

    // 350 days later the certificate has ~15 days left, inside the default
    // 30-day renewal window.
    clock.advance(Duration::from_secs(350 * 24 * 60 * 60));

    let summary = declining.run(&config).await.unwrap();
    assert_eq!(
        summary.report(Phase::Certificate).unwrap().outcome,
        Outcome::Unchanged
    );
    assert_eq!(provider.secret_version_count(&store, "gateway-tls"), 1);

    let approving = Orchestrator::new(
        provider.clone(),
        clock.clone(),
        Arc::new(StaticPrompt(true)),
    );
    let summary = approving.run(&config).await.unwrap();
    assert_eq!(
        summary.report(Phase::Certificate).unwrap().outcome,
        Outcome::Rotated
    );
    assert_eq!(provider.secret_version_count(&store, "gateway-tls"), 2);
}
