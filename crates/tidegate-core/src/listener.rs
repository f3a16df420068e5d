//! Gateway listener reconciliation.
//!
//! Drives the gateway from its observed listener configuration to the
//! desired HTTPS configuration. Re-running against a converged gateway is
//! a pure read; a conflicting plaintext listener on the target port is
//! removed first, and the routing rule is repointed last so traffic only
//! shifts once the listener is fully formed.

use crate::error::{EngineError, Result};
use tidegate_cloud::{
    BackendSettings, CloudProvider, FrontendPort, GatewayState, ListenerConfig, ManagedResource,
    Protocol, RoutingRule, SecretReference,
};
use tracing::{debug, info};

const HTTPS_RULE_NAME: &str = "https-rule";

fn listener_name(port: u16) -> String {
    format!("https-{port}")
}

/// How `ensure_https_listener` converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// Listener, backend and routing already matched; nothing was written.
    Unchanged,
    /// An HTTPS listener existed but was re-bound in place.
    Updated,
    Created,
}

/// Ensure `gateway` serves HTTPS on `frontend_port` with the certificate at
/// `secret_ref`, always versionless (a pinned version would defeat
/// zero-downtime rotation), and `host_header` as the externally used domain.
pub async fn ensure_https_listener(
    provider: &dyn CloudProvider,
    gateway: &ManagedResource,
    frontend_port: u16,
    secret_ref: &SecretReference,
    host_header: &str,
) -> Result<(ListenerConfig, ListenerOutcome)> {
    let state = provider.describe_gateway(gateway).await?;

    let desired = ListenerConfig {
        name: listener_name(frontend_port),
        frontend_port,
        protocol: Protocol::Https,
        certificate: Some(secret_ref.clone()),
        host_name: Some(host_header.to_string()),
    };

    let conflicting = match state.listener_on_port(frontend_port) {
        Some(existing) if existing.is_https() => {
            return reconcile_https(
                provider,
                gateway,
                &state,
                existing.clone(),
                secret_ref,
                host_header,
            )
            .await;
        }
        Some(existing) => Some(existing.clone()),
        None => None,
    };

    // Ports are exclusive: the stale plaintext binding blocks the HTTPS
    // one, so remove the listener and then its freed port binding.
    let displaced_rule = conflicting
        .as_ref()
        .and_then(|old| state.rule_for_listener(&old.name))
        .cloned();
    if let Some(old) = &conflicting {
        provider.delete_listener(gateway, &old.name).await?;
        if let Some(port) = state.frontend_port(old.frontend_port) {
            provider.delete_frontend_port(gateway, &port.name).await?;
        }
        info!(
            listener = %old.name,
            port = old.frontend_port,
            "Removed conflicting plaintext listener"
        );
    }

    // From here until the listener exists the gateway has nothing bound to
    // the target port; failures in this window are surfaced as a degraded
    // state rather than silently retried.
    let freed_port = conflicting.is_some();
    let degraded = |source| {
        if freed_port {
            EngineError::DegradedListener {
                port: frontend_port,
                source,
            }
        } else {
            EngineError::Cloud(source)
        }
    };

    if freed_port || state.frontend_port(frontend_port).is_none() {
        let port = FrontendPort::for_port(frontend_port);
        provider
            .create_frontend_port(gateway, &port)
            .await
            .map_err(degraded)?;
    }
    provider
        .create_listener(gateway, &desired)
        .await
        .map_err(degraded)?;

    align_backend(provider, gateway, &state.backend, host_header).await?;

    // Repoint routing last: the rule the removed listener held if there
    // was one, the engine's own rule otherwise.
    let rule = match displaced_rule {
        Some(mut rule) => {
            rule.listener = desired.name.clone();
            rule
        }
        None => state
            .routing_rules
            .iter()
            .find(|r| r.name == HTTPS_RULE_NAME)
            .cloned()
            .map(|mut rule| {
                rule.listener = desired.name.clone();
                rule
            })
            .unwrap_or_else(|| RoutingRule {
                name: HTTPS_RULE_NAME.to_string(),
                listener: desired.name.clone(),
                backend: state.backend.name.clone(),
            }),
    };
    provider.upsert_routing_rule(gateway, &rule).await?;

    info!(
        listener = %desired.name,
        port = frontend_port,
        rule = %rule.name,
        "Created HTTPS listener"
    );
    Ok((desired, ListenerOutcome::Created))
}

/// An HTTPS listener already occupies the target port: fix certificate,
/// host, backend and routing in place, without any port juggling.
async fn reconcile_https(
    provider: &dyn CloudProvider,
    gateway: &ManagedResource,
    state: &GatewayState,
    existing: ListenerConfig,
    secret_ref: &SecretReference,
    host_header: &str,
) -> Result<(ListenerConfig, ListenerOutcome)> {
    let cert_ok = existing.certificate.as_ref() == Some(secret_ref);
    let host_ok = existing.host_name.as_deref() == Some(host_header);
    let backend_ok = state.backend.protocol == Protocol::Https
        && state.backend.host_header.as_deref() == Some(host_header);
    let rule_ok = state.rule_for_listener(&existing.name).is_some();

    if cert_ok && host_ok && backend_ok && rule_ok {
        debug!(listener = %existing.name, "HTTPS listener already in desired state");
        return Ok((existing, ListenerOutcome::Unchanged));
    }

    let mut updated = existing;
    if !cert_ok || !host_ok {
        updated.certificate = Some(secret_ref.clone());
        updated.host_name = Some(host_header.to_string());
        provider.update_listener(gateway, &updated).await?;
        info!(listener = %updated.name, "Re-bound HTTPS listener");
    }
    if !backend_ok {
        align_backend(provider, gateway, &state.backend, host_header).await?;
    }
    if !rule_ok {
        provider
            .upsert_routing_rule(
                gateway,
                &RoutingRule {
                    name: HTTPS_RULE_NAME.to_string(),
                    listener: updated.name.clone(),
                    backend: state.backend.name.clone(),
                },
            )
            .await?;
    }
    Ok((updated, ListenerOutcome::Updated))
}

/// The backend transport must agree with the listener scheme, and the host
/// header must equal the externally used domain; host-bound redirect flows
/// fail downstream otherwise.
async fn align_backend(
    provider: &dyn CloudProvider,
    gateway: &ManagedResource,
    observed: &BackendSettings,
    host_header: &str,
) -> Result<()> {
    if observed.protocol == Protocol::Https && observed.host_header.as_deref() == Some(host_header)
    {
        return Ok(());
    }
    let mut backend = observed.clone();
    backend.protocol = Protocol::Https;
    backend.host_header = Some(host_header.to_string());
    provider.update_backend(gateway, &backend).await?;
    info!(backend = %backend.name, host = host_header, "Aligned backend transport and host header");
    Ok(())
}
