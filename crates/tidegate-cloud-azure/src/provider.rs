//! Azure provider implementation

use crate::azcli::{AppGatewayInfo, AzCli, HttpListenerInfo, ListenerArgs};
use crate::error::AzureError;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tidegate_cloud::{
    AuthStatus, BackendSettings, CloudError, CloudProvider, FrontendPort, GatewayState,
    GrantOutcome, ListenerConfig, ManagedResource, PrincipalId, Protocol, ProvisioningState,
    ResourceKind, Result, RoleBinding, RoleKind, RoutingRule, Scope, SecretReference,
    SecretVersion,
};

/// Azure provider driving the az CLI
pub struct AzureProvider {
    az: AzCli,
}

impl AzureProvider {
    pub fn new() -> Self {
        Self { az: AzCli::new() }
    }

    async fn gateway_info(&self, gateway: &ManagedResource) -> Result<AppGatewayInfo> {
        self.az
            .get_gateway(gateway.scope.name(), &gateway.name)
            .await
            .map_err(CloudError::from)?
            .ok_or_else(|| CloudError::NotFound {
                kind: ResourceKind::Gateway,
                name: gateway.name.clone(),
            })
    }
}

impl Default for AzureProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn role_name(role: RoleKind) -> &'static str {
    match role {
        RoleKind::SecretsReader => "Key Vault Secrets User",
    }
}

fn provisioning_state(raw: Option<&str>) -> ProvisioningState {
    match raw {
        Some("Succeeded") => ProvisioningState::Succeeded,
        Some("Updating") => ProvisioningState::Updating,
        Some("Failed") => ProvisioningState::Failed,
        _ => ProvisioningState::Unknown,
    }
}

/// Versionless key-vault secret identifier for a reference.
fn secret_id(reference: &SecretReference) -> String {
    format!(
        "https://{}.vault.azure.net/secrets/{}",
        reference.store, reference.name
    )
}

/// Parse a key-vault secret identifier (versioned or not) back into a
/// versionless reference.
fn parse_secret_id(uri: &str) -> Option<SecretReference> {
    let rest = uri.strip_prefix("https://")?;
    let (host, path) = rest.split_once('/')?;
    let store = host.strip_suffix(".vault.azure.net")?;
    let mut segments = path.split('/');
    if segments.next()? != "secrets" {
        return None;
    }
    let name = segments.next()?;
    Some(SecretReference::new(store, name))
}

fn listener_from_info(info: &AppGatewayInfo, listener: &HttpListenerInfo) -> ListenerConfig {
    let frontend_port = listener
        .frontend_port
        .as_ref()
        .and_then(|port_ref| {
            info.frontend_ports
                .iter()
                .find(|p| p.name == port_ref.name())
        })
        .map(|p| p.port)
        .unwrap_or(0);
    let certificate = listener.ssl_certificate.as_ref().and_then(|cert_ref| {
        info.ssl_certificates
            .iter()
            .find(|c| c.name == cert_ref.name())
            .and_then(|c| c.key_vault_secret_id.as_deref())
            .and_then(parse_secret_id)
    });
    ListenerConfig {
        name: listener.name.clone(),
        frontend_port,
        protocol: match listener.protocol.as_deref() {
            Some("Https") => Protocol::Https,
            _ => Protocol::Http,
        },
        certificate,
        host_name: listener.host_name.clone(),
    }
}

#[async_trait]
impl CloudProvider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        match self.az.check_auth().await {
            Ok(account) => Ok(AuthStatus::ok(format!(
                "{} ({})",
                account.name, account.id
            ))),
            Err(AzureError::AzNotFound) => Ok(AuthStatus::failed("az CLI is not installed")),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn find_resources(
        &self,
        scope: &Scope,
        kind: ResourceKind,
    ) -> Result<Vec<ManagedResource>> {
        match kind {
            ResourceKind::Gateway => {
                let gateways = self.az.list_gateways(scope.name()).await?;
                Ok(gateways
                    .into_iter()
                    .map(|g| {
                        let state = provisioning_state(g.provisioning_state.as_deref());
                        ManagedResource::new(g.id, kind, g.name, scope.clone()).with_state(state)
                    })
                    .collect())
            }
            ResourceKind::SecretStore => {
                let vaults = self.az.list_vaults(scope.name()).await?;
                Ok(vaults
                    .into_iter()
                    .map(|v| ManagedResource::new(v.id, kind, v.name, scope.clone()))
                    .collect())
            }
        }
    }

    async fn get_resource(
        &self,
        scope: &Scope,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ManagedResource>> {
        match kind {
            ResourceKind::Gateway => {
                let gateway = self.az.get_gateway(scope.name(), name).await?;
                Ok(gateway.map(|g| {
                    let state = provisioning_state(g.provisioning_state.as_deref());
                    ManagedResource::new(g.id, kind, g.name, scope.clone()).with_state(state)
                }))
            }
            ResourceKind::SecretStore => {
                let vault = self.az.get_vault(scope.name(), name).await?;
                Ok(vault.map(|v| ManagedResource::new(v.id, kind, v.name, scope.clone())))
            }
        }
    }

    async fn create_secret_store(&self, scope: &Scope, name: &str) -> Result<ManagedResource> {
        let vault = self.az.create_vault(scope.name(), name).await?;
        Ok(ManagedResource::new(
            vault.id,
            ResourceKind::SecretStore,
            vault.name,
            scope.clone(),
        ))
    }

    async fn put_secret(
        &self,
        store: &ManagedResource,
        name: &str,
        payload: &[u8],
    ) -> Result<String> {
        let value = BASE64.encode(payload);
        let secret = self.az.set_secret(&store.name, name, &value).await?;
        Ok(secret.version().to_string())
    }

    async fn get_latest_secret(
        &self,
        store: &ManagedResource,
        name: &str,
    ) -> Result<Option<SecretVersion>> {
        let Some(secret) = self.az.get_secret(&store.name, name).await? else {
            return Ok(None);
        };
        let value = secret
            .value
            .as_deref()
            .ok_or_else(|| CloudError::Api(format!("secret {name} has no readable value")))?;
        let payload = BASE64
            .decode(value)
            .map_err(|e| CloudError::Api(format!("secret {name} payload is not base64: {e}")))?;
        Ok(Some(SecretVersion {
            version: secret.version().to_string(),
            payload,
        }))
    }

    async fn get_identity(&self, resource: &ManagedResource) -> Result<Option<PrincipalId>> {
        let info = self.gateway_info(resource).await?;
        Ok(info
            .identity
            .and_then(|i| i.principal_id)
            .map(PrincipalId::new))
    }

    async fn enable_identity(&self, resource: &ManagedResource) -> Result<PrincipalId> {
        let principal = self.az.assign_system_identity(&resource.id).await?;
        Ok(PrincipalId::new(principal))
    }

    async fn find_role_binding(
        &self,
        principal: &PrincipalId,
        role: RoleKind,
        target: &ManagedResource,
    ) -> Result<Option<RoleBinding>> {
        let assignments = self
            .az
            .list_role_assignments(principal.as_str(), role_name(role), &target.id)
            .await?;
        Ok(assignments.into_iter().next().map(|a| RoleBinding {
            id: a.id,
            principal: principal.clone(),
            role,
            target_id: target.id.clone(),
        }))
    }

    async fn grant_role(
        &self,
        principal: &PrincipalId,
        role: RoleKind,
        target: &ManagedResource,
    ) -> Result<GrantOutcome> {
        let created = self
            .az
            .create_role_assignment(principal.as_str(), role_name(role), &target.id)
            .await?;
        match created {
            Some(assignment) => Ok(GrantOutcome::Created(RoleBinding {
                id: assignment.id,
                principal: principal.clone(),
                role,
                target_id: target.id.clone(),
            })),
            None => {
                // Conflict: the binding exists, possibly not yet visible in
                // listings. Prefer the listed binding when it is.
                let existing = self.find_role_binding(principal, role, target).await?;
                Ok(GrantOutcome::AlreadyExists(existing.unwrap_or_else(|| {
                    RoleBinding {
                        id: "existing".to_string(),
                        principal: principal.clone(),
                        role,
                        target_id: target.id.clone(),
                    }
                })))
            }
        }
    }

    async fn describe_gateway(&self, gateway: &ManagedResource) -> Result<GatewayState> {
        let info = self.gateway_info(gateway).await?;

        let listeners = info
            .http_listeners
            .iter()
            .map(|l| listener_from_info(&info, l))
            .collect();
        let frontend_ports = info
            .frontend_ports
            .iter()
            .map(|p| FrontendPort {
                name: p.name.clone(),
                port: p.port,
            })
            .collect();
        let routing_rules = info
            .request_routing_rules
            .iter()
            .filter_map(|r| {
                let listener = r.http_listener.as_ref()?.name().to_string();
                Some(RoutingRule {
                    name: r.name.clone(),
                    listener,
                    backend: r
                        .backend_http_settings
                        .as_ref()
                        .map(|b| b.name().to_string())
                        .unwrap_or_else(|| "default-backend".to_string()),
                })
            })
            .collect();
        let backend = info
            .backend_http_settings_collection
            .first()
            .map(|b| BackendSettings {
                name: b.name.clone(),
                protocol: match b.protocol.as_deref() {
                    Some("Https") => Protocol::Https,
                    _ => Protocol::Http,
                },
                host_header: b.host_name.clone(),
            })
            .unwrap_or_default();

        Ok(GatewayState {
            listeners,
            frontend_ports,
            routing_rules,
            backend,
        })
    }

    async fn create_frontend_port(
        &self,
        gateway: &ManagedResource,
        port: &FrontendPort,
    ) -> Result<()> {
        self.az
            .create_frontend_port(gateway.scope.name(), &gateway.name, &port.name, port.port)
            .await?;
        Ok(())
    }

    async fn delete_frontend_port(&self, gateway: &ManagedResource, name: &str) -> Result<()> {
        self.az
            .delete_frontend_port(gateway.scope.name(), &gateway.name, name)
            .await?;
        Ok(())
    }

    async fn create_listener(
        &self,
        gateway: &ManagedResource,
        listener: &ListenerConfig,
    ) -> Result<()> {
        let group = gateway.scope.name();
        let ssl_cert = match &listener.certificate {
            Some(reference) => {
                self.az
                    .upsert_ssl_cert(group, &gateway.name, &reference.name, &secret_id(reference))
                    .await?;
                Some(reference.name.clone())
            }
            None => None,
        };

        // Resolve the port object name as the gateway currently knows it.
        let info = self.gateway_info(gateway).await?;
        let port_name = info
            .frontend_ports
            .iter()
            .find(|p| p.port == listener.frontend_port)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("port-{}", listener.frontend_port));

        self.az
            .create_http_listener(
                group,
                &gateway.name,
                &ListenerArgs {
                    name: &listener.name,
                    frontend_port: Some(&port_name),
                    ssl_cert: ssl_cert.as_deref(),
                    host_name: listener.host_name.as_deref(),
                },
            )
            .await?;
        Ok(())
    }

    async fn update_listener(
        &self,
        gateway: &ManagedResource,
        listener: &ListenerConfig,
    ) -> Result<()> {
        let group = gateway.scope.name();
        let ssl_cert = match &listener.certificate {
            Some(reference) => {
                self.az
                    .upsert_ssl_cert(group, &gateway.name, &reference.name, &secret_id(reference))
                    .await?;
                Some(reference.name.clone())
            }
            None => None,
        };
        self.az
            .update_http_listener(
                group,
                &gateway.name,
                &ListenerArgs {
                    name: &listener.name,
                    frontend_port: None,
                    ssl_cert: ssl_cert.as_deref(),
                    host_name: listener.host_name.as_deref(),
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_listener(&self, gateway: &ManagedResource, name: &str) -> Result<()> {
        self.az
            .delete_http_listener(gateway.scope.name(), &gateway.name, name)
            .await?;
        Ok(())
    }

    async fn upsert_routing_rule(
        &self,
        gateway: &ManagedResource,
        rule: &RoutingRule,
    ) -> Result<()> {
        self.az
            .upsert_routing_rule(
                gateway.scope.name(),
                &gateway.name,
                &rule.name,
                &rule.listener,
                &rule.backend,
            )
            .await?;
        Ok(())
    }

    async fn update_backend(
        &self,
        gateway: &ManagedResource,
        backend: &BackendSettings,
    ) -> Result<()> {
        let protocol = match backend.protocol {
            Protocol::Https => "Https",
            Protocol::Http => "Http",
        };
        self.az
            .update_http_settings(
                gateway.scope.name(),
                &gateway.name,
                &backend.name,
                protocol,
                backend.host_header.as_deref(),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_id_round_trip() {
        let reference = SecretReference::new("prod-vault", "gateway-tls");
        let id = secret_id(&reference);
        assert_eq!(id, "https://prod-vault.vault.azure.net/secrets/gateway-tls");
        assert_eq!(parse_secret_id(&id), Some(reference));
    }

    #[test]
    fn test_parse_secret_id_ignores_version() {
        let parsed =
            parse_secret_id("https://prod-vault.vault.azure.net/secrets/gateway-tls/abc123");
        assert_eq!(parsed, Some(SecretReference::new("prod-vault", "gateway-tls")));
    }

    #[test]
    fn test_parse_secret_id_rejects_foreign_uris() {
        assert_eq!(parse_secret_id("https://example.com/secrets/x"), None);
        assert_eq!(
            parse_secret_id("https://prod-vault.vault.azure.net/keys/x"),
            None
        );
    }
}
