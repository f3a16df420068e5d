//! az CLI wrapper
//!
//! Wraps the Azure CLI for resource management operations. Every call goes
//! through `--output json`; stderr is classified into throttling, conflict
//! and authentication faults so callers never string-match.

use crate::error::{AzureError, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

/// az CLI wrapper
pub struct AzCli;

impl AzCli {
    pub fn new() -> Self {
        Self
    }

    /// Check if az is installed and authenticated
    pub async fn check_auth(&self) -> Result<AccountInfo> {
        let which = Command::new("which").arg("az").output().await?;
        if !which.status.success() {
            return Err(AzureError::AzNotFound);
        }

        let output = self.run_command(&["account", "show"]).await?;
        let account: AccountInfo = serde_json::from_str(&output)?;
        Ok(account)
    }

    /// Run an az command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("az");
        cmd.args(args);
        cmd.arg("--output").arg("json");
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: az {} --output json", args.join(" "));

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(classify_failure(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run an az command where "not found" is an expected answer
    async fn run_optional(&self, args: &[&str]) -> Result<Option<String>> {
        match self.run_command(args).await {
            Ok(output) => Ok(Some(output)),
            Err(AzureError::CommandFailed(stderr)) if is_not_found(&stderr) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // --- application gateway ---

    pub async fn list_gateways(&self, group: &str) -> Result<Vec<AppGatewayInfo>> {
        let output = self
            .run_command(&["network", "application-gateway", "list", "-g", group])
            .await?;
        parse_list(&output)
    }

    pub async fn get_gateway(&self, group: &str, name: &str) -> Result<Option<AppGatewayInfo>> {
        let output = self
            .run_optional(&["network", "application-gateway", "show", "-g", group, "-n", name])
            .await?;
        output.map(|o| serde_json::from_str(&o).map_err(Into::into)).transpose()
    }

    // --- key vault ---

    pub async fn list_vaults(&self, group: &str) -> Result<Vec<VaultInfo>> {
        let output = self.run_command(&["keyvault", "list", "-g", group]).await?;
        parse_list(&output)
    }

    pub async fn get_vault(&self, group: &str, name: &str) -> Result<Option<VaultInfo>> {
        let output = self
            .run_optional(&["keyvault", "show", "-g", group, "-n", name])
            .await?;
        output.map(|o| serde_json::from_str(&o).map_err(Into::into)).transpose()
    }

    pub async fn create_vault(&self, group: &str, name: &str) -> Result<VaultInfo> {
        let output = self
            .run_command(&[
                "keyvault",
                "create",
                "-g",
                group,
                "-n",
                name,
                "--enable-rbac-authorization",
                "true",
            ])
            .await?;
        let vault: VaultInfo = serde_json::from_str(&output)?;
        Ok(vault)
    }

    // --- secrets ---

    pub async fn set_secret(&self, vault: &str, name: &str, value: &str) -> Result<SecretInfo> {
        let output = self
            .run_command(&[
                "keyvault",
                "secret",
                "set",
                "--vault-name",
                vault,
                "--name",
                name,
                "--value",
                value,
            ])
            .await?;
        let secret: SecretInfo = serde_json::from_str(&output)?;
        Ok(secret)
    }

    pub async fn get_secret(&self, vault: &str, name: &str) -> Result<Option<SecretInfo>> {
        let output = self
            .run_optional(&["keyvault", "secret", "show", "--vault-name", vault, "--name", name])
            .await?;
        output.map(|o| serde_json::from_str(&o).map_err(Into::into)).transpose()
    }

    // --- identity ---

    /// Enable the system-assigned identity on a resource and return the
    /// resulting principal id.
    pub async fn assign_system_identity(&self, resource_id: &str) -> Result<String> {
        let output = self
            .run_command(&[
                "resource",
                "update",
                "--ids",
                resource_id,
                "--set",
                "identity.type=SystemAssigned",
            ])
            .await?;
        let resource: ResourceWithIdentity = serde_json::from_str(&output)?;
        resource
            .identity
            .and_then(|i| i.principal_id)
            .ok_or_else(|| {
                AzureError::CommandFailed("identity assignment returned no principal".to_string())
            })
    }

    // --- role assignments ---

    pub async fn list_role_assignments(
        &self,
        principal: &str,
        role: &str,
        scope_id: &str,
    ) -> Result<Vec<RoleAssignmentInfo>> {
        let output = self
            .run_command(&[
                "role",
                "assignment",
                "list",
                "--assignee",
                principal,
                "--role",
                role,
                "--scope",
                scope_id,
            ])
            .await?;
        parse_list(&output)
    }

    /// `Ok(None)` means the provider reported the assignment as already
    /// existing (a conflict this caller treats as success).
    pub async fn create_role_assignment(
        &self,
        principal: &str,
        role: &str,
        scope_id: &str,
    ) -> Result<Option<RoleAssignmentInfo>> {
        let result = self
            .run_command(&[
                "role",
                "assignment",
                "create",
                "--assignee-object-id",
                principal,
                "--assignee-principal-type",
                "ServicePrincipal",
                "--role",
                role,
                "--scope",
                scope_id,
            ])
            .await;
        match result {
            Ok(output) => Ok(Some(serde_json::from_str(&output)?)),
            Err(AzureError::Conflict(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // --- gateway sub-resources ---

    pub async fn create_frontend_port(
        &self,
        group: &str,
        gateway: &str,
        name: &str,
        port: u16,
    ) -> Result<()> {
        let port_str = port.to_string();
        self.run_command(&[
            "network",
            "application-gateway",
            "frontend-port",
            "create",
            "-g",
            group,
            "--gateway-name",
            gateway,
            "--name",
            name,
            "--port",
            port_str.as_str(),
        ])
        .await?;
        Ok(())
    }

    pub async fn delete_frontend_port(&self, group: &str, gateway: &str, name: &str) -> Result<()> {
        self.run_command(&[
            "network",
            "application-gateway",
            "frontend-port",
            "delete",
            "-g",
            group,
            "--gateway-name",
            gateway,
            "--name",
            name,
        ])
        .await?;
        Ok(())
    }

    /// Bind a key-vault secret to the gateway as an SSL certificate object,
    /// updating in place when it already exists. The secret id is always
    /// versionless so rotation needs no gateway update.
    pub async fn upsert_ssl_cert(
        &self,
        group: &str,
        gateway: &str,
        name: &str,
        key_vault_secret_id: &str,
    ) -> Result<()> {
        let create = self
            .run_command(&[
                "network",
                "application-gateway",
                "ssl-cert",
                "create",
                "-g",
                group,
                "--gateway-name",
                gateway,
                "--name",
                name,
                "--key-vault-secret-id",
                key_vault_secret_id,
            ])
            .await;
        match create {
            Ok(_) => Ok(()),
            Err(AzureError::Conflict(_)) => {
                self.run_command(&[
                    "network",
                    "application-gateway",
                    "ssl-cert",
                    "update",
                    "-g",
                    group,
                    "--gateway-name",
                    gateway,
                    "--name",
                    name,
                    "--key-vault-secret-id",
                    key_vault_secret_id,
                ])
                .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_http_listener(
        &self,
        group: &str,
        gateway: &str,
        listener: &ListenerArgs<'_>,
    ) -> Result<()> {
        let mut args = vec![
            "network",
            "application-gateway",
            "http-listener",
            "create",
            "-g",
            group,
            "--gateway-name",
            gateway,
            "--name",
            listener.name,
        ];
        if let Some(port) = listener.frontend_port {
            args.push("--frontend-port");
            args.push(port);
        }
        if let Some(cert) = listener.ssl_cert {
            args.push("--ssl-cert");
            args.push(cert);
        }
        if let Some(host) = listener.host_name {
            args.push("--host-name");
            args.push(host);
        }
        self.run_command(&args).await?;
        Ok(())
    }

    pub async fn update_http_listener(
        &self,
        group: &str,
        gateway: &str,
        listener: &ListenerArgs<'_>,
    ) -> Result<()> {
        let mut args = vec![
            "network",
            "application-gateway",
            "http-listener",
            "update",
            "-g",
            group,
            "--gateway-name",
            gateway,
            "--name",
            listener.name,
        ];
        if let Some(cert) = listener.ssl_cert {
            args.push("--ssl-cert");
            args.push(cert);
        }
        if let Some(host) = listener.host_name {
            args.push("--host-name");
            args.push(host);
        }
        self.run_command(&args).await?;
        Ok(())
    }

    pub async fn delete_http_listener(&self, group: &str, gateway: &str, name: &str) -> Result<()> {
        self.run_command(&[
            "network",
            "application-gateway",
            "http-listener",
            "delete",
            "-g",
            group,
            "--gateway-name",
            gateway,
            "--name",
            name,
        ])
        .await?;
        Ok(())
    }

    pub async fn upsert_routing_rule(
        &self,
        group: &str,
        gateway: &str,
        name: &str,
        listener: &str,
        backend_settings: &str,
    ) -> Result<()> {
        let update = self
            .run_command(&[
                "network",
                "application-gateway",
                "rule",
                "update",
                "-g",
                group,
                "--gateway-name",
                gateway,
                "--name",
                name,
                "--http-listener",
                listener,
            ])
            .await;
        match update {
            Ok(_) => Ok(()),
            Err(AzureError::CommandFailed(stderr)) if is_not_found(&stderr) => {
                self.run_command(&[
                    "network",
                    "application-gateway",
                    "rule",
                    "create",
                    "-g",
                    group,
                    "--gateway-name",
                    gateway,
                    "--name",
                    name,
                    "--http-listener",
                    listener,
                    "--http-settings",
                    backend_settings,
                ])
                .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn update_http_settings(
        &self,
        group: &str,
        gateway: &str,
        name: &str,
        protocol: &str,
        host_name: Option<&str>,
    ) -> Result<()> {
        let mut args = vec![
            "network",
            "application-gateway",
            "http-settings",
            "update",
            "-g",
            group,
            "--gateway-name",
            gateway,
            "--name",
            name,
            "--protocol",
            protocol,
        ];
        if let Some(host) = host_name {
            args.push("--host-name");
            args.push(host);
        }
        self.run_command(&args).await?;
        Ok(())
    }
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for listener create/update calls.
pub struct ListenerArgs<'a> {
    pub name: &'a str,
    /// Frontend port object name; required on create, ignored on update.
    pub frontend_port: Option<&'a str>,
    pub ssl_cert: Option<&'a str>,
    pub host_name: Option<&'a str>,
}

fn classify_failure(stderr: String) -> AzureError {
    let lower = stderr.to_lowercase();
    if lower.contains("az login") || lower.contains("please run 'az login'") {
        AzureError::AuthenticationFailed(stderr)
    } else if lower.contains("toomanyrequests")
        || lower.contains("429")
        || lower.contains("timed out")
        || lower.contains("connection reset")
    {
        AzureError::Throttled(stderr)
    } else if lower.contains("conflict")
        || lower.contains("already exists")
        || lower.contains("roleassignmentexists")
    {
        AzureError::Conflict(stderr)
    } else {
        AzureError::CommandFailed(stderr)
    }
}

fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("resourcenotfound")
        || lower.contains("was not found")
        || lower.contains("could not be found")
        || lower.contains("secretnotfound")
}

fn parse_list<T: serde::de::DeserializeOwned>(output: &str) -> Result<Vec<T>> {
    if output.trim().is_empty() || output.trim() == "[]" {
        return Ok(Vec::new());
    }
    let items: Vec<T> = serde_json::from_str(output)?;
    Ok(items)
}

/// Account information from `az account show`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    pub user: Option<AccountUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountUser {
    pub name: String,
}

/// Application gateway as returned by the ARM API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppGatewayInfo {
    pub id: String,
    pub name: String,
    pub provisioning_state: Option<String>,
    pub identity: Option<IdentityInfo>,
    #[serde(default)]
    pub http_listeners: Vec<HttpListenerInfo>,
    #[serde(default)]
    pub frontend_ports: Vec<FrontendPortInfo>,
    #[serde(default)]
    pub request_routing_rules: Vec<RoutingRuleInfo>,
    #[serde(default)]
    pub backend_http_settings_collection: Vec<BackendHttpSettingsInfo>,
    #[serde(default)]
    pub ssl_certificates: Vec<SslCertificateInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityInfo {
    #[serde(rename = "type")]
    pub identity_type: Option<String>,
    pub principal_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpListenerInfo {
    pub name: String,
    pub protocol: Option<String>,
    pub host_name: Option<String>,
    pub frontend_port: Option<SubResource>,
    pub ssl_certificate: Option<SubResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendPortInfo {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRuleInfo {
    pub name: String,
    pub http_listener: Option<SubResource>,
    pub backend_http_settings: Option<SubResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendHttpSettingsInfo {
    pub name: String,
    pub protocol: Option<String>,
    pub host_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslCertificateInfo {
    pub name: String,
    pub key_vault_secret_id: Option<String>,
}

/// ARM sub-resource reference (an id pointing at a sibling element)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubResource {
    pub id: String,
}

impl SubResource {
    /// Final path segment of the referenced id.
    pub fn name(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: Option<VaultProperties>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultProperties {
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretInfo {
    /// Full secret identifier including the version segment.
    pub id: String,
    pub value: Option<String>,
}

impl SecretInfo {
    /// Version segment of the secret identifier.
    pub fn version(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceWithIdentity {
    pub identity: Option<IdentityInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentInfo {
    pub id: String,
    pub principal_id: String,
    pub role_definition_name: Option<String>,
    pub scope: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_resource_name() {
        let sub = SubResource {
            id: "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/applicationGateways/gw/frontendPorts/port-443".to_string(),
        };
        assert_eq!(sub.name(), "port-443");
    }

    #[test]
    fn test_secret_version() {
        let secret = SecretInfo {
            id: "https://vault.vault.azure.net/secrets/gateway-tls/abc123".to_string(),
            value: None,
        };
        assert_eq!(secret.version(), "abc123");
    }

    #[test]
    fn test_conflict_classification() {
        assert!(matches!(
            classify_failure("ERROR: The role assignment already exists.".to_string()),
            AzureError::Conflict(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: TooManyRequests, retry later".to_string()),
            AzureError::Throttled(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: Please run 'az login' to setup account.".to_string()),
            AzureError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: something else".to_string()),
            AzureError::CommandFailed(_)
        ));
    }

    #[test]
    fn test_gateway_parsing() {
        let json = r#"{
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/applicationGateways/gw",
            "name": "gw",
            "provisioningState": "Succeeded",
            "identity": {"type": "SystemAssigned", "principalId": "pid-1"},
            "httpListeners": [{
                "name": "http-80",
                "protocol": "Http",
                "frontendPort": {"id": ".../frontendPorts/port-80"}
            }],
            "frontendPorts": [{"name": "port-80", "port": 80}],
            "requestRoutingRules": [{
                "name": "default-rule",
                "httpListener": {"id": ".../httpListeners/http-80"},
                "backendHttpSettings": {"id": ".../backendHttpSettingsCollection/default-backend"}
            }],
            "backendHttpSettingsCollection": [{"name": "default-backend", "protocol": "Http"}]
        }"#;
        let gateway: AppGatewayInfo = serde_json::from_str(json).unwrap();
        assert_eq!(gateway.http_listeners.len(), 1);
        assert_eq!(gateway.frontend_ports[0].port, 80);
        assert_eq!(
            gateway.request_routing_rules[0]
                .http_listener
                .as_ref()
                .unwrap()
                .name(),
            "http-80"
        );
        assert_eq!(gateway.identity.unwrap().principal_id.as_deref(), Some("pid-1"));
    }
}
