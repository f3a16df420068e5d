//! Cloud provider trait definition

use crate::error::Result;
use crate::gateway::{BackendSettings, FrontendPort, GatewayState, ListenerConfig, RoutingRule};
use crate::resource::{
    GrantOutcome, ManagedResource, PrincipalId, ResourceKind, RoleBinding, RoleKind, Scope,
    SecretVersion,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Cloud provider abstraction trait
///
/// One implementation per provider backend; the engine only talks to this
/// trait. All state of record lives behind it; the engine re-derives
/// everything from these reads on every run.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Provider name (e.g., "azure", "memory")
    fn name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    // --- discovery (read-only) ---

    /// Enumerate resources of `kind` within `scope`.
    async fn find_resources(&self, scope: &Scope, kind: ResourceKind)
    -> Result<Vec<ManagedResource>>;

    /// Fetch a single resource by name; `None` when absent.
    async fn get_resource(
        &self,
        scope: &Scope,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ManagedResource>>;

    // --- secret store ---

    async fn create_secret_store(&self, scope: &Scope, name: &str) -> Result<ManagedResource>;

    /// Write a new secret version. The store's versioned write is atomic;
    /// returns the new version id.
    async fn put_secret(
        &self,
        store: &ManagedResource,
        name: &str,
        payload: &[u8],
    ) -> Result<String>;

    async fn get_latest_secret(
        &self,
        store: &ManagedResource,
        name: &str,
    ) -> Result<Option<SecretVersion>>;

    // --- identity ---

    async fn get_identity(&self, resource: &ManagedResource) -> Result<Option<PrincipalId>>;

    async fn enable_identity(&self, resource: &ManagedResource) -> Result<PrincipalId>;

    // --- authorization ---

    async fn find_role_binding(
        &self,
        principal: &PrincipalId,
        role: RoleKind,
        target: &ManagedResource,
    ) -> Result<Option<RoleBinding>>;

    /// Grant `role` on `target` to `principal`. A provider-side conflict
    /// for an existing binding comes back as `GrantOutcome::AlreadyExists`.
    async fn grant_role(
        &self,
        principal: &PrincipalId,
        role: RoleKind,
        target: &ManagedResource,
    ) -> Result<GrantOutcome>;

    // --- gateway ---

    async fn describe_gateway(&self, gateway: &ManagedResource) -> Result<GatewayState>;

    async fn create_frontend_port(
        &self,
        gateway: &ManagedResource,
        port: &FrontendPort,
    ) -> Result<()>;

    async fn delete_frontend_port(&self, gateway: &ManagedResource, name: &str) -> Result<()>;

    async fn create_listener(
        &self,
        gateway: &ManagedResource,
        listener: &ListenerConfig,
    ) -> Result<()>;

    async fn update_listener(
        &self,
        gateway: &ManagedResource,
        listener: &ListenerConfig,
    ) -> Result<()>;

    async fn delete_listener(&self, gateway: &ManagedResource, name: &str) -> Result<()>;

    /// Create the rule if absent, repoint it otherwise.
    async fn upsert_routing_rule(
        &self,
        gateway: &ManagedResource,
        rule: &RoutingRule,
    ) -> Result<()>;

    async fn update_backend(
        &self,
        gateway: &ManagedResource,
        backend: &BackendSettings,
    ) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}
