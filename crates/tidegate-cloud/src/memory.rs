//! In-memory cloud provider.
//!
//! Deterministic stand-in for a real provider, used by the engine's
//! integration tests: state is seeded per test, every mutating call is
//! counted, and the one-listener-per-frontend-port invariant is enforced
//! at write time the way a real provider rejects conflicting writes.

use crate::error::{CloudError, Result};
use crate::gateway::{
    BackendSettings, FrontendPort, GatewayState, ListenerConfig, Protocol, RoutingRule,
};
use crate::provider::{AuthStatus, CloudProvider};
use crate::resource::{
    GrantOutcome, ManagedResource, PrincipalId, ResourceKind, RoleBinding, RoleKind, Scope,
    SecretVersion,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    resources: Vec<ManagedResource>,
    /// (store name, secret name) -> payload versions, oldest first.
    secrets: HashMap<(String, String), Vec<Vec<u8>>>,
    /// resource id -> principal
    identities: HashMap<String, PrincipalId>,
    bindings: Vec<RoleBinding>,
    /// gateway id -> observed state
    gateways: HashMap<String, GatewayState>,
    mutations: u64,
    next_id: u64,
    stale_binding_reads: bool,
}

impl MemoryState {
    fn alloc(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// In-memory provider with seedable state.
#[derive(Default)]
pub struct MemoryProvider {
    state: Mutex<MemoryState>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a gateway with an explicit observed state.
    pub fn seed_gateway(&self, scope: &Scope, name: &str, state: GatewayState) -> ManagedResource {
        let mut inner = self.state.lock().unwrap();
        let id = inner.alloc("gw");
        let resource = ManagedResource::new(id.clone(), ResourceKind::Gateway, name, scope.clone());
        inner.resources.push(resource.clone());
        inner.gateways.insert(id, state);
        resource
    }

    /// Seed a gateway in the usual bootstrap shape: a plaintext listener on
    /// `http_port` wired to the default backend by one routing rule.
    pub fn seed_gateway_http(&self, scope: &Scope, name: &str, http_port: u16) -> ManagedResource {
        let listener = ListenerConfig {
            name: format!("http-{http_port}"),
            frontend_port: http_port,
            protocol: Protocol::Http,
            certificate: None,
            host_name: None,
        };
        let state = GatewayState {
            frontend_ports: vec![FrontendPort::for_port(http_port)],
            routing_rules: vec![RoutingRule {
                name: "default-rule".to_string(),
                listener: listener.name.clone(),
                backend: "default-backend".to_string(),
            }],
            listeners: vec![listener],
            backend: BackendSettings::default(),
        };
        self.seed_gateway(scope, name, state)
    }

    pub fn seed_secret_store(&self, scope: &Scope, name: &str) -> ManagedResource {
        let mut inner = self.state.lock().unwrap();
        let id = inner.alloc("store");
        let resource = ManagedResource::new(id, ResourceKind::SecretStore, name, scope.clone());
        inner.resources.push(resource.clone());
        resource
    }

    pub fn seed_role_binding(
        &self,
        principal: &PrincipalId,
        role: RoleKind,
        target: &ManagedResource,
    ) -> RoleBinding {
        let mut inner = self.state.lock().unwrap();
        let binding = RoleBinding {
            id: inner.alloc("binding"),
            principal: principal.clone(),
            role,
            target_id: target.id.clone(),
        };
        inner.bindings.push(binding.clone());
        binding
    }

    /// Make `find_role_binding` return nothing while `grant_role` still
    /// conflicts: models a provider whose listing lags behind creation.
    pub fn set_stale_binding_reads(&self, stale: bool) {
        self.state.lock().unwrap().stale_binding_reads = stale;
    }

    /// Total mutating provider calls issued so far.
    pub fn mutation_count(&self) -> u64 {
        self.state.lock().unwrap().mutations
    }

    pub fn gateway_state(&self, gateway: &ManagedResource) -> GatewayState {
        self.state
            .lock()
            .unwrap()
            .gateways
            .get(&gateway.id)
            .cloned()
            .expect("gateway not seeded")
    }

    pub fn secret_version_count(&self, store: &ManagedResource, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .secrets
            .get(&(store.name.clone(), name.to_string()))
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn role_binding_count(&self) -> usize {
        self.state.lock().unwrap().bindings.len()
    }
}

#[async_trait]
impl CloudProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("memory"))
    }

    async fn find_resources(
        &self,
        scope: &Scope,
        kind: ResourceKind,
    ) -> Result<Vec<ManagedResource>> {
        let inner = self.state.lock().unwrap();
        Ok(inner
            .resources
            .iter()
            .filter(|r| r.scope == *scope && r.kind == kind)
            .cloned()
            .collect())
    }

    async fn get_resource(
        &self,
        scope: &Scope,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ManagedResource>> {
        let inner = self.state.lock().unwrap();
        Ok(inner
            .resources
            .iter()
            .find(|r| r.scope == *scope && r.kind == kind && r.name == name)
            .cloned())
    }

    async fn create_secret_store(&self, scope: &Scope, name: &str) -> Result<ManagedResource> {
        let mut inner = self.state.lock().unwrap();
        if inner
            .resources
            .iter()
            .any(|r| r.scope == *scope && r.kind == ResourceKind::SecretStore && r.name == name)
        {
            return Err(CloudError::AlreadyExists(name.to_string()));
        }
        let id = inner.alloc("store");
        let resource = ManagedResource::new(id, ResourceKind::SecretStore, name, scope.clone());
        inner.resources.push(resource.clone());
        inner.mutations += 1;
        Ok(resource)
    }

    async fn put_secret(
        &self,
        store: &ManagedResource,
        name: &str,
        payload: &[u8],
    ) -> Result<String> {
        let mut inner = self.state.lock().unwrap();
        let versions = inner
            .secrets
            .entry((store.name.clone(), name.to_string()))
            .or_default();
        versions.push(payload.to_vec());
        let version = format!("v{}", versions.len());
        inner.mutations += 1;
        Ok(version)
    }

    async fn get_latest_secret(
        &self,
        store: &ManagedResource,
        name: &str,
    ) -> Result<Option<SecretVersion>> {
        let inner = self.state.lock().unwrap();
        Ok(inner
            .secrets
            .get(&(store.name.clone(), name.to_string()))
            .and_then(|versions| {
                versions.last().map(|payload| SecretVersion {
                    version: format!("v{}", versions.len()),
                    payload: payload.clone(),
                })
            }))
    }

    async fn get_identity(&self, resource: &ManagedResource) -> Result<Option<PrincipalId>> {
        let inner = self.state.lock().unwrap();
        Ok(inner.identities.get(&resource.id).cloned())
    }

    async fn enable_identity(&self, resource: &ManagedResource) -> Result<PrincipalId> {
        let mut inner = self.state.lock().unwrap();
        if let Some(existing) = inner.identities.get(&resource.id) {
            return Ok(existing.clone());
        }
        let principal = PrincipalId::new(inner.alloc("principal"));
        inner.identities.insert(resource.id.clone(), principal.clone());
        inner.mutations += 1;
        Ok(principal)
    }

    async fn find_role_binding(
        &self,
        principal: &PrincipalId,
        role: RoleKind,
        target: &ManagedResource,
    ) -> Result<Option<RoleBinding>> {
        let inner = self.state.lock().unwrap();
        if inner.stale_binding_reads {
            return Ok(None);
        }
        Ok(inner
            .bindings
            .iter()
            .find(|b| b.principal == *principal && b.role == role && b.target_id == target.id)
            .cloned())
    }

    async fn grant_role(
        &self,
        principal: &PrincipalId,
        role: RoleKind,
        target: &ManagedResource,
    ) -> Result<GrantOutcome> {
        let mut inner = self.state.lock().unwrap();
        if let Some(existing) = inner
            .bindings
            .iter()
            .find(|b| b.principal == *principal && b.role == role && b.target_id == target.id)
        {
            return Ok(GrantOutcome::AlreadyExists(existing.clone()));
        }
        let binding = RoleBinding {
            id: inner.alloc("binding"),
            principal: principal.clone(),
            role,
            target_id: target.id.clone(),
        };
        inner.bindings.push(binding.clone());
        inner.mutations += 1;
        Ok(GrantOutcome::Created(binding))
    }

    async fn describe_gateway(&self, gateway: &ManagedResource) -> Result<GatewayState> {
        let inner = self.state.lock().unwrap();
        inner
            .gateways
            .get(&gateway.id)
            .cloned()
            .ok_or_else(|| CloudError::Api(format!("unknown gateway: {}", gateway.name)))
    }

    async fn create_frontend_port(
        &self,
        gateway: &ManagedResource,
        port: &FrontendPort,
    ) -> Result<()> {
        let mut inner = self.state.lock().unwrap();
        let state = gateway_state_mut(&mut inner, gateway)?;
        if state
            .frontend_ports
            .iter()
            .any(|p| p.port == port.port || p.name == port.name)
        {
            return Err(CloudError::AlreadyExists(format!(
                "frontend port {}",
                port.port
            )));
        }
        state.frontend_ports.push(port.clone());
        inner.mutations += 1;
        Ok(())
    }

    async fn delete_frontend_port(&self, gateway: &ManagedResource, name: &str) -> Result<()> {
        let mut inner = self.state.lock().unwrap();
        let state = gateway_state_mut(&mut inner, gateway)?;
        let Some(index) = state.frontend_ports.iter().position(|p| p.name == name) else {
            return Err(CloudError::Api(format!("unknown frontend port: {name}")));
        };
        let port = state.frontend_ports[index].port;
        if state.listeners.iter().any(|l| l.frontend_port == port) {
            return Err(CloudError::Api(format!(
                "frontend port {port} is still bound to a listener"
            )));
        }
        state.frontend_ports.remove(index);
        inner.mutations += 1;
        Ok(())
    }

    async fn create_listener(
        &self,
        gateway: &ManagedResource,
        listener: &ListenerConfig,
    ) -> Result<()> {
        let mut inner = self.state.lock().unwrap();
        let state = gateway_state_mut(&mut inner, gateway)?;
        if let Some(occupant) = state
            .listeners
            .iter()
            .find(|l| l.frontend_port == listener.frontend_port)
        {
            // The invariant the engine must never violate: one listener
            // per frontend port.
            return Err(CloudError::AlreadyExists(format!(
                "port {} is already bound to listener {}",
                listener.frontend_port, occupant.name
            )));
        }
        if state.frontend_port(listener.frontend_port).is_none() {
            return Err(CloudError::Api(format!(
                "no frontend port binding for port {}",
                listener.frontend_port
            )));
        }
        state.listeners.push(listener.clone());
        inner.mutations += 1;
        Ok(())
    }

    async fn update_listener(
        &self,
        gateway: &ManagedResource,
        listener: &ListenerConfig,
    ) -> Result<()> {
        let mut inner = self.state.lock().unwrap();
        let state = gateway_state_mut(&mut inner, gateway)?;
        let Some(existing) = state.listeners.iter_mut().find(|l| l.name == listener.name) else {
            return Err(CloudError::Api(format!(
                "unknown listener: {}",
                listener.name
            )));
        };
        *existing = listener.clone();
        inner.mutations += 1;
        Ok(())
    }

    async fn delete_listener(&self, gateway: &ManagedResource, name: &str) -> Result<()> {
        let mut inner = self.state.lock().unwrap();
        let state = gateway_state_mut(&mut inner, gateway)?;
        let Some(index) = state.listeners.iter().position(|l| l.name == name) else {
            return Err(CloudError::Api(format!("unknown listener: {name}")));
        };
        state.listeners.remove(index);
        inner.mutations += 1;
        Ok(())
    }

    async fn upsert_routing_rule(
        &self,
        gateway: &ManagedResource,
        rule: &RoutingRule,
    ) -> Result<()> {
        let mut inner = self.state.lock().unwrap();
        let state = gateway_state_mut(&mut inner, gateway)?;
        if let Some(existing) = state.routing_rules.iter_mut().find(|r| r.name == rule.name) {
            *existing = rule.clone();
        } else {
            state.routing_rules.push(rule.clone());
        }
        inner.mutations += 1;
        Ok(())
    }

    async fn update_backend(
        &self,
        gateway: &ManagedResource,
        backend: &BackendSettings,
    ) -> Result<()> {
        let mut inner = self.state.lock().unwrap();
        let state = gateway_state_mut(&mut inner, gateway)?;
        state.backend = backend.clone();
        inner.mutations += 1;
        Ok(())
    }
}

fn gateway_state_mut<'a>(
    inner: &'a mut MemoryState,
    gateway: &ManagedResource,
) -> Result<&'a mut GatewayState> {
    inner
        .gateways
        .get_mut(&gateway.id)
        .ok_or_else(|| CloudError::Api(format!("unknown gateway: {}", gateway.name)))
}
