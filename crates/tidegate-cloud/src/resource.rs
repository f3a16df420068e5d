//! Typed handles for provider-managed resources.

use serde::{Deserialize, Serialize};

/// Administrative boundary (a resource group) containing managed resources.
///
/// Immutable once resolved; every discovery and mutation happens within one
/// scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope(String);

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of resources the engine discovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Application gateway (also the identity-bearing compute resource).
    Gateway,
    /// Secret store holding certificate material.
    SecretStore,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Gateway => write!(f, "gateway"),
            ResourceKind::SecretStore => write!(f, "secret store"),
        }
    }
}

/// Provisioning state as read from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    Succeeded,
    Updating,
    Failed,
    Unknown,
}

/// Handle to a cloud object.
///
/// Produced by discovery; nothing in this system mutates the handle itself,
/// only the provider-side object it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedResource {
    /// Provider-assigned resource id.
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub scope: Scope,
    pub state: ProvisioningState,
}

impl ManagedResource {
    pub fn new(
        id: impl Into<String>,
        kind: ResourceKind,
        name: impl Into<String>,
        scope: Scope,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            scope,
            state: ProvisioningState::Succeeded,
        }
    }

    pub fn with_state(mut self, state: ProvisioningState) -> Self {
        self.state = state;
        self
    }
}

/// Versionless pointer to the latest version of a secret.
///
/// Stable across rotations: dependents holding this reference pick up new
/// certificate versions without being updated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretReference {
    pub store: String,
    pub name: String,
}

impl SecretReference {
    pub fn new(store: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for SecretReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.store, self.name)
    }
}

/// One stored version of a secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretVersion {
    pub version: String,
    pub payload: Vec<u8>,
}

/// Credential principal attached to a compute resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Permission scopes this system grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    /// Read access to secrets in a secret store.
    SecretsReader,
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleKind::SecretsReader => write!(f, "secrets-reader"),
        }
    }
}

/// A grant of `role` from `principal` to the resource at `target_id`.
///
/// At most one binding exists per (principal, role, target) triple;
/// duplicate grants are a no-op, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub id: String,
    pub principal: PrincipalId,
    pub role: RoleKind,
    pub target_id: String,
}

/// Result of a grant operation.
///
/// Providers report an existing binding as a creation conflict; that case
/// is success for an idempotent caller, so it is a variant here rather than
/// an error to string-match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Created(RoleBinding),
    AlreadyExists(RoleBinding),
}

impl GrantOutcome {
    pub fn binding(&self) -> &RoleBinding {
        match self {
            GrantOutcome::Created(b) | GrantOutcome::AlreadyExists(b) => b,
        }
    }

    /// Whether this grant created a binding that did not exist before.
    pub fn is_new(&self) -> bool {
        matches!(self, GrantOutcome::Created(_))
    }
}
