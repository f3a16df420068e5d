//! Identity enablement and secret-store access.

use crate::error::Result;
use std::time::Duration;
use tidegate_cloud::{Clock, CloudProvider, GrantOutcome, ManagedResource, PrincipalId, RoleKind};
use tracing::{debug, info};

/// Result of ensuring identity and access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessOutcome {
    pub principal: PrincipalId,
    /// Whether the system identity was enabled by this run.
    pub identity_enabled: bool,
    /// Whether a new role binding was created (and waited on) by this run.
    pub granted: bool,
}

impl AccessOutcome {
    pub fn mutated(&self) -> bool {
        self.identity_enabled || self.granted
    }
}

/// Ensure `compute` has a usable identity holding read access to `store`.
///
/// Two independent idempotent sub-steps: enable the system identity iff
/// absent, then bind the secrets-reader role iff no binding exists. A new
/// grant is followed by one bounded propagation sleep through `clock`;
/// the provider emits no readiness signal, so this is a fixed wait, not a
/// poll. A pre-existing binding needs no wait.
pub async fn ensure_identity_and_access(
    provider: &dyn CloudProvider,
    clock: &dyn Clock,
    compute: &ManagedResource,
    store: &ManagedResource,
    propagation_delay: Duration,
) -> Result<AccessOutcome> {
    let (principal, identity_enabled) = match provider.get_identity(compute).await? {
        Some(principal) => {
            debug!(%principal, "System identity already enabled");
            (principal, false)
        }
        None => {
            let principal = provider.enable_identity(compute).await?;
            info!(%principal, resource = %compute.name, "Enabled system identity");
            (principal, true)
        }
    };

    if let Some(binding) = provider
        .find_role_binding(&principal, RoleKind::SecretsReader, store)
        .await?
    {
        debug!(binding = %binding.id, "Role binding already present");
        return Ok(AccessOutcome {
            principal,
            identity_enabled,
            granted: false,
        });
    }

    match provider
        .grant_role(&principal, RoleKind::SecretsReader, store)
        .await?
    {
        GrantOutcome::Created(binding) => {
            info!(
                binding = %binding.id,
                delay_secs = propagation_delay.as_secs(),
                "Granted secret read access; waiting for authorization propagation"
            );
            clock.sleep(propagation_delay).await;
            Ok(AccessOutcome {
                principal,
                identity_enabled,
                granted: true,
            })
        }
        GrantOutcome::AlreadyExists(binding) => {
            // The provider reports an existing binding as a conflict; for
            // this caller that is success, and already-propagated access
            // needs no wait.
            debug!(binding = %binding.id, "Grant conflicted with existing binding");
            Ok(AccessOutcome {
                principal,
                identity_enabled,
                granted: false,
            })
        }
    }
}
