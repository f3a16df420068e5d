//! Tidegate Cloud Infrastructure
//!
//! Provider abstraction for tidegate: the resource and gateway data model,
//! the [`CloudProvider`] trait the convergence engine drives, bounded retry
//! for transient faults, and an injectable clock.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  tidegate CLI                    │
//! │               (tide up/status)                   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               tidegate-core                      │
//! │     locate → certificate → access → listener     │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               tidegate-cloud                     │
//! │  trait CloudProvider { ... }                     │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │     azure     │ │    memory     │
//! │   provider    │ │  (tests)      │
//! └───────────────┘ └───────────────┘
//! ```

pub mod clock;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod provider;
pub mod resource;
pub mod retry;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CloudError, Result};
pub use gateway::{
    BackendSettings, FrontendPort, GatewayState, ListenerConfig, Protocol, RoutingRule,
};
pub use memory::MemoryProvider;
pub use provider::{AuthStatus, CloudProvider};
pub use resource::{
    GrantOutcome, ManagedResource, PrincipalId, ProvisioningState, ResourceKind, RoleBinding,
    RoleKind, Scope, SecretReference, SecretVersion,
};
pub use retry::{RetryPolicy, with_retry};
