//! Observed gateway configuration model.

use crate::resource::SecretReference;
use serde::{Deserialize, Serialize};

/// Listener / backend transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Http,
    Https,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// A named frontend port binding on the gateway.
///
/// Ports are a scarce, exclusive resource: one binding per port number, and
/// a stale binding blocks a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendPort {
    pub name: String,
    pub port: u16,
}

impl FrontendPort {
    pub fn for_port(port: u16) -> Self {
        Self {
            name: format!("port-{port}"),
            port,
        }
    }
}

/// A gateway listener: the bound combination of frontend port, protocol,
/// certificate reference and host name that accepts inbound connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub name: String,
    pub frontend_port: u16,
    pub protocol: Protocol,
    /// Bound certificate, always a versionless reference. Pinning a version
    /// here would defeat zero-downtime rotation.
    pub certificate: Option<SecretReference>,
    pub host_name: Option<String>,
}

impl ListenerConfig {
    pub fn is_https(&self) -> bool {
        self.protocol == Protocol::Https
    }
}

/// A routing rule binding a listener to a backend target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub name: String,
    pub listener: String,
    pub backend: String,
}

/// Backend transport settings behind the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub name: String,
    pub protocol: Protocol,
    /// Host header forwarded to the backend. Must equal the externally used
    /// domain or host-bound redirect flows break downstream.
    pub host_header: Option<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            name: "default-backend".to_string(),
            protocol: Protocol::Http,
            host_header: None,
        }
    }
}

/// Snapshot of a gateway's listener-facing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GatewayState {
    pub listeners: Vec<ListenerConfig>,
    pub frontend_ports: Vec<FrontendPort>,
    pub routing_rules: Vec<RoutingRule>,
    pub backend: BackendSettings,
}

impl GatewayState {
    pub fn listener_on_port(&self, port: u16) -> Option<&ListenerConfig> {
        self.listeners.iter().find(|l| l.frontend_port == port)
    }

    pub fn frontend_port(&self, port: u16) -> Option<&FrontendPort> {
        self.frontend_ports.iter().find(|p| p.port == port)
    }

    pub fn rule_for_listener(&self, listener: &str) -> Option<&RoutingRule> {
        self.routing_rules.iter().find(|r| r.listener == listener)
    }
}
