//! Convergence run configuration.
//!
//! All environment-derived inputs arrive here as one validated struct
//! passed by value into the orchestrator. Optional fields select the
//! locator's auto-detect path; explicit values override it.

use crate::error::{EngineError, Result};
use std::time::Duration;
use tidegate_cloud::Scope;

pub const DEFAULT_FRONTEND_PORT: u16 = 443;
pub const DEFAULT_CERTIFICATE_NAME: &str = "gateway-tls";
/// Remaining validity below which an operator is asked to renew.
pub const DEFAULT_RENEW_WITHIN_DAYS: i64 = 30;
/// Authorization changes propagate without a readiness signal; this is the
/// bounded wait applied after a new grant.
pub const DEFAULT_PROPAGATION_DELAY: Duration = Duration::from_secs(60);

/// Configuration for one convergence run.
#[derive(Debug, Clone)]
pub struct ConvergeConfig {
    /// Resource-group scope every phase operates in.
    pub scope: Scope,
    /// Gateway name; `None` auto-detects a single gateway in scope.
    pub gateway_name: Option<String>,
    /// Secret store name; `None` auto-detects or creates `<scope>-vault`.
    pub secret_store_name: Option<String>,
    /// External domain the listener serves; also the certificate CN and the
    /// backend host header.
    pub domain: String,
    pub certificate_name: String,
    pub frontend_port: u16,
    /// Rotate the certificate even when the current one is still valid.
    pub force_rotate: bool,
    pub renew_within_days: i64,
    pub propagation_delay: Duration,
}

impl ConvergeConfig {
    pub fn new(scope: Scope, domain: impl Into<String>) -> Self {
        Self {
            scope,
            gateway_name: None,
            secret_store_name: None,
            domain: domain.into(),
            certificate_name: DEFAULT_CERTIFICATE_NAME.to_string(),
            frontend_port: DEFAULT_FRONTEND_PORT,
            force_rotate: false,
            renew_within_days: DEFAULT_RENEW_WITHIN_DAYS,
            propagation_delay: DEFAULT_PROPAGATION_DELAY,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scope.name().trim().is_empty() {
            return Err(EngineError::Config("scope must not be empty".to_string()));
        }
        if self.domain.trim().is_empty() {
            return Err(EngineError::Config("domain must not be empty".to_string()));
        }
        if self.domain.contains('/') || self.domain.contains("://") {
            return Err(EngineError::Config(format!(
                "domain must be a bare host name, got '{}'",
                self.domain
            )));
        }
        if self.frontend_port == 0 {
            return Err(EngineError::Config(
                "frontend port must be non-zero".to_string(),
            ));
        }
        if self.certificate_name.trim().is_empty() {
            return Err(EngineError::Config(
                "certificate name must not be empty".to_string(),
            ));
        }
        if self.renew_within_days < 0 {
            return Err(EngineError::Config(
                "renewal window must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConvergeConfig {
        ConvergeConfig::new(Scope::new("prod-rg"), "shop.example.com")
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_rejects_url_as_domain() {
        let mut config = base();
        config.domain = "https://shop.example.com".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bare host name"));
    }

    #[test]
    fn test_rejects_empty_scope() {
        let mut config = base();
        config.scope = Scope::new("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_port() {
        let mut config = base();
        config.frontend_port = 0;
        assert!(config.validate().is_err());
    }
}
