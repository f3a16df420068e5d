//! Phase-ordered convergence.
//!
//! Sequences the engine components into fixed phases, each re-checking its
//! precondition at call time. Phases run strictly sequentially: every
//! phase consumes the previous phase's output, and the provider API's rate
//! limits make concurrency low-value. On any fatal failure the run aborts
//! with the failing phase and the last completed one; nothing is rolled
//! back, and re-running the whole flow resumes safely.

use std::sync::Arc;

use tidegate_cloud::{
    Clock, CloudError, CloudProvider, ManagedResource, ResourceKind, RetryPolicy, with_retry,
};
use tracing::info;

use crate::certificate::{self, CertificateOutcome, CertificatePolicy, RenewalPrompt};
use crate::config::ConvergeConfig;
use crate::error::{ConvergeError, EngineError, Result};
use crate::identity;
use crate::listener::{self, ListenerOutcome};
use crate::locate::locate;
use crate::summary::{Outcome, Phase, PhaseReport, Summary};

/// Sequences the convergence phases against one provider.
pub struct Orchestrator {
    provider: Arc<dyn CloudProvider>,
    clock: Arc<dyn Clock>,
    prompt: Arc<dyn RenewalPrompt>,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        clock: Arc<dyn Clock>,
        prompt: Arc<dyn RenewalPrompt>,
    ) -> Self {
        Self {
            provider,
            clock,
            prompt,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run all phases in order against `config`'s scope.
    pub async fn run(&self, config: &ConvergeConfig) -> std::result::Result<Summary, ConvergeError> {
        let mut reports: Vec<PhaseReport> = Vec::new();
        let mut last_completed: Option<Phase> = None;

        let fail = |phase: Phase, last_completed: Option<Phase>, source: EngineError| {
            ConvergeError {
                phase,
                last_completed,
                source,
            }
        };

        // Validation runs even when every later phase turns out to be a
        // no-op: a converged scope with broken credentials is still an
        // error worth surfacing.
        let account = self
            .validate(config)
            .await
            .map_err(|e| fail(Phase::Validate, last_completed, e))?;
        reports.push(PhaseReport {
            phase: Phase::Validate,
            outcome: Outcome::Unchanged,
            detail: format!("authenticated as {account}"),
        });
        last_completed = Some(Phase::Validate);
        info!(phase = %Phase::Validate, "Phase complete");

        let gateway = self
            .locate_gateway(config)
            .await
            .map_err(|e| fail(Phase::LocateGateway, last_completed, e))?;
        reports.push(PhaseReport {
            phase: Phase::LocateGateway,
            outcome: Outcome::Unchanged,
            detail: format!("gateway {}", gateway.name),
        });
        last_completed = Some(Phase::LocateGateway);
        info!(phase = %Phase::LocateGateway, gateway = %gateway.name, "Phase complete");

        let (store, store_outcome) = self
            .ensure_secret_store(config)
            .await
            .map_err(|e| fail(Phase::SecretStore, last_completed, e))?;
        reports.push(PhaseReport {
            phase: Phase::SecretStore,
            outcome: store_outcome,
            detail: format!("secret store {}", store.name),
        });
        last_completed = Some(Phase::SecretStore);
        info!(phase = %Phase::SecretStore, store = %store.name, outcome = %store_outcome, "Phase complete");

        let policy = CertificatePolicy {
            force_rotate: config.force_rotate,
            renew_within_days: config.renew_within_days,
        };
        let (secret_ref, cert_outcome) = certificate::ensure_certificate(
            self.provider.as_ref(),
            self.clock.as_ref(),
            self.prompt.as_ref(),
            &store,
            &config.certificate_name,
            &config.domain,
            &policy,
        )
        .await
        .map_err(|e| fail(Phase::Certificate, last_completed, e))?;
        let expires = cert_outcome.expires_at().format("%Y-%m-%d");
        let (cert_report_outcome, cert_verb) = match &cert_outcome {
            CertificateOutcome::Created { .. } => (Outcome::Created, "issued"),
            CertificateOutcome::Reused { .. } => (Outcome::Unchanged, "valid"),
            CertificateOutcome::Rotated { .. } => (Outcome::Rotated, "rotated"),
        };
        reports.push(PhaseReport {
            phase: Phase::Certificate,
            outcome: cert_report_outcome,
            detail: format!("certificate {cert_verb} until {expires}"),
        });
        last_completed = Some(Phase::Certificate);
        info!(phase = %Phase::Certificate, secret = %secret_ref, outcome = %cert_report_outcome, "Phase complete");

        let access = identity::ensure_identity_and_access(
            self.provider.as_ref(),
            self.clock.as_ref(),
            &gateway,
            &store,
            config.propagation_delay,
        )
        .await
        .map_err(|e| fail(Phase::Access, last_completed, e))?;
        reports.push(PhaseReport {
            phase: Phase::Access,
            outcome: if access.mutated() {
                Outcome::Created
            } else {
                Outcome::Unchanged
            },
            detail: format!("secret read access for {}", access.principal),
        });
        last_completed = Some(Phase::Access);
        info!(phase = %Phase::Access, principal = %access.principal, "Phase complete");

        let (listener, listener_outcome) = listener::ensure_https_listener(
            self.provider.as_ref(),
            &gateway,
            config.frontend_port,
            &secret_ref,
            &config.domain,
        )
        .await
        .map_err(|e| fail(Phase::Listener, last_completed, e))?;
        reports.push(PhaseReport {
            phase: Phase::Listener,
            outcome: match listener_outcome {
                ListenerOutcome::Unchanged => Outcome::Unchanged,
                ListenerOutcome::Updated => Outcome::Updated,
                ListenerOutcome::Created => Outcome::Created,
            },
            detail: format!(
                "listener {} on port {}",
                listener.name, listener.frontend_port
            ),
        });
        info!(phase = %Phase::Listener, listener = %listener.name, "Phase complete");

        let changed = reports.iter().any(|r| r.outcome.mutated());
        Ok(Summary {
            scope: config.scope.name().to_string(),
            gateway: gateway.name,
            secret_store: store.name,
            secret_ref: secret_ref.to_string(),
            principal: access.principal.to_string(),
            listener: listener.name,
            reports,
            changed,
        })
    }

    async fn validate(&self, config: &ConvergeConfig) -> Result<String> {
        config.validate()?;
        let auth = self.provider.check_auth().await?;
        if !auth.authenticated {
            return Err(CloudError::AuthenticationFailed(
                auth.error
                    .unwrap_or_else(|| "provider reported no credentials".to_string()),
            )
            .into());
        }
        Ok(auth
            .account_info
            .unwrap_or_else(|| "unknown account".to_string()))
    }

    async fn locate_gateway(&self, config: &ConvergeConfig) -> Result<ManagedResource> {
        locate(
            self.provider.as_ref(),
            self.clock.as_ref(),
            &self.retry,
            &config.scope,
            ResourceKind::Gateway,
            config.gateway_name.as_deref(),
        )
        .await
    }

    /// Locate the secret store, creating it when the scope has none. The
    /// locator's disambiguation policy applies unchanged: several stores
    /// and no explicit name is an error, never a guess.
    async fn ensure_secret_store(
        &self,
        config: &ConvergeConfig,
    ) -> Result<(ManagedResource, Outcome)> {
        let provider = self.provider.as_ref();
        let clock = self.clock.as_ref();
        let scope = &config.scope;

        if let Some(name) = &config.secret_store_name {
            let found = with_retry(&self.retry, clock, || {
                provider.get_resource(scope, ResourceKind::SecretStore, name)
            })
            .await?;
            return match found {
                Some(store) => Ok((store, Outcome::Unchanged)),
                None => {
                    let store = provider.create_secret_store(scope, name).await?;
                    info!(store = %store.name, "Created secret store");
                    Ok((store, Outcome::Created))
                }
            };
        }

        let mut candidates = with_retry(&self.retry, clock, || {
            provider.find_resources(scope, ResourceKind::SecretStore)
        })
        .await?;
        match candidates.len() {
            0 => {
                let name = format!("{}-vault", scope.name());
                let store = provider.create_secret_store(scope, &name).await?;
                info!(store = %store.name, "Created secret store");
                Ok((store, Outcome::Created))
            }
            1 => Ok((candidates.remove(0), Outcome::Unchanged)),
            _ => Err(CloudError::Ambiguous {
                kind: ResourceKind::SecretStore,
                candidates: candidates.into_iter().map(|r| r.name).collect(),
            }
            .into()),
        }
    }
}
