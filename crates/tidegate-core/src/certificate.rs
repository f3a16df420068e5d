//! Certificate lifecycle management.
//!
//! Issues self-signed certificates, seals the private key under a
//! freshly generated single-use export password, and stores the result as
//! versioned secrets. Dependents hold a versionless [`SecretReference`],
//! so rotation writes a new version and requires no consumer update.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rcgen::{CertificateParams, DnType, KeyPair};
use serde::{Deserialize, Serialize};
use tidegate_cloud::{Clock, CloudProvider, ManagedResource, SecretReference};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// Validity period for newly issued certificates.
const CERT_VALIDITY_DAYS: i64 = 365;

/// Sealed key/certificate pair as stored in one secret version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateBundle {
    pub common_name: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cert_pem: String,
    /// Private key PEM, AES-256-GCM sealed under `export_password`.
    pub key_sealed: String,
    pub key_nonce: String,
    /// Base64-encoded single-use export password.
    pub export_password: String,
}

impl CertificateBundle {
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| EngineError::CertificateGeneration(format!("bundle encoding: {e}")))
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| EngineError::CertificateDecode(e.to_string()))
    }

    /// Unseal the private key PEM with the bundled export password.
    pub fn open_key(&self) -> Result<String> {
        let password = BASE64
            .decode(&self.export_password)
            .map_err(|e| EngineError::CertificateDecode(format!("export password: {e}")))?;
        let nonce = BASE64
            .decode(&self.key_nonce)
            .map_err(|e| EngineError::CertificateDecode(format!("nonce: {e}")))?;
        let sealed = BASE64
            .decode(&self.key_sealed)
            .map_err(|e| EngineError::CertificateDecode(format!("sealed key: {e}")))?;
        if password.len() != 32 || nonce.len() != 12 {
            return Err(EngineError::CertificateDecode(
                "malformed sealing parameters".to_string(),
            ));
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&password));
        let plain = cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| EngineError::CertificateDecode("key unsealing failed".to_string()))?;
        String::from_utf8(plain)
            .map_err(|e| EngineError::CertificateDecode(format!("key PEM: {e}")))
    }
}

/// How `ensure_certificate` converged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateOutcome {
    Created { expires_at: DateTime<Utc> },
    Reused { expires_at: DateTime<Utc> },
    Rotated { expires_at: DateTime<Utc> },
}

impl CertificateOutcome {
    pub fn expires_at(&self) -> DateTime<Utc> {
        match self {
            CertificateOutcome::Created { expires_at }
            | CertificateOutcome::Reused { expires_at }
            | CertificateOutcome::Rotated { expires_at } => *expires_at,
        }
    }
}

/// Confirmation hook for interactive renewal decisions.
pub trait RenewalPrompt: Send + Sync {
    fn confirm_renewal(&self, secret_name: &str, expires_at: DateTime<Utc>) -> bool;
}

/// Fixed answer; used for non-interactive runs and tests.
pub struct StaticPrompt(pub bool);

impl RenewalPrompt for StaticPrompt {
    fn confirm_renewal(&self, _secret_name: &str, _expires_at: DateTime<Utc>) -> bool {
        self.0
    }
}

/// Rotation decision parameters.
#[derive(Debug, Clone)]
pub struct CertificatePolicy {
    pub force_rotate: bool,
    /// Remaining validity below which the prompt is consulted.
    pub renew_within_days: i64,
}

/// Ensure a certificate for `common_name` exists under `secret_name` in
/// `store`, rotating per `policy`. Returns the versionless reference,
/// identical before and after any rotation.
pub async fn ensure_certificate(
    provider: &dyn CloudProvider,
    clock: &dyn Clock,
    prompt: &dyn RenewalPrompt,
    store: &ManagedResource,
    secret_name: &str,
    common_name: &str,
    policy: &CertificatePolicy,
) -> Result<(SecretReference, CertificateOutcome)> {
    let reference = SecretReference::new(&store.name, secret_name);

    let existing = match provider.get_latest_secret(store, secret_name).await? {
        Some(version) => Some(CertificateBundle::from_payload(&version.payload)?),
        None => None,
    };

    let Some(current) = existing else {
        let bundle = issue_and_store(provider, clock, store, secret_name, common_name).await?;
        info!(secret = %reference, expires = %bundle.expires_at, "Issued new certificate");
        return Ok((
            reference,
            CertificateOutcome::Created {
                expires_at: bundle.expires_at,
            },
        ));
    };

    if policy.force_rotate {
        let bundle = issue_and_store(provider, clock, store, secret_name, common_name).await?;
        info!(secret = %reference, expires = %bundle.expires_at, "Rotated certificate (forced)");
        return Ok((
            reference,
            CertificateOutcome::Rotated {
                expires_at: bundle.expires_at,
            },
        ));
    }

    let remaining = current.expires_at - clock.now();
    if remaining.num_days() < policy.renew_within_days {
        if prompt.confirm_renewal(secret_name, current.expires_at) {
            let bundle = issue_and_store(provider, clock, store, secret_name, common_name).await?;
            info!(secret = %reference, expires = %bundle.expires_at, "Rotated near-expiry certificate");
            return Ok((
                reference,
                CertificateOutcome::Rotated {
                    expires_at: bundle.expires_at,
                },
            ));
        }
        warn!(
            secret = %reference,
            expires = %current.expires_at,
            "Certificate is near expiry; renewal declined, keeping current version"
        );
        return Ok((
            reference,
            CertificateOutcome::Reused {
                expires_at: current.expires_at,
            },
        ));
    }

    debug!(secret = %reference, expires = %current.expires_at, "Existing certificate is valid");
    Ok((
        reference,
        CertificateOutcome::Reused {
            expires_at: current.expires_at,
        },
    ))
}

async fn issue_and_store(
    provider: &dyn CloudProvider,
    clock: &dyn Clock,
    store: &ManagedResource,
    secret_name: &str,
    common_name: &str,
) -> Result<CertificateBundle> {
    let bundle = issue(common_name, clock.now())?;
    // The store's versioned write is atomic; a failed upload leaves prior
    // versions untouched and surfaces as fatal.
    provider
        .put_secret(store, secret_name, &bundle.to_payload()?)
        .await?;
    Ok(bundle)
}

/// Generate a self-signed certificate and seal its private key.
fn issue(common_name: &str, now: DateTime<Utc>) -> Result<CertificateBundle> {
    let generation = |e: &dyn std::fmt::Display| EngineError::CertificateGeneration(e.to_string());

    let key_pair = KeyPair::generate().map_err(|e| generation(&e))?;

    let mut params =
        CertificateParams::new(vec![common_name.to_string()]).map_err(|e| generation(&e))?;
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    let issued_at = now;
    let expires_at = now + chrono::Duration::days(CERT_VALIDITY_DAYS);
    params.not_before = time::OffsetDateTime::from_unix_timestamp(issued_at.timestamp())
        .map_err(|e| generation(&e))?;
    params.not_after = time::OffsetDateTime::from_unix_timestamp(expires_at.timestamp())
        .map_err(|e| generation(&e))?;

    let cert = params.self_signed(&key_pair).map_err(|e| generation(&e))?;

    let mut password = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut password);
    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&password));
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            key_pair.serialize_pem().as_bytes(),
        )
        .map_err(|_| EngineError::CertificateGeneration("key sealing failed".to_string()))?;

    Ok(CertificateBundle {
        common_name: common_name.to_string(),
        issued_at,
        expires_at,
        cert_pem: cert.pem(),
        key_sealed: BASE64.encode(&sealed),
        key_nonce: BASE64.encode(nonce),
        export_password: BASE64.encode(password),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_seals_a_recoverable_key() {
        let now = Utc::now();
        let bundle = issue("shop.example.com", now).unwrap();

        assert_eq!(bundle.common_name, "shop.example.com");
        assert_eq!(bundle.expires_at, now + chrono::Duration::days(365));
        assert!(bundle.cert_pem.contains("BEGIN CERTIFICATE"));

        let key_pem = bundle.open_key().unwrap();
        assert!(key_pem.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn test_tampered_bundle_fails_to_unseal() {
        let mut bundle = issue("shop.example.com", Utc::now()).unwrap();
        // Swap in a password that never sealed this key.
        bundle.export_password = BASE64.encode([0u8; 32]);
        assert!(matches!(
            bundle.open_key(),
            Err(EngineError::CertificateDecode(_))
        ));
    }
}
