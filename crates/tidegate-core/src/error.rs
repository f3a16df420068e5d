//! Engine error types and phase attribution.

use crate::summary::Phase;
use thiserror::Error;
use tidegate_cloud::CloudError;

/// Convergence engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),

    #[error("stored certificate bundle is unreadable: {0}")]
    CertificateDecode(String),

    #[error("gateway left without a listener on port {port}: {source}")]
    DegradedListener {
        port: u16,
        #[source]
        source: CloudError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A convergence run failure, attributed to the phase that raised it so a
/// re-invocation can be judged safe to resume.
#[derive(Error, Debug)]
#[error("phase '{phase}' failed (last completed phase: {})", completed_label(.last_completed))]
pub struct ConvergeError {
    pub phase: Phase,
    pub last_completed: Option<Phase>,
    #[source]
    pub source: EngineError,
}

fn completed_label(last_completed: &Option<Phase>) -> String {
    match last_completed {
        Some(phase) => phase.to_string(),
        None => "none".to_string(),
    }
}
