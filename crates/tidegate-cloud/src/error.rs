//! Cloud provider error types

use crate::resource::ResourceKind;
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("multiple {kind} candidates in scope, specify one explicitly: {}", .candidates.join(", "))]
    Ambiguous {
        kind: ResourceKind,
        candidates: Vec<String>,
    },

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("transient provider fault: {0}")]
    Transient(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("provider API error: {0}")]
    Api(String),

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether a bounded retry may help.
    pub fn is_transient(&self) -> bool {
        matches!(self, CloudError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
