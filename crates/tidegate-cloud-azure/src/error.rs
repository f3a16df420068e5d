//! Azure provider error types

use thiserror::Error;
use tidegate_cloud::CloudError;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("az CLI not found. Please install: https://aka.ms/azure-cli")]
    AzNotFound,

    #[error("az authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("az command failed: {0}")]
    CommandFailed(String),

    #[error("az request throttled: {0}")]
    Throttled(String),

    #[error("resource creation conflict: {0}")]
    Conflict(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AzureError>;

impl From<AzureError> for CloudError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::AzNotFound => CloudError::CommandFailed(err.to_string()),
            AzureError::AuthenticationFailed(msg) => CloudError::AuthenticationFailed(msg),
            AzureError::Throttled(msg) => CloudError::Transient(msg),
            AzureError::Conflict(msg) => CloudError::AlreadyExists(msg),
            AzureError::CommandFailed(msg) => CloudError::CommandFailed(msg),
            AzureError::JsonError(e) => CloudError::Json(e),
            AzureError::IoError(e) => CloudError::Io(e),
        }
    }
}
