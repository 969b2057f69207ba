//! Resource client errors

use thiserror::Error;

/// Errors that can occur when fetching cluster resources
#[derive(Debug, Error)]
pub enum ClientError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The resource source could not serve the request
    #[error("Resource source unavailable: {0}")]
    Unavailable(String),
}
