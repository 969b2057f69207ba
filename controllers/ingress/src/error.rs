//! Controller-specific error types.
//!
//! This module defines error types specific to the Ingress Controller
//! that are not covered by upstream library errors.

use crate::controller::LifecycleState;
use resource_client::ClientError;
use thiserror::Error;

/// Errors that can occur in the Ingress Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Start called outside `NotStarted`
    #[error("Controller cannot be started: already {0}")]
    NotStartable(LifecycleState),

    /// Stop called outside `Running`
    #[error("Controller is not running (currently {0})")]
    NotRunning(LifecycleState),

    /// Health checked while the controller is not running
    #[error("Controller is not healthy: not running")]
    NotHealthy,

    /// An updater reported itself unhealthy
    #[error("{updater}: {message}")]
    UpdaterUnhealthy { updater: String, message: String },

    /// An updater failed to start
    #[error("Failed to start updater {updater}: {source:#}")]
    UpdaterStart {
        updater: String,
        #[source]
        source: anyhow::Error,
    },

    /// An updater failed to stop
    #[error("Failed to stop updater {updater}: {source:#}")]
    UpdaterStop {
        updater: String,
        #[source]
        source: anyhow::Error,
    },

    /// An updater rejected a routing table
    #[error("Updater {updater} failed to apply routing table: {source:#}")]
    UpdaterUpdate {
        updater: String,
        #[source]
        source: anyhow::Error,
    },

    /// Resource snapshot could not be fetched
    #[error("Resource fetch failed: {0}")]
    Client(#[from] ClientError),

    /// Kubernetes client setup error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Health server I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
