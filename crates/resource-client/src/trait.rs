//! ResourceClient trait for mocking
//!
//! This trait abstracts cluster access so the controller can be driven by an
//! in-memory implementation in unit tests. `KubeResourceClient` is the
//! production implementation.

use crate::error::ClientError;
use crate::signal::ChangeSignal;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use std::sync::Arc;

/// Snapshot and watch access to Ingress and Service resources.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ResourceClient: Send + Sync {
    /// Returns every Ingress currently visible to the client.
    async fn get_ingresses(&self) -> Result<Vec<Arc<Ingress>>, ClientError>;

    /// Returns every Service currently visible to the client.
    async fn get_services(&self) -> Result<Vec<Arc<Service>>, ClientError>;

    /// Starts watching Ingresses. Each call creates an independent source.
    fn watch_ingresses(&self) -> ChangeSignal;

    /// Starts watching Services. Each call creates an independent source.
    fn watch_services(&self) -> ChangeSignal;
}
