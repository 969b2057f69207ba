//! Updater capability.
//!
//! An updater turns a [`RoutingTable`] into live load-balancer
//! configuration: rendering a config file, calling a control API, or
//! anything else. The controller starts updaters in registration order,
//! stops them in reverse, and hands every reconciliation pass's table to
//! each of them.

use crate::routing::RoutingTable;

/// A pluggable routing table consumer.
///
/// `update` is called with successive full tables and must not keep
/// references into a table after returning.
#[async_trait::async_trait]
pub trait Updater: Send + Sync {
    /// Stable identity used in logs and health errors.
    fn name(&self) -> &str;

    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    async fn update(&self, table: &RoutingTable) -> anyhow::Result<()>;

    async fn health(&self) -> anyhow::Result<()>;
}
