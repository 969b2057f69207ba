//! Ingress Controller
//!
//! Watches `networking/v1` Ingresses and `core/v1` Services, translates them
//! into a [`RoutingTable`](routing::RoutingTable) and hands every table to a
//! set of pluggable [`Updater`](updater::Updater)s that configure the load
//! balancer.
//!
//! - [`controller`]: lifecycle (start/stop/health)
//! - [`reconciler`]: the level-triggered reconciliation loop
//! - [`translator`]: pure Ingress/Service to routing table mapping
//! - [`updaters`]: updaters shipped with the binary

pub mod config;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod reconciler;
pub mod routing;
pub mod server;
pub mod translator;
pub mod updater;
pub mod updaters;

#[cfg(test)]
pub mod test_utils;

pub use controller::{Controller, LifecycleState};
pub use error::ControllerError;
pub use routing::{RoutingEntry, RoutingTable};
pub use updater::Updater;
