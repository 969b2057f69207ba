//! Cluster Resource Client
//!
//! Point-in-time snapshots and change notifications for the two resource
//! kinds the ingress controller consumes: `networking/v1` Ingresses and
//! `core/v1` Services.
//!
//! # Example
//!
//! ```no_run
//! use resource_client::{KubeResourceClient, ResourceClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let resources = KubeResourceClient::new(client, None);
//!
//! // Watch first, then snapshot: nothing that changes after the
//! // snapshot is missed.
//! let mut ingress_changes = resources.watch_ingresses();
//! let ingresses = resources.get_ingresses().await?;
//! println!("{} ingresses", ingresses.len());
//!
//! while ingress_changes.changed().await {
//!     let ingresses = resources.get_ingresses().await?;
//!     println!("{} ingresses", ingresses.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Change signals carry no payload and coalesce; see [`signal`].

pub mod client;
pub mod error;
pub mod signal;
#[path = "trait.rs"]
pub mod resource_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeResourceClient;
pub use error::ClientError;
pub use resource_trait::ResourceClient;
pub use signal::{change_channel, ChangeNotifier, ChangeSignal};
#[cfg(feature = "test-util")]
pub use mock::MockResourceClient;

pub use k8s_openapi::api::core::v1::Service;
pub use k8s_openapi::api::networking::v1::Ingress;
