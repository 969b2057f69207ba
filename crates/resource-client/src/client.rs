//! Kubernetes-backed resource client.
//!
//! Snapshots are plain `list` calls. Watches run a `kube_runtime::watcher`
//! stream per call in a background task and turn every observed change into
//! an opaque notification.

use crate::error::ClientError;
use crate::resource_trait::ResourceClient;
use crate::signal::{change_channel, ChangeSignal};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::ListParams;
use kube::{Api, Client, Resource};
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resource client backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
    namespace: Option<String>,
}

impl KubeResourceClient {
    /// Creates a client scoped to `namespace`, or to all namespaces when `None`.
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match self.namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

impl std::fmt::Debug for KubeResourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get_ingresses(&self) -> Result<Vec<Arc<Ingress>>, ClientError> {
        list_all(self.api::<Ingress>(), "Ingress").await
    }

    async fn get_services(&self) -> Result<Vec<Arc<Service>>, ClientError> {
        list_all(self.api::<Service>(), "Service").await
    }

    fn watch_ingresses(&self) -> ChangeSignal {
        spawn_watch(self.api::<Ingress>(), "Ingress")
    }

    fn watch_services(&self) -> ChangeSignal {
        spawn_watch(self.api::<Service>(), "Service")
    }
}

async fn list_all<K>(api: Api<K>, kind: &str) -> Result<Vec<Arc<K>>, ClientError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let list = api.list(&ListParams::default()).await?;
    debug!("Fetched {} {} resources", list.items.len(), kind);
    Ok(list.items.into_iter().map(Arc::new).collect())
}

/// Spawns a watch task for `api`. The task ends when the returned signal is dropped.
fn spawn_watch<K>(api: Api<K>, kind: &'static str) -> ChangeSignal
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let (notifier, signal) = change_channel();

    let task = tokio::spawn(async move {
        info!("Starting {} watcher", kind);

        // Stream errors are retried with backoff; the watch never gives up on its own.
        let mut stream = Box::pin(watcher(api, watcher::Config::default()).default_backoff());

        while let Some(event) = stream.next().await {
            let changed = match event {
                Ok(watcher::Event::Apply(_) | watcher::Event::Delete(_)) => true,
                Ok(watcher::Event::InitDone) => {
                    debug!("{} watcher initialization complete", kind);
                    true
                }
                Ok(watcher::Event::Init | watcher::Event::InitApply(_)) => false,
                Err(e) => {
                    warn!("{} watch stream error: {}", kind, e);
                    false
                }
            };

            if changed && !notifier.notify() {
                debug!("{} change signal dropped, stopping watcher", kind);
                break;
            }
        }

        info!("{} watcher stopped", kind);
    });

    signal.with_task(task.abort_handle())
}
