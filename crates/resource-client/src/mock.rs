//! Mock ResourceClient for unit testing
//!
//! Stores Ingresses and Services in memory. Tests can swap the snapshots,
//! inject fetch failures, and fire change notifications on the signals
//! handed out by `watch_ingresses` / `watch_services`.

use crate::error::ClientError;
use crate::resource_trait::ResourceClient;
use crate::signal::{change_channel, ChangeNotifier, ChangeSignal};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use std::sync::{Arc, Mutex};

/// Mock ResourceClient for testing
#[derive(Clone, Default)]
pub struct MockResourceClient {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    ingresses: Vec<Arc<Ingress>>,
    services: Vec<Arc<Service>>,
    ingress_error: Option<String>,
    service_error: Option<String>,
    ingress_fetches: usize,
    service_fetches: usize,
    ingress_watches: Vec<ChangeNotifier>,
    service_watches: Vec<ChangeNotifier>,
}

impl MockResourceClient {
    /// Create a new mock client with empty snapshots
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the Ingress snapshot
    pub fn set_ingresses(&self, ingresses: Vec<Ingress>) {
        self.state.lock().unwrap().ingresses = ingresses.into_iter().map(Arc::new).collect();
    }

    /// Replace the Service snapshot
    pub fn set_services(&self, services: Vec<Service>) {
        self.state.lock().unwrap().services = services.into_iter().map(Arc::new).collect();
    }

    /// Make `get_ingresses` fail with `message`, or succeed again with `None`
    pub fn fail_ingress_fetch(&self, message: Option<&str>) {
        self.state.lock().unwrap().ingress_error = message.map(str::to_string);
    }

    /// Make `get_services` fail with `message`, or succeed again with `None`
    pub fn fail_service_fetch(&self, message: Option<&str>) {
        self.state.lock().unwrap().service_error = message.map(str::to_string);
    }

    /// Number of `get_ingresses` calls so far
    pub fn ingress_fetches(&self) -> usize {
        self.state.lock().unwrap().ingress_fetches
    }

    /// Number of `get_services` calls so far
    pub fn service_fetches(&self) -> usize {
        self.state.lock().unwrap().service_fetches
    }

    /// Number of `watch_ingresses` calls so far
    pub fn ingress_watch_count(&self) -> usize {
        self.state.lock().unwrap().ingress_watches.len()
    }

    /// Number of `watch_services` calls so far
    pub fn service_watch_count(&self) -> usize {
        self.state.lock().unwrap().service_watches.len()
    }

    /// Fire an Ingress change on every live watch.
    ///
    /// Returns `false` if no watch is listening.
    pub fn notify_ingresses(&self) -> bool {
        let state = self.state.lock().unwrap();
        notify_all(&state.ingress_watches)
    }

    /// Fire a Service change on every live watch.
    ///
    /// Returns `false` if no watch is listening.
    pub fn notify_services(&self) -> bool {
        let state = self.state.lock().unwrap();
        notify_all(&state.service_watches)
    }

    /// Drop every Ingress notifier so the watches report a closed source
    pub fn close_ingress_watches(&self) {
        self.state.lock().unwrap().ingress_watches.clear();
    }
}

fn notify_all(notifiers: &[ChangeNotifier]) -> bool {
    notifiers
        .iter()
        .fold(false, |delivered, notifier| notifier.notify() || delivered)
}

#[async_trait::async_trait]
impl ResourceClient for MockResourceClient {
    async fn get_ingresses(&self) -> Result<Vec<Arc<Ingress>>, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.ingress_fetches += 1;
        match &state.ingress_error {
            Some(message) => Err(ClientError::Unavailable(message.clone())),
            None => Ok(state.ingresses.clone()),
        }
    }

    async fn get_services(&self) -> Result<Vec<Arc<Service>>, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.service_fetches += 1;
        match &state.service_error {
            Some(message) => Err(ClientError::Unavailable(message.clone())),
            None => Ok(state.services.clone()),
        }
    }

    fn watch_ingresses(&self) -> ChangeSignal {
        let (notifier, signal) = change_channel();
        self.state.lock().unwrap().ingress_watches.push(notifier);
        signal
    }

    fn watch_services(&self) -> ChangeSignal {
        let (notifier, signal) = change_channel();
        self.state.lock().unwrap().service_watches.push(notifier);
        signal
    }
}
