//! Main controller implementation.
//!
//! The `Controller` owns the lifecycle of the updaters and of the
//! background reconciliation loop:
//! - `start` starts every updater in order (rolling back on failure),
//!   subscribes to Ingress/Service changes, runs one initial pass and
//!   spawns the loop
//! - `stop` ends the loop and stops the updaters in reverse order
//! - `health` combines the lifecycle state with every updater's health

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::{Reconciler, UpdateFailure};
use crate::translator::DefaultPolicy;
use crate::updater::Updater;
use resource_client::ResourceClient;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Controller lifecycle. Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleState {
    /// Constructed, or a start attempt failed
    NotStarted,
    /// Updaters started and the loop is reconciling
    Running,
    /// Terminal; a stopped controller cannot be restarted
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            LifecycleState::NotStarted => "not started",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(state)
    }
}

/// Handles owned while the loop runs
#[derive(Default)]
struct Lifecycle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Ingress controller.
///
/// `start` and `stop` serialize on an internal lock; `state` and `health`
/// never wait for them.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    state: watch::Sender<LifecycleState>,
    lifecycle: Mutex<Lifecycle>,
}

impl Controller {
    /// Creates a controller. Updater order is start order.
    pub fn new(
        client: Arc<dyn ResourceClient>,
        updaters: Vec<Arc<dyn Updater>>,
        policy: DefaultPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            reconciler: Arc::new(Reconciler::new(client, updaters, policy, metrics)),
            state: watch::Sender::new(LifecycleState::NotStarted),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Current lifecycle state. Never waits on `start` or `stop`.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Most recent failed reconciliation pass, if the latest one failed
    pub fn last_update_error(&self) -> Option<UpdateFailure> {
        self.reconciler.last_update_error()
    }

    /// Starts the updaters and the reconciliation loop.
    ///
    /// Returns once the initial reconciliation pass has completed. A failed
    /// initial pass is recorded but does not fail `start`. If an updater
    /// fails to start, the ones already started are stopped again and the
    /// controller stays `NotStarted`.
    pub async fn start(&self) -> Result<(), ControllerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let state = self.state();
        if state != LifecycleState::NotStarted {
            return Err(ControllerError::NotStartable(state));
        }

        let updaters = self.reconciler.updaters();
        info!("Starting ingress controller with {} updaters", updaters.len());
        start_updaters(updaters).await?;

        // Subscribe before the initial pass so no change is missed
        let client = self.reconciler.client();
        let ingresses = client.watch_ingresses();
        let services = client.watch_services();

        self.reconciler.reconcile_and_record().await;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(
            Arc::clone(&self.reconciler).run(ingresses, services, stop_rx),
        );
        lifecycle.stop = Some(stop_tx);
        lifecycle.task = Some(task);

        self.state.send_replace(LifecycleState::Running);
        info!("Ingress controller started");
        Ok(())
    }

    /// Stops the reconciliation loop, then every updater in reverse order.
    ///
    /// All updaters are stopped even if some fail; the first failure is
    /// returned. The controller is `Stopped` afterwards either way.
    pub async fn stop(&self) -> Result<(), ControllerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let state = self.state();
        if state != LifecycleState::Running {
            return Err(ControllerError::NotRunning(state));
        }

        info!("Stopping ingress controller");
        if let Some(stop) = lifecycle.stop.take() {
            // The loop may already be gone if it panicked
            let _ = stop.send(());
        }
        if let Some(task) = lifecycle.task.take() {
            if let Err(e) = task.await {
                error!("Reconciliation loop terminated abnormally: {}", e);
            }
        }

        let result = stop_updaters(self.reconciler.updaters()).await;
        self.state.send_replace(LifecycleState::Stopped);
        info!("Ingress controller stopped");
        result
    }

    /// Succeeds only while running with every updater healthy.
    pub async fn health(&self) -> Result<(), ControllerError> {
        if self.state() != LifecycleState::Running {
            return Err(ControllerError::NotHealthy);
        }

        for updater in self.reconciler.updaters() {
            updater
                .health()
                .await
                .map_err(|e| ControllerError::UpdaterUnhealthy {
                    updater: updater.name().to_string(),
                    message: format!("{:#}", e),
                })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state())
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Starts updaters in order, rolling back the started ones on failure.
async fn start_updaters(updaters: &[Arc<dyn Updater>]) -> Result<(), ControllerError> {
    for (index, updater) in updaters.iter().enumerate() {
        info!("Starting updater {}", updater.name());
        if let Err(source) = updater.start().await {
            error!("Failed to start updater {}: {:#}", updater.name(), source);
            rollback_started(&updaters[..index]).await;
            return Err(ControllerError::UpdaterStart {
                updater: updater.name().to_string(),
                source,
            });
        }
    }
    Ok(())
}

/// Best-effort stop of already started updaters, last started first.
///
/// Errors are logged and swallowed.
pub async fn rollback_started(started: &[Arc<dyn Updater>]) {
    for updater in started.iter().rev() {
        info!("Rolling back updater {}", updater.name());
        if let Err(e) = updater.stop().await {
            warn!("Failed to stop updater {} during rollback: {:#}", updater.name(), e);
        }
    }
}

/// Stops every updater in reverse order and returns the first failure.
async fn stop_updaters(updaters: &[Arc<dyn Updater>]) -> Result<(), ControllerError> {
    let mut first_error = None;
    for updater in updaters.iter().rev() {
        info!("Stopping updater {}", updater.name());
        if let Err(source) = updater.stop().await {
            error!("Failed to stop updater {}: {:#}", updater.name(), source);
            first_error.get_or_insert(ControllerError::UpdaterStop {
                updater: updater.name().to_string(),
                source,
            });
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;
