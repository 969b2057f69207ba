//! Level-triggered reconciliation.
//!
//! Every pass fetches the full Ingress and Service snapshots, translates
//! them and hands the resulting table to every updater. Change signals only
//! say "something changed", so bursts collapse into a single pass.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::translator::{translate, DefaultPolicy};
use crate::updater::Updater;
use chrono::{DateTime, Utc};
use resource_client::{ChangeSignal, ResourceClient};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// The most recent failed pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFailure {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Runs reconciliation passes against a fixed set of updaters.
pub struct Reconciler {
    client: Arc<dyn ResourceClient>,
    updaters: Vec<Arc<dyn Updater>>,
    policy: DefaultPolicy,
    metrics: Metrics,
    last_update_error: Mutex<Option<UpdateFailure>>,
}

impl Reconciler {
    /// Creates a reconciler. Updaters are called in the given order on every pass.
    pub fn new(
        client: Arc<dyn ResourceClient>,
        updaters: Vec<Arc<dyn Updater>>,
        policy: DefaultPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            updaters,
            policy,
            metrics,
            last_update_error: Mutex::new(None),
        }
    }

    /// Updaters in registration order
    pub fn updaters(&self) -> &[Arc<dyn Updater>] {
        &self.updaters
    }

    /// Source of the Ingress/Service snapshots and change signals
    pub fn client(&self) -> &Arc<dyn ResourceClient> {
        &self.client
    }

    /// Error of the latest pass, `None` once a pass succeeds
    pub fn last_update_error(&self) -> Option<UpdateFailure> {
        self.last_error().clone()
    }

    fn last_error(&self) -> MutexGuard<'_, Option<UpdateFailure>> {
        self.last_update_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Performs one pass and returns the number of routing entries.
    ///
    /// A fetch failure aborts the pass before any updater is called. An
    /// updater failure does not stop the remaining updaters; the first one
    /// is returned.
    pub async fn reconcile(&self) -> Result<usize, ControllerError> {
        let ingresses = self.client.get_ingresses().await?;
        let services = self.client.get_services().await?;

        let table = translate(&ingresses, &services, &self.policy);
        self.metrics.set_routing_entries(table.len());
        debug!(
            "Translated {} ingresses and {} services into {} routing entries",
            ingresses.len(),
            services.len(),
            table.len()
        );

        let mut first_error = None;
        for updater in &self.updaters {
            if let Err(source) = updater.update(&table).await {
                warn!("Updater {} failed to apply routing table: {:#}", updater.name(), source);
                self.metrics.record_update_failure(updater.name());
                first_error.get_or_insert(ControllerError::UpdaterUpdate {
                    updater: updater.name().to_string(),
                    source,
                });
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(table.len()),
        }
    }

    /// Runs one pass and records its outcome in metrics and
    /// [`last_update_error`](Self::last_update_error).
    pub async fn reconcile_and_record(&self) {
        match self.reconcile().await {
            Ok(entries) => {
                self.metrics.record_pass(true);
                *self.last_error() = None;
                info!("Routing table with {} entries applied", entries);
            }
            Err(e) => {
                self.metrics.record_pass(false);
                warn!("Reconciliation failed: {}", e);
                *self.last_error() = Some(UpdateFailure {
                    at: Utc::now(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Reconciles on every change until `stop` fires.
    ///
    /// A pass already in progress finishes before the stop is observed.
    pub async fn run(
        self: Arc<Self>,
        mut ingresses: ChangeSignal,
        mut services: ChangeSignal,
        mut stop: oneshot::Receiver<()>,
    ) {
        let mut ingresses_open = true;
        let mut services_open = true;

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                open = ingresses.changed(), if ingresses_open => {
                    if !open {
                        warn!("Ingress change source closed; no longer watching ingresses");
                        ingresses_open = false;
                        continue;
                    }
                    debug!("Ingress change received");
                }
                open = services.changed(), if services_open => {
                    if !open {
                        warn!("Service change source closed; no longer watching services");
                        services_open = false;
                        continue;
                    }
                    debug!("Service change received");
                }
            }

            // Both sources feed the same pass
            ingresses.take_pending();
            services.take_pending();

            self.reconcile_and_record().await;
        }

        debug!("Reconciliation loop stopped");
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.updaters.iter().map(|u| u.name()).collect();
        f.debug_struct("Reconciler")
            .field("updaters", &names)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use resource_client::MockResourceClient;

    struct Fixture {
        client: MockResourceClient,
        log: CallLog,
        first: Arc<FakeUpdater>,
        second: Arc<FakeUpdater>,
        metrics: Metrics,
        reconciler: Arc<Reconciler>,
    }

    fn fixture() -> Fixture {
        let client = MockResourceClient::new();
        client.set_ingresses(vec![default_ingress()]);
        client.set_services(vec![default_service()]);
        let log = CallLog::new();
        let first = Arc::new(FakeUpdater::new("updater1", &log));
        let second = Arc::new(FakeUpdater::new("updater2", &log));
        let metrics = metrics();
        let updaters: Vec<Arc<dyn Updater>> = vec![first.clone(), second.clone()];
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(client.clone()),
            updaters,
            default_policy(),
            metrics.clone(),
        ));
        Fixture {
            client,
            log,
            first,
            second,
            metrics,
            reconciler,
        }
    }

    #[tokio::test]
    async fn test_reconcile_sends_table_to_every_updater() {
        let f = fixture();

        let entries = f.reconciler.reconcile().await.unwrap();

        assert_eq!(entries, 1);
        assert_eq!(f.log.calls(), ["updater1.update", "updater2.update"]);
        let table = &f.first.tables()[0];
        assert_eq!(table.entries()[0].host, INGRESS_HOST);
        assert_eq!(f.second.tables(), f.first.tables());
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_updaters() {
        let f = fixture();
        f.client.fail_service_fetch(Some("apiserver down"));

        let err = f.reconciler.reconcile().await.unwrap_err();

        assert!(matches!(err, ControllerError::Client(_)));
        assert!(f.log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_failure_still_reaches_later_updaters() {
        let f = fixture();
        f.first.push_update_result(Err("disk full"));

        let err = f.reconciler.reconcile().await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Updater updater1 failed to apply routing table: disk full"
        );
        assert_eq!(f.second.update_count(), 1);
        assert!(f
            .metrics
            .encode()
            .unwrap()
            .contains("ingress_controller_update_failures_total{updater=\"updater1\"} 1"));
    }

    #[tokio::test]
    async fn test_last_update_error_is_cleared_by_next_success() {
        let f = fixture();
        f.second.push_update_result(Err("rejected"));

        f.reconciler.reconcile_and_record().await;
        let failure = f.reconciler.last_update_error().unwrap();
        assert_eq!(
            failure.message,
            "Updater updater2 failed to apply routing table: rejected"
        );

        f.reconciler.reconcile_and_record().await;
        assert_eq!(f.reconciler.last_update_error(), None);

        let text = f.metrics.encode().unwrap();
        assert!(text.contains("ingress_controller_reconciliations_total{result=\"failure\"} 1"));
        assert!(text.contains("ingress_controller_reconciliations_total{result=\"success\"} 1"));
    }

    #[tokio::test]
    async fn test_pending_signals_coalesce_into_one_pass() {
        let f = fixture();
        let ingresses = f.client.watch_ingresses();
        let services = f.client.watch_services();
        f.client.notify_ingresses();
        f.client.notify_ingresses();
        f.client.notify_services();
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(f.reconciler.clone().run(ingresses, services, stop_rx));

        wait_until(|| f.first.update_count() >= 1).await;
        settle().await;
        assert_eq!(f.first.update_count(), 1);

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_each_change_after_a_pass_triggers_another() {
        let f = fixture();
        let ingresses = f.client.watch_ingresses();
        let services = f.client.watch_services();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(f.reconciler.clone().run(ingresses, services, stop_rx));

        assert!(f.client.notify_services());
        wait_until(|| f.first.update_count() == 1).await;

        f.client.set_ingresses(vec![]);
        assert!(f.client.notify_ingresses());
        wait_until(|| f.first.update_count() == 2).await;
        assert!(f.first.tables()[1].is_empty());

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_source_does_not_stop_the_loop() {
        let f = fixture();
        let ingresses = f.client.watch_ingresses();
        let services = f.client.watch_services();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(f.reconciler.clone().run(ingresses, services, stop_rx));

        f.client.close_ingress_watches();
        settle().await;
        assert_eq!(f.first.update_count(), 0, "a closed source is not a change");

        assert!(f.client.notify_services());
        wait_until(|| f.first.update_count() == 1).await;

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
