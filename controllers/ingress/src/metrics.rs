//! Controller metrics
//!
//! Each [`Metrics`] owns its registry so tests and multiple controllers in
//! one process never collide on registration.

use prometheus::{IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Prometheus collectors for reconciliation passes, updater failures and
/// the routing table size.
///
/// Clones share the same registry and collectors.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    update_failures: IntCounterVec,
    routing_entries: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new(
                "ingress_controller_reconciliations_total",
                "Total number of reconciliation passes",
            ),
            &["result"],
        )?;
        registry.register(Box::new(reconciliations.clone()))?;

        let update_failures = IntCounterVec::new(
            Opts::new(
                "ingress_controller_update_failures_total",
                "Total number of routing table updates rejected by an updater",
            ),
            &["updater"],
        )?;
        registry.register(Box::new(update_failures.clone()))?;

        let routing_entries = IntGauge::new(
            "ingress_controller_routing_entries",
            "Number of entries in the last computed routing table",
        )?;
        registry.register(Box::new(routing_entries.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            update_failures,
            routing_entries,
        })
    }

    /// Counts a finished reconciliation pass
    pub fn record_pass(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.reconciliations.with_label_values(&[result]).inc();
    }

    pub fn record_update_failure(&self, updater: &str) {
        self.update_failures.with_label_values(&[updater]).inc();
    }

    pub fn set_routing_entries(&self, count: usize) {
        self.routing_entries
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Renders every metric in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("routing_entries", &self.routing_entries.get())
            .finish_non_exhaustive()
    }
}
