//! Test utilities for unit testing the controller
//!
//! This module provides fixtures for Ingress/Service resources and a
//! recording `FakeUpdater` whose calls land in a shared log.

use crate::metrics::Metrics;
use crate::routing::{RoutingEntry, RoutingTable};
use crate::translator::{
    DefaultPolicy, ALLOW_ANNOTATION, BACKEND_MAX_CONNECTIONS_ANNOTATION,
    BACKEND_TIMEOUT_ANNOTATION, LEGACY_LB_SCHEME_ANNOTATION, STRIP_PATH_ANNOTATION,
};
use crate::updater::Updater;
use anyhow::anyhow;
use k8s_openapi::api::core::v1::{Service, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const INGRESS_HOST: &str = "foo.sky.com";
pub const INGRESS_PATH: &str = "/foo";
pub const INGRESS_NAME: &str = "foo-ingress";
pub const INGRESS_SVC_NAME: &str = "foo-svc";
pub const INGRESS_SVC_PORT: i32 = 80;
pub const INGRESS_NAMESPACE: &str = "happysky";
pub const INGRESS_ALLOW: &str = "10.82.0.0/16,10.44.0.0/16";
pub const INGRESS_DEFAULT_ALLOW: &str = "10.50.0.0/16,10.1.0.0/16";
pub const SERVICE_IP: &str = "10.254.0.82";
pub const LB_SCHEME: &str = "internal";
pub const BACKEND_TIMEOUT: u32 = 10;

/// Policy used by every test unless it says otherwise
pub fn default_policy() -> DefaultPolicy {
    DefaultPolicy {
        default_allow: split(INGRESS_DEFAULT_ALLOW),
        default_backend_timeout_seconds: BACKEND_TIMEOUT,
    }
}

pub fn split(cidrs: &str) -> Vec<String> {
    cidrs.split(',').map(str::to_string).collect()
}

pub fn metrics() -> Metrics {
    Metrics::new().expect("metrics registry")
}

/// Builder for a single-rule, single-path Ingress.
///
/// `None` for an annotation field leaves the annotation out entirely.
#[derive(Debug, Clone)]
pub struct IngressFixture {
    pub name: String,
    pub namespace: String,
    pub host: String,
    pub path: Option<String>,
    pub service_name: String,
    pub service_port: ServiceBackendPort,
    pub allow: Option<String>,
    pub scheme: Option<(&'static str, String)>,
    pub strip_path: Option<String>,
    pub backend_timeout: Option<String>,
    pub max_connections: Option<String>,
}

impl Default for IngressFixture {
    fn default() -> Self {
        Self {
            name: INGRESS_NAME.to_string(),
            namespace: INGRESS_NAMESPACE.to_string(),
            host: INGRESS_HOST.to_string(),
            path: Some(INGRESS_PATH.to_string()),
            service_name: INGRESS_SVC_NAME.to_string(),
            service_port: port_number(INGRESS_SVC_PORT),
            allow: Some(INGRESS_ALLOW.to_string()),
            scheme: Some((LEGACY_LB_SCHEME_ANNOTATION, LB_SCHEME.to_string())),
            strip_path: None,
            backend_timeout: Some(BACKEND_TIMEOUT.to_string()),
            max_connections: None,
        }
    }
}

impl IngressFixture {
    pub fn build(&self) -> Ingress {
        let mut annotations = BTreeMap::new();
        let mut set = |key: &str, value: &Option<String>| {
            if let Some(value) = value {
                annotations.insert(key.to_string(), value.clone());
            }
        };
        set(ALLOW_ANNOTATION, &self.allow);
        set(STRIP_PATH_ANNOTATION, &self.strip_path);
        set(BACKEND_TIMEOUT_ANNOTATION, &self.backend_timeout);
        set(BACKEND_MAX_CONNECTIONS_ANNOTATION, &self.max_connections);
        if let Some((key, value)) = &self.scheme {
            annotations.insert(key.to_string(), value.clone());
        }

        Ingress {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(self.host.clone()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![ingress_path(
                            self.path.as_deref(),
                            &self.service_name,
                            self.service_port.clone(),
                        )],
                    }),
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }
}

pub fn port_number(number: i32) -> ServiceBackendPort {
    ServiceBackendPort {
        number: Some(number),
        name: None,
    }
}

pub fn port_name(name: &str) -> ServiceBackendPort {
    ServiceBackendPort {
        number: None,
        name: Some(name.to_string()),
    }
}

pub fn ingress_path(path: Option<&str>, service_name: &str, port: ServiceBackendPort) -> HTTPIngressPath {
    HTTPIngressPath {
        path: path.map(str::to_string),
        path_type: "Prefix".to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: service_name.to_string(),
                port: Some(port),
            }),
            resource: None,
        },
    }
}

/// The Ingress most tests start from
pub fn default_ingress() -> Ingress {
    IngressFixture::default().build()
}

pub fn service_fixture(name: &str, namespace: &str, cluster_ip: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some(cluster_ip.to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn default_service() -> Service {
    service_fixture(INGRESS_SVC_NAME, INGRESS_NAMESPACE, SERVICE_IP)
}

pub fn arcs<T>(items: Vec<T>) -> Vec<Arc<T>> {
    items.into_iter().map(Arc::new).collect()
}

/// The entry `default_ingress` + `default_service` translate to
pub fn expected_entry(ingress: &Arc<Ingress>) -> RoutingEntry {
    RoutingEntry {
        namespace: INGRESS_NAMESPACE.to_string(),
        name: INGRESS_NAME.to_string(),
        host: INGRESS_HOST.to_string(),
        path: INGRESS_PATH.to_string(),
        service_address: SERVICE_IP.to_string(),
        service_port: 80,
        allow: split(INGRESS_ALLOW),
        lb_scheme: LB_SCHEME.to_string(),
        strip_paths: false,
        backend_timeout_seconds: BACKEND_TIMEOUT,
        backend_max_connections: 0,
        ingress: Arc::clone(ingress),
    }
}

/// Shared record of updater calls, e.g. `"updater1.start"`
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, updater: &str, call: &str) {
        self.0.lock().unwrap().push(format!("{}.{}", updater, call));
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Calls of one kind, e.g. every `start`, in order
    pub fn calls_of(&self, call: &str) -> Vec<String> {
        let suffix = format!(".{}", call);
        self.calls()
            .into_iter()
            .filter(|c| c.ends_with(&suffix))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Scriptable updater that records every call.
///
/// Unscripted calls succeed. Scripted results for `update` and `health`
/// are consumed in order. A gated updater parks every `update` until the
/// gate is notified; the table is recorded once the call is released.
#[derive(Debug)]
pub struct FakeUpdater {
    name: String,
    log: CallLog,
    start_error: Option<String>,
    stop_error: Option<String>,
    gate: Option<Arc<Notify>>,
    panic_on_update: AtomicBool,
    update_results: Mutex<VecDeque<Result<(), String>>>,
    health_results: Mutex<VecDeque<Result<(), String>>>,
    tables: Mutex<Vec<RoutingTable>>,
}

impl FakeUpdater {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            start_error: None,
            stop_error: None,
            gate: None,
            panic_on_update: AtomicBool::new(false),
            update_results: Mutex::new(VecDeque::new()),
            health_results: Mutex::new(VecDeque::new()),
            tables: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    pub fn failing_stop(mut self, message: &str) -> Self {
        self.stop_error = Some(message.to_string());
        self
    }

    /// Each `update` waits for one `notify_one` on `gate`
    pub fn gated(mut self, gate: &Arc<Notify>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }

    /// Makes every following `update` panic
    pub fn panic_on_update(&self) {
        self.panic_on_update.store(true, Ordering::SeqCst);
    }

    pub fn push_update_result(&self, result: Result<(), &str>) {
        self.update_results
            .lock()
            .unwrap()
            .push_back(result.map_err(str::to_string));
    }

    pub fn push_health_result(&self, result: Result<(), &str>) {
        self.health_results
            .lock()
            .unwrap()
            .push_back(result.map_err(str::to_string));
    }

    /// Every table passed to `update`, in call order
    pub fn tables(&self) -> Vec<RoutingTable> {
        self.tables.lock().unwrap().clone()
    }

    pub fn update_count(&self) -> usize {
        self.tables.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Updater for FakeUpdater {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.log.record(&self.name, "start");
        match &self.start_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(()),
        }
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.log.record(&self.name, "stop");
        match &self.stop_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(()),
        }
    }

    async fn update(&self, table: &RoutingTable) -> anyhow::Result<()> {
        self.log.record(&self.name, "update");
        if self.panic_on_update.load(Ordering::SeqCst) {
            panic!("{} panicked while applying the routing table", self.name);
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.tables.lock().unwrap().push(table.clone());
        let scripted = self.update_results.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(())).map_err(|message| anyhow!("{}", message))
    }

    async fn health(&self) -> anyhow::Result<()> {
        let scripted = self.health_results.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(())).map_err(|message| anyhow!("{}", message))
    }
}

/// Polls `condition` until it holds, failing the test after two seconds
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

/// Gives a background task time to (not) act
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
