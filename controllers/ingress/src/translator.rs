//! Ingress/Service to routing table translation.
//!
//! [`translate`] resolves every Ingress path against the Service snapshot
//! and applies the annotation defaults. It is pure: same snapshots and
//! policy in, identical table out.
//!
//! Paths that cannot be resolved are not errors; they are skipped and
//! logged at debug level.

use crate::routing::{RoutingEntry, RoutingTable};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{HTTPIngressPath, Ingress, ServiceBackendPort};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Comma-separated CIDRs allowed to reach the Ingress
pub const ALLOW_ANNOTATION: &str = "sky.uk/allow";
/// Legacy front-end scheme key, same priority as [`LB_SCHEME_ANNOTATION`]
pub const LEGACY_LB_SCHEME_ANNOTATION: &str = "sky.uk/frontend-elb-scheme";
/// Front-end scheme, e.g. `internal`
pub const LB_SCHEME_ANNOTATION: &str = "sky.uk/frontend-scheme";
/// Whether the matched path prefix is stripped before forwarding
pub const STRIP_PATH_ANNOTATION: &str = "sky.uk/strip-path";
/// Backend timeout in seconds
pub const BACKEND_TIMEOUT_ANNOTATION: &str = "sky.uk/backend-timeout-seconds";
/// Maximum connections per backend
pub const BACKEND_MAX_CONNECTIONS_ANNOTATION: &str = "sky.uk/backend-max-connections";

/// Cluster address of a Service that has none (headless)
pub const UNASSIGNED_CLUSTER_IP: &str = "None";

/// Process-wide defaults for annotations an Ingress leaves out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPolicy {
    /// Used when the allow annotation is absent
    pub default_allow: Vec<String>,
    /// Used when the timeout annotation is absent or not a positive integer
    pub default_backend_timeout_seconds: u32,
}

/// Why an Ingress path produced no routing entry.
#[derive(Debug, Error, PartialEq, Eq)]
enum Skip {
    #[error("rule has no host")]
    MissingHost,
    #[error("backend has no service name")]
    MissingServiceName,
    #[error("backend has no service port")]
    MissingServicePort,
    #[error("service {0} not found")]
    UnknownService(String),
    #[error("service {0} has no cluster address")]
    NoClusterAddress(String),
    #[error("service {service} has no port named {port}")]
    UnknownPortName { service: String, port: String },
    #[error("port {0} is out of range")]
    PortOutOfRange(i32),
}

/// Annotation-derived fields, resolved once per Ingress.
#[derive(Debug)]
struct RouteOptions {
    allow: Vec<String>,
    lb_scheme: String,
    strip_paths: bool,
    backend_timeout_seconds: u32,
    backend_max_connections: u32,
}

impl RouteOptions {
    fn resolve(ingress: &Ingress, policy: &DefaultPolicy) -> Self {
        let get = |key| annotation(ingress, key);

        Self {
            allow: get(ALLOW_ANNOTATION)
                .map_or_else(|| policy.default_allow.clone(), parse_allow),
            lb_scheme: get(LB_SCHEME_ANNOTATION)
                .or_else(|| get(LEGACY_LB_SCHEME_ANNOTATION))
                .unwrap_or_default()
                .to_string(),
            strip_paths: get(STRIP_PATH_ANNOTATION)
                .and_then(parse_bool)
                .unwrap_or(false),
            backend_timeout_seconds: get(BACKEND_TIMEOUT_ANNOTATION)
                .and_then(parse_positive)
                .unwrap_or(policy.default_backend_timeout_seconds),
            backend_max_connections: get(BACKEND_MAX_CONNECTIONS_ANNOTATION)
                .and_then(parse_positive)
                .unwrap_or(0),
        }
    }
}

fn annotation<'a>(ingress: &'a Ingress, key: &str) -> Option<&'a str> {
    ingress
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

/// Builds the routing table for the given snapshots.
pub fn translate(
    ingresses: &[Arc<Ingress>],
    services: &[Arc<Service>],
    policy: &DefaultPolicy,
) -> RoutingTable {
    let services = index_services(services);
    let mut table = RoutingTable::new();

    for ingress in ingresses {
        let namespace = ingress.metadata.namespace.as_deref().unwrap_or_default();
        let name = ingress.metadata.name.as_deref().unwrap_or_default();
        let options = RouteOptions::resolve(ingress, policy);

        let rules = ingress.spec.as_ref().and_then(|spec| spec.rules.as_deref());
        for rule in rules.unwrap_or_default() {
            let host = rule.host.as_deref().unwrap_or_default();
            let paths = rule.http.as_ref().map(|http| http.paths.as_slice());

            for path in paths.unwrap_or_default() {
                match resolve_backend(namespace, host, path, &services) {
                    Ok((service_address, service_port)) => table.push(RoutingEntry {
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                        host: host.to_string(),
                        path: path.path.clone().unwrap_or_default(),
                        service_address,
                        service_port,
                        allow: options.allow.clone(),
                        lb_scheme: options.lb_scheme.clone(),
                        strip_paths: options.strip_paths,
                        backend_timeout_seconds: options.backend_timeout_seconds,
                        backend_max_connections: options.backend_max_connections,
                        ingress: Arc::clone(ingress),
                    }),
                    Err(reason) => debug!(
                        "Skipping path {:?} of ingress {}/{} (host {:?}): {}",
                        path.path.as_deref().unwrap_or_default(),
                        namespace,
                        name,
                        host,
                        reason
                    ),
                }
            }
        }
    }

    table
}

/// Indexes Services by (namespace, name). The first occurrence wins.
fn index_services(services: &[Arc<Service>]) -> HashMap<(&str, &str), &Service> {
    let mut index = HashMap::with_capacity(services.len());
    for service in services {
        let key = (
            service.metadata.namespace.as_deref().unwrap_or_default(),
            service.metadata.name.as_deref().unwrap_or_default(),
        );
        index.entry(key).or_insert(service.as_ref());
    }
    index
}

fn resolve_backend(
    namespace: &str,
    host: &str,
    path: &HTTPIngressPath,
    services: &HashMap<(&str, &str), &Service>,
) -> Result<(String, u16), Skip> {
    if host.is_empty() {
        return Err(Skip::MissingHost);
    }

    let backend = path.backend.service.as_ref();
    let service_name = backend.map(|b| b.name.as_str()).unwrap_or_default();
    if service_name.is_empty() {
        return Err(Skip::MissingServiceName);
    }

    let port = backend
        .and_then(|b| b.port.as_ref())
        .filter(|port| has_port(port))
        .ok_or(Skip::MissingServicePort)?;

    let service = services
        .get(&(namespace, service_name))
        .ok_or_else(|| Skip::UnknownService(format!("{}/{}", namespace, service_name)))?;

    let address = service
        .spec
        .as_ref()
        .and_then(|spec| spec.cluster_ip.as_deref())
        .unwrap_or_default();
    if address.is_empty() || address == UNASSIGNED_CLUSTER_IP {
        return Err(Skip::NoClusterAddress(format!("{}/{}", namespace, service_name)));
    }

    let port = resolve_port(port, service, service_name)?;
    Ok((address.to_string(), port))
}

fn has_port(port: &ServiceBackendPort) -> bool {
    port.number.is_some_and(|n| n != 0) || port.name.as_deref().is_some_and(|n| !n.is_empty())
}

/// Numeric ports are taken as-is; named ports are looked up on the Service.
fn resolve_port(port: &ServiceBackendPort, service: &Service, service_name: &str) -> Result<u16, Skip> {
    let number = match (port.number, port.name.as_deref()) {
        (Some(number), _) if number != 0 => number,
        (_, Some(port_name)) => service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_deref())
            .unwrap_or_default()
            .iter()
            .find(|p| p.name.as_deref() == Some(port_name))
            .map(|p| p.port)
            .ok_or_else(|| Skip::UnknownPortName {
                service: service_name.to_string(),
                port: port_name.to_string(),
            })?,
        _ => return Err(Skip::MissingServicePort),
    };

    match u16::try_from(number) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(Skip::PortOutOfRange(number)),
    }
}

/// Splits a comma-separated CIDR list. Blank items are dropped, so an
/// empty value yields an empty (deny-all) list.
pub fn parse_allow(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|cidr| !cidr.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn parse_positive(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|v| *v > 0)
}

#[cfg(test)]
#[path = "translator_test.rs"]
mod translator_test;
