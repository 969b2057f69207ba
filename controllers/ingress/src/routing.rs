//! Routing table model.
//!
//! A [`RoutingTable`] is the fully resolved form of every valid
//! host/path route in the cluster. It is rebuilt from scratch on every
//! reconciliation pass and handed to each updater read-only.

use k8s_openapi::api::networking::v1::Ingress;
use serde::Serialize;
use std::sync::Arc;

/// One resolved host+path route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingEntry {
    /// Namespace of the originating Ingress
    pub namespace: String,
    /// Name of the originating Ingress
    pub name: String,
    pub host: String,
    /// Path prefix; empty means the root path
    pub path: String,
    /// Cluster-internal address of the backend Service
    pub service_address: String,
    pub service_port: u16,
    /// CIDRs allowed to reach the route; empty denies everyone
    pub allow: Vec<String>,
    /// Front-end classification, empty when unset
    pub lb_scheme: String,
    pub strip_paths: bool,
    pub backend_timeout_seconds: u32,
    /// Zero leaves the limit to the updater
    pub backend_max_connections: u32,
    /// The Ingress this entry was derived from
    #[serde(skip)]
    pub ingress: Arc<Ingress>,
}

/// Ordered routing entries: Ingress order, then rule order, then path order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RoutingTable {
    entries: Vec<RoutingEntry>,
}

impl RoutingTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` after the existing entries
    pub fn push(&mut self, entry: RoutingEntry) {
        self.entries.push(entry);
    }

    /// Entries in table order
    pub fn entries(&self) -> &[RoutingEntry] {
        &self.entries
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no Ingress produced a valid route
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in table order
    pub fn iter(&self) -> std::slice::Iter<'_, RoutingEntry> {
        self.entries.iter()
    }
}

impl From<Vec<RoutingEntry>> for RoutingTable {
    fn from(entries: Vec<RoutingEntry>) -> Self {
        Self { entries }
    }
}

impl FromIterator<RoutingEntry> for RoutingTable {
    fn from_iter<I: IntoIterator<Item = RoutingEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RoutingTable {
    type Item = &'a RoutingEntry;
    type IntoIter = std::slice::Iter<'a, RoutingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
