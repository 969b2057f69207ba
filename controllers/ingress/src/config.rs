//! Controller configuration from environment variables.

use crate::error::ControllerError;
use crate::translator::{parse_allow, DefaultPolicy};
use std::path::PathBuf;

/// Allow list for Ingresses without an allow annotation
pub const DEFAULT_ALLOW: &str = "0.0.0.0/0";
/// Backend timeout for Ingresses without a timeout annotation
pub const DEFAULT_BACKEND_TIMEOUT_SECONDS: u32 = 60;
/// Port of the health and metrics server
pub const DEFAULT_HEALTH_PORT: u16 = 12082;
/// Where the file updater writes the routing table
pub const DEFAULT_ROUTING_TABLE_PATH: &str = "/var/run/ingress-controller/routing-table.json";

/// Runtime settings, read from `WATCH_NAMESPACE`, `DEFAULT_ALLOW`,
/// `DEFAULT_BACKEND_TIMEOUT_SECONDS`, `HEALTH_PORT` and `ROUTING_TABLE_PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// `None` watches all namespaces
    pub namespace: Option<String>,
    pub default_allow: Vec<String>,
    pub default_backend_timeout_seconds: u32,
    pub health_port: u16,
    pub routing_table_path: PathBuf,
}

impl ControllerConfig {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());
        let default_allow =
            parse_allow(lookup("DEFAULT_ALLOW").as_deref().unwrap_or(DEFAULT_ALLOW));

        let default_backend_timeout_seconds = match lookup("DEFAULT_BACKEND_TIMEOUT_SECONDS") {
            Some(value) => match value.trim().parse::<u32>() {
                Ok(seconds) if seconds > 0 => seconds,
                _ => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "DEFAULT_BACKEND_TIMEOUT_SECONDS must be a positive integer, got {:?}",
                        value
                    )));
                }
            },
            None => DEFAULT_BACKEND_TIMEOUT_SECONDS,
        };

        let health_port = match lookup("HEALTH_PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|e| {
                ControllerError::InvalidConfig(format!("HEALTH_PORT {:?} is invalid: {}", value, e))
            })?,
            None => DEFAULT_HEALTH_PORT,
        };

        let routing_table_path = lookup("ROUTING_TABLE_PATH")
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| DEFAULT_ROUTING_TABLE_PATH.to_string())
            .into();

        Ok(Self {
            namespace,
            default_allow,
            default_backend_timeout_seconds,
            health_port,
            routing_table_path,
        })
    }

    pub fn default_policy(&self) -> DefaultPolicy {
        DefaultPolicy {
            default_allow: self.default_allow.clone(),
            default_backend_timeout_seconds: self.default_backend_timeout_seconds,
        }
    }
}
