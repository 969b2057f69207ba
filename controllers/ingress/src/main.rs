//! Ingress Controller
//!
//! Keeps the load balancer's routing table in line with the cluster's
//! Ingresses and Services. The table is written as JSON for the load
//! balancer to pick up; `/health`, `/metrics` and `/status` are served on
//! `HEALTH_PORT`.

use ingress_controller::config::ControllerConfig;
use ingress_controller::metrics::Metrics;
use ingress_controller::server::{bind, start_server, ServerState};
use ingress_controller::updaters::FileUpdater;
use ingress_controller::{Controller, ControllerError, Updater};
use resource_client::KubeResourceClient;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ingress_controller=info,resource_client=info".into()),
        )
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Ingress Controller");

    // Load configuration from environment variables
    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Default allow: {:?}", config.default_allow);
    info!("  Default backend timeout: {}s", config.default_backend_timeout_seconds);
    info!("  Routing table: {}", config.routing_table_path.display());
    info!("  Health port: {}", config.health_port);

    let kube_client = kube::Client::try_default().await?;
    let resources = KubeResourceClient::new(kube_client, config.namespace.clone());

    let updaters: Vec<Arc<dyn Updater>> =
        vec![Arc::new(FileUpdater::new(config.routing_table_path.clone()))];

    let metrics = Metrics::new()?;
    let controller = Arc::new(Controller::new(
        Arc::new(resources),
        updaters,
        config.default_policy(),
        metrics.clone(),
    ));

    // A taken port fails startup before any updater is started
    let listener = bind(config.health_port).await?;

    controller.start().await.map_err(|e| {
        error!("Failed to start controller: {}", e);
        e
    })?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_state = ServerState {
        controller: Arc::clone(&controller),
        metrics,
    };
    let mut server = tokio::spawn(start_server(listener, server_state, async move {
        let _ = shutdown_rx.await;
    }));

    let server_exited = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
            false
        }
        outcome = &mut server => {
            log_server_exit(outcome);
            error!("Health server exited unexpectedly; shutting down");
            true
        }
    };

    let result = controller.stop().await;
    if server_exited {
        return result.and(Err(ControllerError::Io(std::io::Error::other(
            "health server exited unexpectedly",
        ))));
    }
    let _ = shutdown_tx.send(());
    log_server_exit(server.await);

    result
}

fn log_server_exit(outcome: Result<Result<(), ControllerError>, tokio::task::JoinError>) {
    match outcome {
        Ok(Err(e)) => error!("Health server failed: {}", e),
        Err(e) => error!("Health server task failed: {}", e),
        Ok(Ok(())) => {}
    }
}
