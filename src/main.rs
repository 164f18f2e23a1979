//! trust-manager
//!
//! Main entry point. Sets up the Kubernetes client, loads configuration,
//! and runs the `ClusterBundle` and legacy `Bundle` reconciliation loops
//! alongside the metrics server.

use kube::Client;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trust_manager::{
    config::Config,
    controllers::{cluster_bundle_controller, legacy_bundle_controller, Context},
    metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting trust-manager");

    let config = Config::from_env();

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let context = Context::new(&config, client.clone())?;

    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port));
    info!("Metrics server starting on port {}", config.metrics_port);

    let cluster_bundle_handle = tokio::spawn(cluster_bundle_controller::run(context.clone()));
    let legacy_bundle_handle = tokio::spawn(legacy_bundle_controller::run(context));

    tokio::select! {
        _ = cluster_bundle_handle => {
            error!("ClusterBundle controller exited unexpectedly");
        }
        _ = legacy_bundle_handle => {
            error!("Legacy Bundle controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    info!("trust-manager stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,trust_manager=debug,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
