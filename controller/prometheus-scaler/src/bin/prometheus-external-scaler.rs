//! Prometheus external scaler binary - serves the scaler contract over gRPC

use anyhow::Context;
use prometheus_scaler::{server, Config, QueryExecutor, ScalerService};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse_config();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting Prometheus External Scaler");
    info!("Configuration:");
    info!("  Server address: {}", config.server_address);
    info!("  Query: {}", config.query);
    info!("  Listen address: {}", config.listen_addr);
    info!("  Query timeout: {}s", config.query_timeout_secs);

    let backend = config.backend()?;
    let executor = QueryExecutor::new(backend, config.query_timeout())?;
    let scaler = ScalerService::new(executor);

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    match server::serve(listener, scaler, shutdown_signal()).await {
        Ok(()) => {
            info!("External scaler exited normally");
            Ok(())
        }
        Err(e) => {
            error!("External scaler failed: {:#}", e);
            Err(e)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
