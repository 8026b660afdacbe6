//! Prometheus exporter for OpenStack.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use openstack_exporter::{
    ExporterConfig, HttpServer, KeystoneClient, NetworkExporter, Registry,
};
use openstack_exporter_common::init_tracing;

/// Prometheus exporter for OpenStack.
#[derive(Parser, Debug)]
#[command(name = "openstack-exporter")]
#[command(about = "Export OpenStack service state as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Metric name prefix (overrides config).
    #[arg(long)]
    prefix: Option<String>,

    /// Log level (trace, debug, info, warn, error; overrides config).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // Apply CLI and environment overrides
    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }
    if let Some(prefix) = args.prefix {
        config.prometheus.prefix = prefix;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.cloud.apply_env();
    config.validate()?;
    config.cloud.require_credentials()?;

    init_tracing(&config.logging)?;

    info!(cloud = %config.cloud.name, "Starting OpenStack Exporter");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Build exporters
    let keystone = KeystoneClient::new(config.cloud.clone())?;
    let neutron = NetworkExporter::new(keystone, &config.prometheus.prefix, &config.cloud)?;

    let mut registry = Registry::new(config.prometheus.prefix.clone());
    registry.register(Box::new(neutron));
    info!(exporters = registry.exporter_count(), "Exporters registered");
    let registry = Arc::new(registry);

    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let http_server = HttpServer::new(
        registry.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    );

    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        error!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    let stats = registry.stats();
    info!(scrapes_total = stats.scrapes_total, "Final statistics");

    info!("Exporter stopped");
    Ok(())
}
