//! HostWatch - single-host resource monitor.

use anyhow::Result;
use clap::Parser;
use hostwatch::{app::App, cli::Cli, config::Config};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            // Logging is not configured yet; fall back to a plain subscriber.
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    // RUST_LOG, when set, takes precedence over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("HostWatch starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("API Listen Address: {}", config.server.listen_address);
    info!("Database: {}", config.storage.path.display());
    info!("Collector Interval: {}s", config.collector.interval_seconds);
    info!("Retention Sweep: every {} ticks", config.collector.purge_every_ticks);
    info!(
        "Probe Target: {}",
        config.probe.target_url.as_deref().unwrap_or("Not configured")
    );
    info!(
        "Threshold Alerts: {}",
        if config.alerts.enabled {
            format!(
                "Enabled (cpu {}%, memory {}%, disk {}%, window {}m)",
                config.alerts.cpu_threshold,
                config.alerts.memory_threshold,
                config.alerts.disk_threshold,
                config.alerts.window_minutes
            )
        } else {
            "Disabled".to_string()
        }
    );
    info!(
        "Metrics Server: {}",
        if config.metrics.enabled {
            config.metrics.listen_address.to_string()
        } else {
            "Disabled".to_string()
        }
    );
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await?;
    info!(api = %app.api_addr(), "HostWatch initialized successfully.");

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down..."),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    app.run().await?;
    info!("HostWatch stopped.");
    Ok(())
}
