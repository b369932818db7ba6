mod bootstrap;
mod health;
mod sweeper;

use std::time::Duration;

use anyhow::Result;
use leaveflow_core::config::{AppConfig, LoadOptions};
use leaveflow_core::EscalationSweeper;
use tokio::sync::watch;

fn init_logging(config: &AppConfig) {
    use leaveflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = sweeper::spawn(
        EscalationSweeper::new(app.workflow.clone()),
        Duration::from_secs(app.config.workflow.sweep_interval_secs),
        shutdown_rx,
    );

    tracing::info!(event_name = "system.server.started", "leaveflow-server started");
    wait_for_shutdown().await?;
    tracing::info!(event_name = "system.server.stopping", "leaveflow-server stopping");

    // A closed receiver means the sweeper already exited.
    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, sweeper).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            grace_secs = grace.as_secs(),
            "sweeper did not stop within the grace period"
        );
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
