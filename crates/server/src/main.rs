mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use charstats_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use charstats_core::config::LogFormat::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging depends on the loaded config, so nothing may log before this.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.docs_client.clone(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        transport = ?app.config.chat.transport,
        "charstats-server started"
    );

    let signalled = tokio::select! {
        result = app.gateway_runner.start() => {
            match result {
                Ok(()) => tracing::info!(
                    event_name = "system.server.gateway_finished",
                    correlation_id = "gateway",
                    "chat gateway transport finished; waiting for shutdown signal"
                ),
                Err(error) => tracing::error!(
                    event_name = "system.server.gateway_failed",
                    correlation_id = "gateway",
                    error = %error,
                    "chat gateway stopped; waiting for shutdown signal"
                ),
            }
            false
        }
        signal = wait_for_shutdown() => {
            signal?;
            true
        }
    };
    if !signalled {
        wait_for_shutdown().await?;
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "charstats-server stopping"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let release = async {
        if let Err(error) = app.gateway_runner.shutdown().await {
            tracing::warn!(
                event_name = "system.server.gateway_disconnect_failed",
                correlation_id = "shutdown",
                error = %error,
                "chat gateway did not disconnect cleanly"
            );
        }
        app.docs_client.shutdown().await;
    };
    if tokio::time::timeout(grace, release).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "gateway and document client did not release within the grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
