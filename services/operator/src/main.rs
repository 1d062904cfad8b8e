//! kperf Benchmark Operator
//!
//! Watches `Benchmark` resources and converges each one to the Jobs,
//! Deployments, Services and ConfigMaps that run it.

use anyhow::{Context, Result};
use kube::Client;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kperf_operator::config::Config;
use kperf_operator::controller::worker;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so the log level applies from the start
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        namespace = config.namespace.as_deref().unwrap_or("*"),
        field_manager = %config.field_manager,
        requeue_interval_secs = config.requeue_interval.as_secs(),
        backoff_base_secs = config.backoff.base.as_secs(),
        backoff_max_secs = config.backoff.max.as_secs(),
        "Starting kperf operator"
    );

    let client = Client::try_default()
        .await
        .context("failed to create kubernetes client")?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut controller_handle = tokio::spawn({
        let config = config.clone();
        async move { worker::run(client, &config, shutdown_rx).await }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut controller_handle => {
            if let Err(e) = result {
                error!(error = %e, "Controller task panicked");
            }
            return Ok(());
        }
    }

    // Let in-flight passes finish
    let _ = shutdown_tx.send(true);
    if let Err(e) = controller_handle.await {
        error!(error = %e, "Controller task panicked");
    }

    info!("Operator shutdown complete");
    Ok(())
}
