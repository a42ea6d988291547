// Scheduler binary entry point

use anyhow::Context;
use common::config::Settings;
use common::keys::KeySpace;
use common::scheduler::{CronDispatcher, MinuteDriver, SchedulerConfig, SchedulingPass};
use common::store::{CoordinationStore, RedisCoordinationStore, RedisPool};
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    settings.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        anyhow::anyhow!(e)
    })?;

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    let identity = settings.process_identity();
    info!(
        cluster = %settings.cluster.name,
        identity = %identity,
        redis_url = %settings.redis.url,
        "Starting cron scheduler"
    );

    let redis_pool = RedisPool::new(&settings.redis)
        .await
        .context("Failed to initialize Redis pool")?;
    redis_pool
        .health_check()
        .await
        .context("Redis health check failed")?;

    let store = Arc::new(RedisCoordinationStore::new(redis_pool)) as Arc<dyn CoordinationStore>;

    let scheduler_config = SchedulerConfig {
        lock_ttl_seconds: settings.scheduler.lock_ttl_seconds,
        max_catchup_seconds: settings.scheduler.max_catchup_seconds,
        timezone: settings.timezone().map_err(anyhow::Error::msg)?,
    };
    let dispatcher = CronDispatcher::new(
        scheduler_config,
        store,
        KeySpace::new(settings.cluster.name.clone()),
        identity,
    );

    let driver = Arc::new(MinuteDriver::new(
        Arc::new(dispatcher) as Arc<dyn SchedulingPass>
    ));

    let running = driver.clone();
    let handle = tokio::spawn(async move { running.start().await });

    shutdown_signal().await;
    info!("Shutdown signal received, stopping scheduler");
    driver.stop();

    if let Err(e) = handle.await {
        error!(error = %e, "Minute driver task failed");
    }

    telemetry::shutdown_tracer();
    info!("Scheduler stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm => {}
    }
}
