// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `herald serve` command implementation.
//!
//! Opens storage, recovers batches abandoned by a previous process, and runs
//! the worker pool, retry poller, and rollup runner until SIGTERM or Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use herald_config::model::MetricsConfig;
use herald_config::HeraldConfig;
use herald_core::{HealthStatus, HeraldError, SendClient};
use herald_pipeline::shutdown::install_signal_handler;
use herald_pipeline::{
    recover_abandoned, BatchWorker, RetryPolicy, RetryPoller, RetryScheduler, RollupRunner,
    StatusAggregator, WorkerPool,
};
use herald_quota::UsageGuard;
use herald_storage::{Database, SqliteJobQueue};
use herald_whatsapp::CloudApiClient;
use tracing::{info, warn};

/// Runs the `herald serve` command.
pub async fn run_serve(config: HeraldConfig) -> Result<(), HeraldError> {
    info!(name = %config.service.name, "starting herald serve");

    if config.metrics.enabled {
        install_metrics(&config.metrics)?;
    }

    let db = Database::from_config(&config.storage).await?;

    let client = CloudApiClient::new(&config.whatsapp)?;
    if config.whatsapp.default_account.is_none() && config.whatsapp.accounts.is_empty() {
        warn!("no WhatsApp accounts configured; every send will fail");
    }
    match client.health_check().await? {
        HealthStatus::Healthy => info!("WhatsApp Cloud API reachable"),
        status => warn!(?status, "WhatsApp Cloud API health check"),
    }
    let sender: Arc<dyn SendClient> = Arc::new(client);

    let queue = Arc::new(SqliteJobQueue::new(
        db.clone(),
        config.worker.lock_timeout_secs,
        config.planner.max_batch_attempts,
    ));
    let guard = UsageGuard::new(db.clone(), &config.quota);
    let policy = RetryPolicy::from(&config.retry);
    let retries = RetryScheduler::new(db.clone(), policy.clone());
    let worker = Arc::new(
        BatchWorker::new(db.clone(), sender, queue.clone(), guard, retries)
            .with_pacing(config.worker.pacing()),
    );

    // Crash recovery: a batch still `processing` past the lock timeout has no
    // live owner.
    recover_abandoned(
        &db,
        queue.as_ref(),
        &policy,
        Duration::from_secs(config.worker.lock_timeout_secs),
    )
    .await?;

    let cancel = install_signal_handler();

    let pool = WorkerPool::new(Arc::clone(&worker), &config.worker);
    let poller = RetryPoller::new(Arc::clone(&worker), &config.retry, &config.worker);
    let rollup = config.rollup.enabled.then(|| {
        RollupRunner::new(
            StatusAggregator::new(db.clone(), &config.pricing),
            &config.rollup,
        )
    });

    tokio::join!(pool.run(cancel.clone()), poller.run(cancel.clone()), async {
        match &rollup {
            Some(runner) => runner.run(cancel.clone()).await,
            None => info!("daily rollup disabled"),
        }
    });

    info!("all runners stopped, closing storage");
    db.close().await?;
    info!("herald serve stopped");
    Ok(())
}

/// Installs the Prometheus recorder with an HTTP scrape listener.
#[cfg(feature = "prometheus")]
fn install_metrics(config: &MetricsConfig) -> Result<(), HeraldError> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let addr: std::net::SocketAddr = config.listen_address.parse().map_err(|e| {
        HeraldError::Config(format!(
            "invalid metrics.listen_address `{}`: {e}",
            config.listen_address
        ))
    })?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| HeraldError::Internal(format!("failed to install Prometheus recorder: {e}")))?;
    herald_pipeline::metrics::register_metrics();
    info!(%addr, "prometheus metrics exporter listening");
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
fn install_metrics(_config: &MetricsConfig) -> Result<(), HeraldError> {
    warn!("metrics enabled but herald was built without the `prometheus` feature");
    Ok(())
}
