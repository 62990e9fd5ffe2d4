// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-running loops: the batch worker pool and the retry poller.
//!
//! Both stop when their [`CancellationToken`] is cancelled. A batch or retry
//! that is mid-flight finishes its current recipient before the loop exits.

use std::sync::Arc;
use std::time::Duration;

use herald_config::model::{RetryConfig, WorkerConfig};
use herald_core::{HeraldError, JobQueue};
use herald_storage::database::format_timestamp;
use herald_storage::queries::batches;
use herald_storage::{AbandonedRecovery, Database};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::retry::RetryPolicy;
use crate::worker::{BatchWorker, JobOutcome};

/// A fixed number of tasks, each dequeuing and running one batch at a time.
pub struct WorkerPool {
    worker: Arc<BatchWorker>,
    concurrency: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(worker: Arc<BatchWorker>, config: &WorkerConfig) -> Self {
        Self {
            worker,
            concurrency: config.concurrency.max(1),
            poll_interval: config.poll_interval(),
        }
    }

    /// Run until `cancel` fires, then wait for in-flight batches.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(concurrency = self.concurrency, "worker pool started");
        let mut tasks = JoinSet::new();
        for slot in 0..self.concurrency {
            let worker = Arc::clone(&self.worker);
            let cancel = cancel.clone();
            let poll = self.poll_interval;
            tasks.spawn(async move { worker_loop(slot, worker, poll, cancel).await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task panicked");
            }
        }
        info!("worker pool stopped");
    }

    /// Drain the queue once on the current task. Returns the jobs handled.
    pub async fn drain(&self) -> Result<usize, HeraldError> {
        let mut handled = 0;
        while let Some(job) = self.worker.queue().dequeue().await? {
            if let Err(e) = self.worker.process_job(&job).await {
                warn!(job_id = %job.job_id, error = %e, "job failed");
            }
            handled += 1;
        }
        Ok(handled)
    }
}

async fn worker_loop(
    slot: usize,
    worker: Arc<BatchWorker>,
    poll: Duration,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        match worker.queue().dequeue().await {
            Ok(Some(job)) => match worker.process_job(&job).await {
                Ok(JobOutcome::Ran { report, status }) => {
                    debug!(slot, job_id = %job.job_id, ?report, %status, "job done");
                }
                Ok(other) => debug!(slot, job_id = %job.job_id, ?other, "job skipped"),
                Err(e) => warn!(slot, job_id = %job.job_id, error = %e, "job failed"),
            },
            Ok(None) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll) => {}
                }
            }
            Err(e) => {
                error!(slot, error = %e, "dequeue failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll) => {}
                }
            }
        }
    }
    debug!(slot, "worker task exiting");
}

/// Drains due retry entries on an interval.
pub struct RetryPoller {
    worker: Arc<BatchWorker>,
    interval: Duration,
    limit: u32,
    lock_secs: u64,
}

impl RetryPoller {
    pub fn new(worker: Arc<BatchWorker>, retry: &RetryConfig, worker_config: &WorkerConfig) -> Self {
        Self {
            worker,
            interval: Duration::from_millis(retry.poll_interval_ms),
            limit: retry.poll_limit,
            lock_secs: worker_config.lock_timeout_secs,
        }
    }

    /// Claim and process every due entry once. Returns how many were handled.
    pub async fn poll_once(&self) -> Result<usize, HeraldError> {
        let due = self
            .worker
            .retries()
            .claim_due(self.limit, self.lock_secs)
            .await?;
        for entry in &due {
            match self.worker.process_retry(entry).await {
                Ok(resolution) => {
                    debug!(job_id = %entry.job_id, index = entry.recipient_index, ?resolution, "retry handled");
                }
                // The entry keeps its lock and is reclaimed once it expires.
                Err(e) => warn!(job_id = %entry.job_id, error = %e, "retry failed"),
            }
        }
        Ok(due.len())
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "retry poller started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "retry poll failed");
                    }
                }
            }
        }
        info!("retry poller stopped");
    }
}

/// Repair batches left `processing` by a crashed worker.
///
/// Only claims older than `lock_timeout` count, so a live worker's batch is
/// never touched. Failed recipients that lost their retry get one under
/// `policy`. Batches with recipients left to send are enqueued again;
/// batches with nothing left complete.
pub async fn recover_abandoned(
    db: &Database,
    queue: &dyn JobQueue,
    policy: &RetryPolicy,
    lock_timeout: Duration,
) -> Result<AbandonedRecovery, HeraldError> {
    let cutoff = chrono::Duration::from_std(lock_timeout)
        .ok()
        .and_then(|d| chrono::Utc::now().checked_sub_signed(d))
        .ok_or_else(|| HeraldError::Internal(format!("lock timeout {lock_timeout:?} out of range")))?;
    let recovery =
        batches::recover_abandoned(db, &format_timestamp(cutoff), policy.max_attempts).await?;
    for job_id in &recovery.reclaimable {
        queue.enqueue(job_id).await?;
    }
    if !recovery.reclaimable.is_empty() {
        warn!(batches = recovery.reclaimable.len(), "re-enqueued abandoned batches");
    }
    if recovery.rescheduled > 0 {
        warn!(retries = recovery.rescheduled, "rescheduled retries lost by an abandoned claim");
    }
    if !recovery.completed.is_empty() {
        info!(batches = recovery.completed.len(), "completed abandoned batches");
    }
    Ok(recovery)
}
