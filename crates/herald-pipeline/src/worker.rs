// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch processing: claim, per-recipient send, settle.
//!
//! A [`BatchWorker`] turns one queue delivery into one batch run. The claim
//! is a conditional update, so a redelivered job for a batch that is already
//! `processing` or `completed` does nothing. Recipients are attempted in
//! persisted order, each behind a one-message quota reservation. The run
//! stops on the first quota refusal (from the guard or from the provider):
//! the remaining recipients are skipped, the batch fails with
//! `QUOTA_EXCEEDED`, and the campaign's unclaimed batches are halted.
//!
//! Retries re-enter through [`BatchWorker::process_retry`], which goes
//! through the same reserve-then-send path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use herald_core::{
    Batch, BatchStatus, ErrorCode, FailureDisposition, HeraldError, Job, JobQueue, Recipient,
    RecipientStatus, SendClient, SendError, SendRequest,
};
use herald_quota::{UsageDecision, UsageGuard};
use herald_storage::queries::batches;
use herald_storage::{ClaimOutcome, Database, RecipientOutcome, RetryEntry, RetryStatus};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::retry::RetryScheduler;

/// Per-run recipient counts.
///
/// `failed` includes recipients that failed provisionally and are waiting
/// on a retry (`retrying`). `stopped` counts recipients skipped by a quota
/// stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchRunReport {
    pub sent: u32,
    pub failed: u32,
    pub stopped: u32,
    pub retrying: u32,
}

impl BatchRunReport {
    pub fn merge(&mut self, other: &BatchRunReport) {
        self.sent += other.sent;
        self.failed += other.failed;
        self.stopped += other.stopped;
        self.retrying += other.retrying;
    }
}

/// How one queue delivery was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The batch was claimed and run.
    Ran {
        report: BatchRunReport,
        status: BatchStatus,
    },
    /// The campaign is paused; resuming re-enqueues the batch.
    Paused,
    /// Duplicate or late delivery; the batch was left as it was.
    Ignored(BatchStatus),
    /// The batch spent its claim attempts.
    Exhausted,
    UnknownBatch,
}

/// What happened to one retry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryResolution {
    Sent,
    /// Failed again and another retry was scheduled.
    Rescheduled,
    /// Failed for good: retries exhausted, permanent error, or quota.
    Failed,
    /// The recipient moved on since the entry was written; nothing was sent.
    Stale,
}

/// Result of one reserve-then-send step.
enum SendAttempt {
    Sent { message_id: String },
    Rejected(SendError),
    /// The guard refused the reservation; nothing was sent.
    Denied(String),
}

/// Processes claimed batches and their retries.
pub struct BatchWorker {
    db: Database,
    sender: Arc<dyn SendClient>,
    queue: Arc<dyn JobQueue>,
    guard: UsageGuard,
    retries: RetryScheduler,
    pacing: Duration,
}

impl BatchWorker {
    pub fn new(
        db: Database,
        sender: Arc<dyn SendClient>,
        queue: Arc<dyn JobQueue>,
        guard: UsageGuard,
        retries: RetryScheduler,
    ) -> Self {
        Self {
            db,
            sender,
            queue,
            guard,
            retries,
            pacing: Duration::from_millis(50),
        }
    }

    /// Delay between two sends of the same batch.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    pub fn retries(&self) -> &RetryScheduler {
        &self.retries
    }

    /// Claim and run the batch named by `job`, then ack or fail the delivery.
    ///
    /// A processing error fails the batch with `PROCESSING_ERROR` and returns
    /// the delivery to the queue, so a later claim resumes where this one
    /// stopped.
    pub async fn process_job(&self, job: &Job) -> Result<JobOutcome, HeraldError> {
        let outcome = match batches::claim_batch(&self.db, &job.job_id).await? {
            ClaimOutcome::Claimed(batch) => {
                metrics::adjust_active_batches(1.0);
                let run = self.run_batch(&batch).await;
                metrics::adjust_active_batches(-1.0);
                match run {
                    Ok((report, status)) => JobOutcome::Ran { report, status },
                    Err(e) => {
                        error!(job_id = %job.job_id, error = %e, "batch run failed");
                        if let Err(fail_err) = batches::fail_batch(
                            &self.db,
                            &job.job_id,
                            ErrorCode::ProcessingError,
                            &e.to_string(),
                        )
                        .await
                        {
                            error!(job_id = %job.job_id, error = %fail_err, "could not mark batch failed");
                        }
                        self.queue.fail(job).await?;
                        return Err(e);
                    }
                }
            }
            ClaimOutcome::Paused => {
                debug!(job_id = %job.job_id, "campaign paused, dropping delivery");
                JobOutcome::Paused
            }
            ClaimOutcome::NotClaimable(status) => {
                debug!(job_id = %job.job_id, %status, "batch not claimable, ignoring delivery");
                JobOutcome::Ignored(status)
            }
            ClaimOutcome::Exhausted => {
                warn!(job_id = %job.job_id, "batch has no claim attempts left");
                JobOutcome::Exhausted
            }
            ClaimOutcome::UnknownBatch => {
                warn!(job_id = %job.job_id, "delivery for unknown batch");
                JobOutcome::UnknownBatch
            }
        };
        self.queue.ack(job).await?;
        Ok(outcome)
    }

    /// Run a claimed batch over its unprocessed recipients.
    ///
    /// Returns the run's counts and the batch status afterwards. A batch
    /// with outstanding retries stays `processing`; the retry that resolves
    /// last settles it.
    pub async fn run_batch(
        &self,
        batch: &Batch,
    ) -> Result<(BatchRunReport, BatchStatus), HeraldError> {
        let mut report = BatchRunReport::default();
        let pending: Vec<(usize, Recipient)> = batch
            .unprocessed()
            .map(|(index, r)| (index, r.clone()))
            .collect();
        debug!(
            job_id = %batch.job_id,
            attempt = batch.attempts,
            recipients = pending.len(),
            "batch claimed"
        );

        for (position, (index, recipient)) in pending.iter().enumerate() {
            if position > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let error = match self.attempt(batch, *index, recipient).await? {
                SendAttempt::Sent { message_id } => {
                    self.record(batch, *index, RecipientOutcome::Sent { message_id })
                        .await?;
                    report.sent += 1;
                    continue;
                }
                SendAttempt::Denied(reason) => {
                    return self.stop_on_quota(batch, &reason, report).await;
                }
                SendAttempt::Rejected(error) => error,
            };

            report.failed += 1;
            match error.kind.disposition() {
                FailureDisposition::Retryable => {
                    if self
                        .fail_and_reschedule(batch, *index, recipient, &error, None)
                        .await?
                    {
                        report.retrying += 1;
                    }
                }
                FailureDisposition::Permanent => {
                    self.record_failure(batch, *index, &error).await?;
                }
                FailureDisposition::Quota => {
                    self.record_failure(batch, *index, &error).await?;
                    return self.stop_on_quota(batch, &error.to_string(), report).await;
                }
            }
        }

        let status = match batches::settle_batch(&self.db, &batch.job_id).await? {
            Some(status) => {
                metrics::record_batch_finished(&status.to_string());
                status
            }
            None => BatchStatus::Processing,
        };
        info!(
            job_id = %batch.job_id,
            sent = report.sent,
            failed = report.failed,
            retrying = report.retrying,
            %status,
            "batch pass finished"
        );
        Ok((report, status))
    }

    /// Re-attempt the recipient named by a claimed retry entry.
    ///
    /// The entry is resolved in every case. An entry that no longer matches
    /// the recipient (already sent, already final, or superseded by a later
    /// attempt) resolves without a send.
    pub async fn process_retry(&self, entry: &RetryEntry) -> Result<RetryResolution, HeraldError> {
        let Some(batch) = batches::get_batch(&self.db, &entry.job_id).await? else {
            warn!(job_id = %entry.job_id, "retry for unknown batch");
            self.retries.resolve(entry, RetryStatus::Done).await?;
            return Ok(RetryResolution::Stale);
        };
        let index = entry.recipient_index as usize;
        let current = batch.recipients.get(index).filter(|r| {
            r.status == RecipientStatus::Failed
                && r.attempts == entry.attempt
                && r.error_code.is_some_and(ErrorCode::awaits_retry)
        });
        let Some(recipient) = current.cloned() else {
            debug!(job_id = %entry.job_id, index, attempt = entry.attempt, "stale retry entry");
            self.retries.resolve(entry, RetryStatus::Done).await?;
            self.settle(&batch.job_id).await?;
            return Ok(RetryResolution::Stale);
        };

        let resolution = match self.attempt(&batch, index, &recipient).await? {
            SendAttempt::Sent { message_id } => {
                self.record(&batch, index, RecipientOutcome::Sent { message_id })
                    .await?;
                self.retries.resolve(entry, RetryStatus::Done).await?;
                RetryResolution::Sent
            }
            SendAttempt::Denied(reason) => {
                self.record(
                    &batch,
                    index,
                    RecipientOutcome::Exhausted {
                        error: reason.clone(),
                        code: ErrorCode::QuotaExceeded,
                    },
                )
                .await?;
                self.retries.resolve(entry, RetryStatus::Exhausted).await?;
                self.halt(&batch, &reason).await?;
                RetryResolution::Failed
            }
            SendAttempt::Rejected(error) => match error.kind.disposition() {
                FailureDisposition::Retryable => {
                    let rescheduled = self
                        .fail_and_reschedule(&batch, index, &recipient, &error, Some(entry))
                        .await?;
                    if rescheduled {
                        RetryResolution::Rescheduled
                    } else {
                        RetryResolution::Failed
                    }
                }
                FailureDisposition::Permanent => {
                    self.record_failure(&batch, index, &error).await?;
                    self.retries.resolve(entry, RetryStatus::Done).await?;
                    RetryResolution::Failed
                }
                FailureDisposition::Quota => {
                    self.record_failure(&batch, index, &error).await?;
                    self.retries.resolve(entry, RetryStatus::Exhausted).await?;
                    self.halt(&batch, &error.to_string()).await?;
                    RetryResolution::Failed
                }
            },
        };

        self.settle(&batch.job_id).await?;
        Ok(resolution)
    }

    /// Reserve one message, then send. Any non-success returns the
    /// reservation.
    async fn attempt(
        &self,
        batch: &Batch,
        index: usize,
        recipient: &Recipient,
    ) -> Result<SendAttempt, HeraldError> {
        if let UsageDecision::Deny {
            reason,
            current,
            limit,
        } = self.guard.check_and_reserve(&batch.tenant_id, 1).await?
        {
            metrics::record_quota_denied(&reason.to_string());
            let denied = HeraldError::QuotaExceeded {
                reason,
                current,
                limit,
            };
            return Ok(SendAttempt::Denied(denied.to_string()));
        }

        let request = SendRequest {
            tenant_id: batch.tenant_id.clone(),
            phone: recipient.phone.clone(),
            template_name: batch.template_name.clone(),
            language: batch.language.clone(),
            components: batch.variable_mapping.clone(),
            idempotency_key: idempotency_key(&batch.job_id, index, recipient.attempts + 1),
        };
        let started = Instant::now();
        let result = self.sender.send(&request).await;
        metrics::record_send_latency(started.elapsed().as_secs_f64());

        match result {
            Ok(receipt) => {
                metrics::record_sent(self.sender.name());
                Ok(SendAttempt::Sent {
                    message_id: receipt.message_id,
                })
            }
            Err(error) => {
                metrics::record_failed(&error.kind.error_code().to_string());
                warn!(
                    job_id = %batch.job_id,
                    index,
                    kind = %error.kind,
                    error = %error.message,
                    "send failed"
                );
                self.guard.release(&batch.tenant_id, 1).await?;
                Ok(SendAttempt::Rejected(error))
            }
        }
    }

    async fn record(
        &self,
        batch: &Batch,
        index: usize,
        outcome: RecipientOutcome,
    ) -> Result<Recipient, HeraldError> {
        let update = batches::record_recipient(&self.db, &batch.job_id, index, outcome).await?;
        Ok(update.recipient)
    }

    async fn record_failure(
        &self,
        batch: &Batch,
        index: usize,
        error: &SendError,
    ) -> Result<Recipient, HeraldError> {
        self.record(
            batch,
            index,
            RecipientOutcome::Failed {
                error: error.to_string(),
                code: Some(error.kind.error_code()),
            },
        )
        .await
    }

    /// Record a recoverable failure and schedule the next attempt, or make
    /// the failure final when attempts ran out. Returns whether a retry was
    /// scheduled.
    async fn fail_and_reschedule(
        &self,
        batch: &Batch,
        index: usize,
        recipient: &Recipient,
        error: &SendError,
        resolves: Option<&RetryEntry>,
    ) -> Result<bool, HeraldError> {
        let record = self
            .retries
            .record_failure(&batch.job_id, index, recipient, error, resolves)
            .await?;
        if record.retry_scheduled {
            metrics::record_retry_scheduled();
            return Ok(true);
        }

        metrics::record_retry_exhausted();
        warn!(
            job_id = %batch.job_id,
            index,
            attempts = record.recipient.attempts,
            "recipient retries exhausted"
        );
        Ok(false)
    }

    /// End a run on quota: skip what is left, fail the batch, halt the campaign.
    async fn stop_on_quota(
        &self,
        batch: &Batch,
        reason: &str,
        mut report: BatchRunReport,
    ) -> Result<(BatchRunReport, BatchStatus), HeraldError> {
        report.stopped +=
            batches::skip_unprocessed(&self.db, &batch.job_id, ErrorCode::QuotaExceeded, reason)
                .await?;
        batches::fail_batch(&self.db, &batch.job_id, ErrorCode::QuotaExceeded, reason).await?;
        metrics::record_batch_finished(&BatchStatus::Failed.to_string());
        self.halt(batch, reason).await?;
        warn!(
            job_id = %batch.job_id,
            sent = report.sent,
            failed = report.failed,
            stopped = report.stopped,
            reason,
            "batch stopped on quota"
        );
        Ok((report, BatchStatus::Failed))
    }

    async fn halt(&self, batch: &Batch, reason: &str) -> Result<(), HeraldError> {
        let halted = batches::halt_campaign(&self.db, &batch.campaign_id, reason).await?;
        if !halted.is_empty() {
            warn!(
                campaign_id = %batch.campaign_id,
                batches = halted.len(),
                "campaign halted on quota"
            );
        }
        Ok(())
    }

    async fn settle(&self, job_id: &str) -> Result<(), HeraldError> {
        if let Some(status) = batches::settle_batch(&self.db, job_id).await? {
            metrics::record_batch_finished(&status.to_string());
            info!(job_id, %status, "batch settled after retries");
        }
        Ok(())
    }
}

/// `{job_id}:{recipient_index}:{attempt}`. Stable for redeliveries of the
/// same attempt.
pub fn idempotency_key(job_id: &str, index: usize, attempt: u32) -> String {
    format!("{job_id}:{index}:{attempt}")
}
