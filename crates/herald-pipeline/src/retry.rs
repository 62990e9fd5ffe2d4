// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable recipient retries with exponential backoff.
//!
//! A recoverable send failure becomes a row in the `retries` table carrying
//! a snapshot of the recipient, the attempt count at the time of failure,
//! and the time the next attempt is due. The retry poller drains due rows
//! (see [`crate::runner::RetryPoller`]), so scheduled retries survive a
//! restart.

use std::time::Duration;

use herald_config::model::RetryConfig;
use herald_core::{HeraldError, Recipient, SendError};
use herald_storage::database::format_timestamp;
use herald_storage::queries::{batches, retries};
use herald_storage::{Database, FailureRecord, RetryEntry, RetryStatus, RetryableFailure};
use rand::Rng;
use tracing::debug;

/// Backoff and attempt ceiling for recipient retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total send attempts per recipient, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Delays are randomized within ±`jitter_factor`. Zero disables jitter.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
            jitter_factor: config.jitter_factor,
        }
    }
}

impl RetryPolicy {
    /// `min(base * 2^attempt, max)`, before jitter.
    ///
    /// `attempt` counts the sends already made, so the first retry (after
    /// one failed send) waits `base * 2`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        let delay = if attempt >= 63 {
            max
        } else {
            base.saturating_mul(1u64 << attempt).min(max)
        };
        Duration::from_millis(delay)
    }

    /// The delay before retrying after `attempt` attempts, jitter applied.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter_factor <= 0.0 {
            return delay;
        }
        let millis = delay.as_millis() as f64;
        let range = millis * self.jitter_factor;
        let jitter: f64 = rand::thread_rng().gen_range(-range..=range);
        Duration::from_millis((millis + jitter).max(0.0) as u64)
    }
}

/// Persists and hands out recipient retries.
#[derive(Clone)]
pub struct RetryScheduler {
    db: Database,
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(db: Database, policy: RetryPolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Record a recoverable failure of recipient `index` of `job_id` and
    /// schedule its next attempt in the same write, or make the failure
    /// final when attempts ran out.
    ///
    /// `recipient` is the snapshot the failed send was made from. `resolves`
    /// is the claimed entry that made the send, if any; it is closed in the
    /// same write.
    pub async fn record_failure(
        &self,
        job_id: &str,
        index: usize,
        recipient: &Recipient,
        error: &SendError,
        resolves: Option<&RetryEntry>,
    ) -> Result<FailureRecord, HeraldError> {
        let attempt = recipient.attempts + 1;
        let delay = self.policy.delay_for(attempt);
        let due = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| chrono::Utc::now().checked_add_signed(d))
            .ok_or_else(|| HeraldError::Internal(format!("retry delay {delay:?} out of range")))?;

        let record = batches::record_retryable_failure(
            &self.db,
            job_id,
            index,
            RetryableFailure {
                error: error.to_string(),
                code: error.kind.error_code(),
                max_attempts: self.policy.max_attempts,
                next_attempt_at: format_timestamp(due),
                resolves: resolves.map(|entry| entry.id),
            },
        )
        .await?;

        if record.retry_scheduled {
            debug!(
                job_id,
                index,
                attempt = record.recipient.attempts,
                delay_ms = delay.as_millis() as u64,
                "recipient retry scheduled"
            );
        }
        Ok(record)
    }

    /// Claim up to `limit` due retries, locking each for `lock_secs`.
    pub async fn claim_due(&self, limit: u32, lock_secs: u64) -> Result<Vec<RetryEntry>, HeraldError> {
        retries::claim_due(&self.db, limit, lock_secs).await
    }

    pub async fn resolve(&self, entry: &RetryEntry, status: RetryStatus) -> Result<(), HeraldError> {
        retries::resolve(&self.db, entry.id, status).await
    }

    /// Retries of a batch still pending or in flight.
    pub async fn outstanding(&self, job_id: &str) -> Result<u32, HeraldError> {
        retries::outstanding_for_job(&self.db, job_id).await
    }
}
