// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types and query outcomes for storage entities.
//!
//! Domain types shared across crates live in `herald-core::types`; this
//! module adds the shapes that only make sense at the storage boundary.

use herald_core::{Batch, BatchStatus, ErrorCode, Plan, QuotaReason, UsageCounters};
use serde::{Deserialize, Serialize};

pub use herald_core::types::{Campaign, CampaignStats, DailySummary, Recipient};

/// A tenant row with its live usage counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    pub plan: Plan,
    pub usage: UsageCounters,
}

/// Message limits applied by a conditional reservation. `None` is unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageLimits {
    pub daily: Option<u64>,
    pub monthly: Option<u64>,
}

/// Result of an atomic counter reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The counters were incremented; values are after the increment.
    Reserved(UsageCounters),
    /// Nothing was incremented.
    Denied {
        reason: QuotaReason,
        current: u64,
        limit: u64,
    },
}

/// A queue entry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
}

/// Result of trying to persist a campaign's batch plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanInsert {
    Inserted,
    AlreadyPlanned,
    UnknownCampaign,
}

/// Result of a claim attempt on a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The batch moved to `processing`; the snapshot reflects the claim.
    Claimed(Box<Batch>),
    /// The owning campaign is paused.
    Paused,
    /// The batch is not claimable in its current status (including a
    /// duplicate delivery observing `processing` or `completed`).
    NotClaimable(BatchStatus),
    /// The batch spent all its attempts.
    Exhausted,
    UnknownBatch,
}

/// What happened to one recipient during a send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientOutcome {
    /// The provider accepted the message.
    Sent { message_id: String },
    /// The attempt failed. The first failure of a recipient counts toward
    /// `stats.failed`; later failures of the same recipient do not.
    Failed {
        error: String,
        code: Option<ErrorCode>,
    },
    /// No further attempt will be made; the recorded failure becomes final
    /// with `code` (`RETRIES_EXHAUSTED`, or `QUOTA_EXCEEDED` when a retry
    /// was refused by the guard).
    Exhausted { error: String, code: ErrorCode },
    /// The recipient was never attempted.
    Skipped { error: String, code: ErrorCode },
}

/// Batch and recipient state after a recipient update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientUpdate {
    pub recipient: Recipient,
    pub batch_status: BatchStatus,
}

/// Receipt delivered out of band by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    /// The recipient moved forward along `sent → delivered → read`.
    Applied,
    /// The recipient already reached this status or a later one.
    Ignored,
    /// No recipient is known for the message id.
    UnknownMessage,
}

/// Lifecycle of a durable retry row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RetryStatus {
    Pending,
    Processing,
    Done,
    Exhausted,
}

/// A scheduled re-send of one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEntry {
    pub id: i64,
    pub job_id: String,
    pub recipient_index: u32,
    pub contact_id: String,
    pub phone: String,
    pub reason: String,
    /// The send attempt this entry will make (1-based count of prior attempts).
    pub attempt: u32,
    pub next_attempt_at: String,
    pub status: RetryStatus,
}

/// Values for a new retry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRetry {
    pub job_id: String,
    pub recipient_index: u32,
    pub contact_id: String,
    pub phone: String,
    pub reason: String,
    pub attempt: u32,
    pub next_attempt_at: String,
}

/// A recoverable send failure and the retry that should follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryableFailure {
    pub error: String,
    pub code: ErrorCode,
    /// Total send attempts allowed per recipient, the first one included.
    pub max_attempts: u32,
    /// Due time of the next attempt, used only when one is still allowed.
    pub next_attempt_at: String,
    /// The claimed retry entry this failure came from.
    pub resolves: Option<i64>,
}

/// Recipient state after a recoverable failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub recipient: Recipient,
    /// A retry row exists for the recipient's next attempt.
    pub retry_scheduled: bool,
}

/// What abandoned-claim recovery changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbandonedRecovery {
    /// Batches failed with `PROCESSING_ERROR` so the next claim resumes them.
    pub reclaimable: Vec<String>,
    /// Retries scheduled for failed recipients that had lost theirs.
    pub rescheduled: u32,
    /// Batches completed because nothing was left to send.
    pub completed: Vec<String>,
}

/// One tenant's activity on one day, before pricing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyActivity {
    pub tenant_id: String,
    pub plan: Plan,
    pub campaigns_initiated: u64,
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub messages_read: u64,
    pub messages_failed: u64,
}
