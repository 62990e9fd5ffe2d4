// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by every pipeline stage.
//!
//! Enum variants serialize the same way through serde (JSON columns) and
//! strum (TEXT columns), so a value written by one path always parses back
//! through the other.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::HeraldError;

/// Default number of recipients per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default number of send attempts per recipient and claims per batch.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Health status reported by collaborator health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Collaborator is fully operational.
    Healthy,
    /// Collaborator is operational but experiencing issues.
    Degraded(String),
    /// Collaborator is not operational.
    Unhealthy(String),
}

/// Billing plan of a tenant. Selects the row of the plan limit table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Basic,
    Premium,
    Enterprise,
}

/// Which counter a quota decision was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaReason {
    DailyMessages,
    MonthlyMessages,
    DailyTemplateSubmissions,
}

impl std::fmt::Display for QuotaReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DailyMessages => "daily message limit",
            Self::MonthlyMessages => "monthly message limit",
            Self::DailyTemplateSubmissions => "daily template submission limit",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a batch.
///
/// `Pending → Queued → Processing → {Completed | Failed}`; `Paused` is
/// reachable from `Pending`/`Queued` by operator action.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Queued,
    Processing,
    Paused,
    Completed,
    Failed,
}

impl BatchStatus {
    /// Whether the status may be claimed by a worker (retryable failures aside).
    pub fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Queued)
    }
}

/// Lifecycle of one recipient within a batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    Pending,
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
    Skipped,
}

impl RecipientStatus {
    /// Recipients the worker still has to send to.
    pub fn is_unprocessed(self) -> bool {
        matches!(self, Self::Pending | Self::Queued)
    }

    /// Whether the provider accepted a message for this recipient.
    pub fn is_sent(self) -> bool {
        matches!(self, Self::Sent | Self::Delivered | Self::Read)
    }

    /// Position along `sent → delivered → read`. Receipts only move forward.
    pub fn delivery_rank(self) -> u8 {
        match self {
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            _ => 0,
        }
    }
}

/// Machine-readable failure code stored on recipients and batches.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    QuotaExceeded,
    RateLimit,
    WabaAccessError,
    InvalidRecipient,
    TransientNetwork,
    RetriesExhausted,
    ProcessingError,
}

impl ErrorCode {
    /// Whether a batch that failed with this code may be claimed again.
    pub fn allows_batch_retry(self) -> bool {
        matches!(self, Self::ProcessingError)
    }

    /// Whether a recipient failed with this code is waiting on a retry.
    pub fn awaits_retry(self) -> bool {
        matches!(self, Self::RateLimit | Self::TransientNetwork)
    }
}

/// One addressee handed to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub contact_id: String,
    pub phone: String,
}

impl Contact {
    pub fn new(contact_id: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            phone: phone.into(),
        }
    }
}

/// Placeholder counts declared by an approved template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderCounts {
    #[serde(default)]
    pub header: usize,
    #[serde(default)]
    pub body: usize,
    #[serde(default)]
    pub buttons: usize,
}

/// Reference to the template a campaign sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub id: String,
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub placeholders: PlaceholderCounts,
}

/// Positional template variables, grouped by template component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableMapping {
    #[serde(default)]
    pub header: Vec<String>,
    #[serde(default)]
    pub body: Vec<String>,
    #[serde(default)]
    pub buttons: Vec<String>,
}

impl VariableMapping {
    /// Checks the mapping fills exactly the placeholders the template declares.
    pub fn validate(&self, expected: &PlaceholderCounts) -> Result<(), HeraldError> {
        let sections = [
            ("header", self.header.len(), expected.header),
            ("body", self.body.len(), expected.body),
            ("buttons", self.buttons.len(), expected.buttons),
        ];
        for (section, got, want) in sections {
            if got != want {
                return Err(HeraldError::Validation(format!(
                    "template {section} expects {want} variable(s), mapping supplies {got}"
                )));
            }
        }
        if let Some(blank) = self
            .header
            .iter()
            .chain(&self.body)
            .chain(&self.buttons)
            .position(|v| v.trim().is_empty())
        {
            return Err(HeraldError::Validation(format!(
                "template variable #{} is empty",
                blank + 1
            )));
        }
        Ok(())
    }
}

/// A bulk-send intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub tenant_id: String,
    pub template: TemplateRef,
    pub total_recipients: u32,
    pub paused: bool,
    pub planned_at: Option<String>,
    pub created_at: String,
}

/// Aggregate per-batch message counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub sent: u32,
    pub delivered: u32,
    pub read: u32,
    pub failed: u32,
    /// Recipients never attempted because the run stopped on quota.
    #[serde(default)]
    pub skipped: u32,
}

/// One recipient entry embedded in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub contact_id: String,
    pub phone: String,
    pub status: RecipientStatus,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<ErrorCode>,
    /// Send attempts made so far.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub processed_at: Option<String>,
}

impl Recipient {
    pub fn pending(contact: &Contact) -> Self {
        Self {
            contact_id: contact.contact_id.clone(),
            phone: contact.phone.clone(),
            status: RecipientStatus::Pending,
            message_id: None,
            error: None,
            error_code: None,
            attempts: 0,
            processed_at: None,
        }
    }
}

/// A bounded slice of a campaign's recipients, processed as one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub job_id: String,
    pub campaign_id: String,
    pub tenant_id: String,
    pub batch_index: u32,
    pub total_batches: u32,
    pub recipients: Vec<Recipient>,
    pub recipient_count: u32,
    pub status: BatchStatus,
    pub stats: BatchStats,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub template_id: String,
    pub template_name: String,
    pub language: String,
    pub variable_mapping: VariableMapping,
    pub queued_at: Option<String>,
    pub started_at: Option<String>,
    pub last_attempt_at: Option<String>,
    pub completed_at: Option<String>,
}

impl Batch {
    /// The stable claim key for batch `index` of `campaign_id`.
    pub fn job_id_for(campaign_id: &str, index: u32) -> String {
        format!("{campaign_id}:{index}")
    }

    /// Whether a failed batch may be claimed again.
    pub fn can_retry(&self) -> bool {
        self.status == BatchStatus::Failed
            && self.attempts < self.max_attempts
            && self.error_code.is_none_or(ErrorCode::allows_batch_retry)
    }

    /// Recipients not yet attempted.
    pub fn unprocessed(&self) -> impl Iterator<Item = (usize, &Recipient)> {
        self.recipients
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status.is_unprocessed())
    }
}

/// Per-tenant usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub messages_today: u64,
    pub messages_this_month: u64,
    pub template_submissions_today: u64,
}

/// Campaign progress computed from its batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total_batches: u32,
    pub completed: u32,
    pub failed: u32,
    pub processing: u32,
    pub pending: u32,
    pub paused: u32,
    pub sent: u64,
    pub delivered: u64,
    pub read: u64,
    pub failed_messages: u64,
    pub skipped: u64,
}

/// Per-tenant per-day rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub tenant_id: String,
    /// Calendar day, `YYYY-MM-DD` (UTC).
    pub date: String,
    pub campaigns_initiated: u64,
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub messages_read: u64,
    pub messages_failed: u64,
    pub estimated_cost: f64,
}
