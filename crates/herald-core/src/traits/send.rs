// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider send boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::error::HeraldError;
use crate::types::{ErrorCode, HealthStatus, VariableMapping};

/// One template message to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub tenant_id: String,
    pub phone: String,
    pub template_name: String,
    pub language: String,
    pub components: VariableMapping,
    /// `{job_id}:{recipient_index}:{attempt}`; stable across redeliveries of
    /// the same attempt so the provider side can deduplicate.
    pub idempotency_key: String,
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
}

/// Typed provider failure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendErrorKind {
    RateLimit,
    DailyLimit,
    MonthlyLimit,
    WabaAccessError,
    InvalidRecipient,
    TransientNetwork,
}

/// How the pipeline reacts to a [`SendErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Schedule a retry with backoff.
    Retryable,
    /// Stop the run; the tenant is out of quota.
    Quota,
    /// Record on the recipient and move on.
    Permanent,
}

impl SendErrorKind {
    pub fn disposition(self) -> FailureDisposition {
        match self {
            Self::RateLimit | Self::TransientNetwork => FailureDisposition::Retryable,
            Self::DailyLimit | Self::MonthlyLimit => FailureDisposition::Quota,
            Self::WabaAccessError | Self::InvalidRecipient => FailureDisposition::Permanent,
        }
    }

    /// The code recorded on the recipient.
    pub fn error_code(self) -> ErrorCode {
        match self {
            Self::RateLimit => ErrorCode::RateLimit,
            Self::DailyLimit | Self::MonthlyLimit => ErrorCode::QuotaExceeded,
            Self::WabaAccessError => ErrorCode::WabaAccessError,
            Self::InvalidRecipient => ErrorCode::InvalidRecipient,
            Self::TransientNetwork => ErrorCode::TransientNetwork,
        }
    }
}

/// A failed send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct SendError {
    pub kind: SendErrorKind,
    pub message: String,
}

impl SendError {
    pub fn new(kind: SendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<SendError> for HeraldError {
    fn from(e: SendError) -> Self {
        match e.kind.disposition() {
            FailureDisposition::Retryable => HeraldError::TransientProvider {
                message: e.to_string(),
                source: Some(Box::new(e)),
            },
            FailureDisposition::Quota | FailureDisposition::Permanent => {
                HeraldError::PermanentProvider {
                    message: e.to_string(),
                    source: Some(Box::new(e)),
                }
            }
        }
    }
}

/// External provider that delivers one message.
#[async_trait]
pub trait SendClient: Send + Sync {
    /// Human-readable name of the provider, for logs.
    fn name(&self) -> &str;

    /// Delivers one message.
    async fn send(&self, request: &SendRequest) -> Result<SendReceipt, SendError>;

    /// Reports whether the provider is reachable.
    async fn health_check(&self) -> Result<HealthStatus, HeraldError> {
        Ok(HealthStatus::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_covers_every_kind() {
        use FailureDisposition::*;
        let cases = [
            (SendErrorKind::RateLimit, Retryable),
            (SendErrorKind::TransientNetwork, Retryable),
            (SendErrorKind::DailyLimit, Quota),
            (SendErrorKind::MonthlyLimit, Quota),
            (SendErrorKind::WabaAccessError, Permanent),
            (SendErrorKind::InvalidRecipient, Permanent),
        ];
        for (kind, expected) in cases {
            assert_eq!(kind.disposition(), expected, "{kind}");
        }
    }

    #[test]
    fn provider_quota_errors_record_quota_exceeded() {
        assert_eq!(SendErrorKind::DailyLimit.error_code(), ErrorCode::QuotaExceeded);
        assert_eq!(SendErrorKind::MonthlyLimit.error_code(), ErrorCode::QuotaExceeded);
    }

    #[test]
    fn send_error_converts_by_disposition() {
        let transient: HeraldError =
            SendError::new(SendErrorKind::TransientNetwork, "connection reset").into();
        assert!(transient.is_transient());

        let permanent: HeraldError =
            SendError::new(SendErrorKind::InvalidRecipient, "not a WhatsApp user").into();
        assert!(matches!(permanent, HeraldError::PermanentProvider { .. }));
        assert!(permanent.to_string().contains("INVALID_RECIPIENT"));
    }
}
