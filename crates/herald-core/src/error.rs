// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Herald pipeline.

use thiserror::Error;

use crate::types::QuotaReason;

/// The primary error type used across all Herald crates.
#[derive(Debug, Error)]
pub enum HeraldError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Bad campaign, recipient, or template-variable input. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// A daily, monthly, or template-submission limit would be exceeded.
    #[error("quota exceeded: {reason} at {current} of {limit}")]
    QuotaExceeded {
        reason: QuotaReason,
        current: u64,
        limit: u64,
    },

    /// Network, timeout, or provider-side rate limit. Retried with backoff.
    #[error("transient provider error: {message}")]
    TransientProvider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid recipient, rejected template, or access misconfiguration.
    #[error("permanent provider error: {message}")]
    PermanentProvider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A campaign, batch, tenant, or template does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The operation conflicts with current state (e.g. planning a campaign twice).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HeraldError {
    /// Shorthand for a [`HeraldError::NotFound`].
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }

    /// Whether retrying the failed operation later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientProvider { .. } | Self::Storage { .. })
    }
}

impl From<serde_json::Error> for HeraldError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage {
            source: Box::new(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_error_message_names_reason_and_counts() {
        let err = HeraldError::QuotaExceeded {
            reason: QuotaReason::MonthlyMessages,
            current: 998,
            limit: 1000,
        };
        assert_eq!(
            err.to_string(),
            "quota exceeded: monthly message limit at 998 of 1000"
        );
    }

    #[test]
    fn only_provider_and_storage_failures_are_transient() {
        assert!(HeraldError::TransientProvider {
            message: "timeout".into(),
            source: None,
        }
        .is_transient());
        assert!(!HeraldError::Validation("bad".into()).is_transient());
        assert!(!HeraldError::not_found("batch", "c:0").is_transient());
    }
}
