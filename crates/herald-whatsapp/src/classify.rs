// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maps Cloud API failures onto [`SendErrorKind`].
//!
//! Graph error codes take precedence over the HTTP status; the status is
//! only consulted when the code is missing or unknown.

use herald_core::{SendError, SendErrorKind};
use reqwest::StatusCode;

use crate::types::GraphError;

/// Application, account, throughput, spam and pair rate limits.
const RATE_LIMIT_CODES: &[i64] = &[4, 80007, 130429, 131048, 131056];

/// Expired or invalid token, missing permission, account locked or restricted.
const ACCESS_CODES: &[i64] = &[10, 190, 200, 368, 131005, 131031];

/// Undeliverable number, bad or missing template parameters.
const RECIPIENT_CODES: &[i64] = &[100, 131008, 131009, 131026, 131051, 132000, 132001];

/// Graph-side service and unknown errors.
const TRANSIENT_CODES: &[i64] = &[1, 2, 131000, 131016];

/// Classifies a non-success response.
pub fn classify_response(status: StatusCode, error: Option<&GraphError>) -> SendErrorKind {
    if let Some(code) = error.and_then(|e| e.code) {
        if RATE_LIMIT_CODES.contains(&code) {
            return SendErrorKind::RateLimit;
        }
        if ACCESS_CODES.contains(&code) {
            return SendErrorKind::WabaAccessError;
        }
        if RECIPIENT_CODES.contains(&code) {
            return SendErrorKind::InvalidRecipient;
        }
        if TRANSIENT_CODES.contains(&code) {
            return SendErrorKind::TransientNetwork;
        }
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => SendErrorKind::RateLimit,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SendErrorKind::WabaAccessError,
        StatusCode::REQUEST_TIMEOUT => SendErrorKind::TransientNetwork,
        s if s.is_server_error() => SendErrorKind::TransientNetwork,
        _ => SendErrorKind::InvalidRecipient,
    }
}

/// Classifies a request that produced no response.
pub fn classify_transport(e: &reqwest::Error) -> SendError {
    let kind = if e.is_builder() {
        SendErrorKind::WabaAccessError
    } else {
        SendErrorKind::TransientNetwork
    };
    SendError::new(kind, format!("HTTP request failed: {e}"))
}
