// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock send client for deterministic testing.
//!
//! `MockSendClient` implements `SendClient` with outcomes scripted per
//! phone number. Every request is captured so tests can assert exactly who
//! was (and was not) contacted.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use herald_core::{SendClient, SendError, SendErrorKind, SendReceipt, SendRequest};

/// One scripted reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    Accept,
    Fail(SendErrorKind),
}

/// A send client that replays scripted outcomes.
///
/// Outcomes for a phone are popped from a FIFO queue. When the queue is
/// empty the message is accepted.
pub struct MockSendClient {
    scripts: Mutex<HashMap<String, VecDeque<MockOutcome>>>,
    calls: Mutex<Vec<SendRequest>>,
    sent_at: Mutex<Vec<Instant>>,
    next_id: AtomicU64,
}

impl MockSendClient {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            sent_at: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append outcomes for `phone`.
    pub async fn script(&self, phone: &str, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.scripts
            .lock()
            .await
            .entry(phone.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Fail the next `times` sends to `phone` with `kind`.
    pub async fn fail_times(&self, phone: &str, kind: SendErrorKind, times: usize) {
        self.script(phone, std::iter::repeat_n(MockOutcome::Fail(kind), times))
            .await;
    }

    /// Every request received, in order.
    pub async fn calls(&self) -> Vec<SendRequest> {
        self.calls.lock().await.clone()
    }

    /// When each request arrived, on the tokio clock.
    pub async fn call_times(&self) -> Vec<Instant> {
        self.sent_at.lock().await.clone()
    }

    pub async fn calls_to(&self, phone: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|r| r.phone == phone)
            .count()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

impl Default for MockSendClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SendClient for MockSendClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, request: &SendRequest) -> Result<SendReceipt, SendError> {
        self.calls.lock().await.push(request.clone());
        self.sent_at.lock().await.push(Instant::now());
        let outcome = self
            .scripts
            .lock()
            .await
            .get_mut(&request.phone)
            .and_then(VecDeque::pop_front)
            .unwrap_or(MockOutcome::Accept);

        match outcome {
            MockOutcome::Accept => {
                let n = self.next_id.fetch_add(1, Ordering::Relaxed);
                Ok(SendReceipt {
                    message_id: format!("wamid.mock-{n}"),
                })
            }
            MockOutcome::Fail(kind) => Err(SendError::new(kind, format!("scripted {kind}"))),
        }
    }
}
