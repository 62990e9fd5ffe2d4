// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job queue trait for batch claim messages.

use async_trait::async_trait;

use crate::error::HeraldError;

/// A claim message delivered by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Queue-assigned entry id, used to ack or fail the delivery.
    pub entry_id: i64,
    /// The batch job identifier carried by the message.
    pub job_id: String,
    /// Deliveries of this entry so far, including this one.
    pub deliveries: u32,
}

/// At-least-once queue of batch job identifiers.
///
/// A message may be delivered more than once (e.g. after a worker dies while
/// holding it); consumers must treat a repeated job id as a no-op.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a claim message for `job_id`.
    async fn enqueue(&self, job_id: &str) -> Result<i64, HeraldError>;

    /// Takes the next available message, or `None` when the queue is empty.
    async fn dequeue(&self) -> Result<Option<Job>, HeraldError>;

    /// Acknowledges a message; it will not be delivered again.
    async fn ack(&self, job: &Job) -> Result<(), HeraldError>;

    /// Returns a message after a failed run, making it available again while
    /// the queue's own attempt ceiling allows.
    async fn fail(&self, job: &Job) -> Result<(), HeraldError>;
}
