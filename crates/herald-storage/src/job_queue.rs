// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the JobQueue trait.

use async_trait::async_trait;
use herald_core::{HeraldError, Job, JobQueue};

use crate::database::Database;
use crate::queries;

/// Queue name used for batch claim messages.
pub const BATCH_QUEUE: &str = "batches";

/// SQLite-backed job queue.
///
/// Delegates to the crash-safe `queue` table. Entries locked by a worker
/// that never acknowledges them are redelivered after `lock_secs`.
#[derive(Clone)]
pub struct SqliteJobQueue {
    db: Database,
    queue_name: String,
    lock_secs: u64,
    max_deliveries: u32,
}

impl SqliteJobQueue {
    pub fn new(db: Database, lock_secs: u64, max_deliveries: u32) -> Self {
        Self {
            db,
            queue_name: BATCH_QUEUE.to_string(),
            lock_secs,
            max_deliveries,
        }
    }

    /// Use a queue name other than [`BATCH_QUEUE`].
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, job_id: &str) -> Result<i64, HeraldError> {
        queries::queue::enqueue(&self.db, &self.queue_name, job_id, self.max_deliveries).await
    }

    async fn dequeue(&self) -> Result<Option<Job>, HeraldError> {
        let entry = queries::queue::dequeue(&self.db, &self.queue_name, self.lock_secs).await?;
        Ok(entry.map(|e| Job {
            entry_id: e.id,
            job_id: e.payload,
            deliveries: u32::try_from(e.attempts).unwrap_or(0) + 1,
        }))
    }

    async fn ack(&self, job: &Job) -> Result<(), HeraldError> {
        queries::queue::ack(&self.db, job.entry_id).await
    }

    async fn fail(&self, job: &Job) -> Result<(), HeraldError> {
        queries::queue::fail(&self.db, job.entry_id).await
    }
}
