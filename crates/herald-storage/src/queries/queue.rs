// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations for crash-safe job delivery.
//!
//! Delivery is at-least-once: an entry whose lock expires before it is
//! acknowledged becomes visible to `dequeue` again.

use herald_core::HeraldError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::QueueEntry;

/// Enqueue a new item. Returns the auto-generated queue entry ID.
pub async fn enqueue(
    db: &Database,
    queue_name: &str,
    payload: &str,
    max_attempts: u32,
) -> Result<i64, HeraldError> {
    let queue_name = queue_name.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue (queue_name, payload, max_attempts) VALUES (?1, ?2, ?3)",
                params![queue_name, payload, max_attempts],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Dequeue the next deliverable entry from the named queue.
///
/// Atomically selects the oldest pending entry, or a processing entry whose
/// lock has expired, and locks it for `lock_secs`. Returns `None` if nothing
/// is deliverable.
pub async fn dequeue(
    db: &Database,
    queue_name: &str,
    lock_secs: u64,
) -> Result<Option<QueueEntry>, HeraldError> {
    let queue_name = queue_name.to_string();
    let lock = format!("+{lock_secs} seconds");
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let entry = tx
                .query_row(
                    "SELECT id, queue_name, payload, status, attempts, max_attempts,
                            created_at, updated_at, locked_until
                     FROM queue
                     WHERE queue_name = ?1
                       AND (status = 'pending'
                            OR (status = 'processing'
                                AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))
                     ORDER BY id ASC
                     LIMIT 1",
                    params![queue_name],
                    |row| {
                        Ok(QueueEntry {
                            id: row.get(0)?,
                            queue_name: row.get(1)?,
                            payload: row.get(2)?,
                            status: row.get(3)?,
                            attempts: row.get(4)?,
                            max_attempts: row.get(5)?,
                            created_at: row.get(6)?,
                            updated_at: row.get(7)?,
                            locked_until: row.get(8)?,
                        })
                    },
                )
                .optional()?;

            let Some(entry) = entry else {
                tx.commit()?;
                return Ok(None);
            };

            let locked_until: String = tx.query_row(
                "UPDATE queue SET status = 'processing',
                     locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1
                 RETURNING locked_until",
                params![entry.id, lock],
                |row| row.get(0),
            )?;
            tx.commit()?;

            Ok(Some(QueueEntry {
                status: "processing".to_string(),
                locked_until: Some(locked_until),
                ..entry
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Acknowledge successful processing of a queue entry.
///
/// Marks the entry as "completed".
pub async fn ack(db: &Database, id: i64) -> Result<(), HeraldError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'completed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a queue entry as failed.
///
/// Increments attempts. If attempts >= max_attempts, sets status to "failed".
/// Otherwise resets to "pending" for redelivery and clears the lock.
pub async fn fail(db: &Database, id: i64) -> Result<(), HeraldError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET
                     attempts = attempts + 1,
                     status = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE 'pending' END,
                     locked_until = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a queue entry by ID.
pub async fn get_entry(db: &Database, id: i64) -> Result<Option<QueueEntry>, HeraldError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, queue_name, payload, status, attempts, max_attempts,
                        created_at, updated_at, locked_until
                 FROM queue WHERE id = ?1",
                params![id],
                |row| {
                    Ok(QueueEntry {
                        id: row.get(0)?,
                        queue_name: row.get(1)?,
                        payload: row.get(2)?,
                        status: row.get(3)?,
                        attempts: row.get(4)?,
                        max_attempts: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                        locked_until: row.get(8)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
