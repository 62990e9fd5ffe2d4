// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch persistence, claiming, and per-recipient state transitions.
//!
//! Every mutation is one `call` closure on the single writer thread, so a
//! read-modify-write of the recipients column can never interleave with
//! another worker's update of the same batch.

use std::str::FromStr;

use herald_core::types::{BatchStats, VariableMapping};
use herald_core::{Batch, BatchStatus, ErrorCode, HeraldError, RecipientStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::database::{map_tr_err, now_timestamp, Database};
use crate::models::{
    AbandonedRecovery, ClaimOutcome, FailureRecord, NewRetry, PlanInsert, ReceiptOutcome,
    Recipient, RecipientOutcome, RecipientUpdate, RetryStatus, RetryableFailure,
};
use crate::queries::retries::{insert_retry, resolve_in};
use crate::queries::{conversion_err, to_sql_err};

const BATCH_COLUMNS: &str = "job_id, campaign_id, tenant_id, batch_index, total_batches,
    recipients, recipient_count, status, sent, delivered, read_count, failed, skipped,
    attempts, max_attempts, last_error, error_code, template_id, template_name, language,
    variable_mapping, queued_at, started_at, last_attempt_at, completed_at";

fn batch_from_row(row: &Row<'_>) -> Result<Batch, rusqlite::Error> {
    let recipients: String = row.get(5)?;
    let recipients: Vec<Recipient> =
        serde_json::from_str(&recipients).map_err(|e| conversion_err(5, e))?;
    let status: String = row.get(7)?;
    let error_code: Option<String> = row.get(16)?;
    let mapping: String = row.get(20)?;
    let variable_mapping: VariableMapping =
        serde_json::from_str(&mapping).map_err(|e| conversion_err(20, e))?;

    Ok(Batch {
        job_id: row.get(0)?,
        campaign_id: row.get(1)?,
        tenant_id: row.get(2)?,
        batch_index: row.get(3)?,
        total_batches: row.get(4)?,
        recipients,
        recipient_count: row.get(6)?,
        status: BatchStatus::from_str(&status).map_err(|e| conversion_err(7, e))?,
        stats: BatchStats {
            sent: row.get(8)?,
            delivered: row.get(9)?,
            read: row.get(10)?,
            failed: row.get(11)?,
            skipped: row.get(12)?,
        },
        attempts: row.get(13)?,
        max_attempts: row.get(14)?,
        last_error: row.get(15)?,
        error_code: error_code
            .map(|c| ErrorCode::from_str(&c))
            .transpose()
            .map_err(|e| conversion_err(16, e))?,
        template_id: row.get(17)?,
        template_name: row.get(18)?,
        language: row.get(19)?,
        variable_mapping,
        queued_at: row.get(21)?,
        started_at: row.get(22)?,
        last_attempt_at: row.get(23)?,
        completed_at: row.get(24)?,
    })
}

fn load_batch(conn: &Connection, job_id: &str) -> Result<Option<Batch>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {BATCH_COLUMNS} FROM batches WHERE job_id = ?1"),
        params![job_id],
        batch_from_row,
    )
    .optional()
}

/// Write back the recipients column and the stats counters of `batch`.
fn store_recipients(conn: &Connection, batch: &Batch) -> Result<(), rusqlite::Error> {
    let recipients = serde_json::to_string(&batch.recipients).map_err(to_sql_err)?;
    conn.execute(
        "UPDATE batches SET recipients = ?2, sent = ?3, delivered = ?4, read_count = ?5,
             failed = ?6, skipped = ?7
         WHERE job_id = ?1",
        params![
            batch.job_id,
            recipients,
            batch.stats.sent,
            batch.stats.delivered,
            batch.stats.read,
            batch.stats.failed,
            batch.stats.skipped,
        ],
    )?;
    Ok(())
}

/// Mark every unprocessed recipient of `batch` skipped. Returns how many moved.
fn skip_unprocessed_in(batch: &mut Batch, code: ErrorCode, error: &str, now: &str) -> u32 {
    let mut skipped = 0;
    for recipient in batch
        .recipients
        .iter_mut()
        .filter(|r| r.status.is_unprocessed())
    {
        recipient.status = RecipientStatus::Skipped;
        recipient.error = Some(error.to_string());
        recipient.error_code = Some(code);
        recipient.processed_at = Some(now.to_string());
        skipped += 1;
    }
    batch.stats.skipped += skipped;
    skipped
}

/// Persist a campaign's batch plan and mark the campaign planned, atomically.
pub async fn insert_plan(
    db: &Database,
    campaign_id: &str,
    batches: &[Batch],
) -> Result<PlanInsert, HeraldError> {
    let campaign_id = campaign_id.to_string();
    let rows = batches
        .iter()
        .map(|b| {
            Ok((
                b.clone(),
                serde_json::to_string(&b.recipients)?,
                serde_json::to_string(&b.variable_mapping)?,
            ))
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    let total: u32 = batches.iter().map(|b| b.recipient_count).sum();

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let planned_at: Option<Option<String>> = tx
                .query_row(
                    "SELECT planned_at FROM campaigns WHERE id = ?1",
                    params![campaign_id],
                    |row| row.get(0),
                )
                .optional()?;
            match planned_at {
                None => return Ok(PlanInsert::UnknownCampaign),
                Some(Some(_)) => return Ok(PlanInsert::AlreadyPlanned),
                Some(None) => {}
            }

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO batches (job_id, campaign_id, tenant_id, batch_index,
                         total_batches, recipients, recipient_count, status, max_attempts,
                         template_id, template_name, language, variable_mapping)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                )?;
                for (batch, recipients, mapping) in &rows {
                    stmt.execute(params![
                        batch.job_id,
                        batch.campaign_id,
                        batch.tenant_id,
                        batch.batch_index,
                        batch.total_batches,
                        recipients,
                        batch.recipient_count,
                        batch.status.to_string(),
                        batch.max_attempts,
                        batch.template_id,
                        batch.template_name,
                        batch.language,
                        mapping,
                    ])?;
                }
            }

            tx.execute(
                "UPDATE campaigns SET planned_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     total_recipients = ?2
                 WHERE id = ?1",
                params![campaign_id, total],
            )?;
            tx.commit()?;
            Ok(PlanInsert::Inserted)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a batch by job ID.
pub async fn get_batch(db: &Database, job_id: &str) -> Result<Option<Batch>, HeraldError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| load_batch(conn, &job_id))
        .await
        .map_err(map_tr_err)
}

/// All batches of a campaign in `batch_index` order.
pub async fn list_batches(db: &Database, campaign_id: &str) -> Result<Vec<Batch>, HeraldError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BATCH_COLUMNS} FROM batches WHERE campaign_id = ?1 ORDER BY batch_index"
            ))?;
            let rows = stmt.query_map(params![campaign_id], batch_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Move `pending` batches to `queued` once their jobs are enqueued.
pub async fn mark_queued(db: &Database, job_ids: &[String]) -> Result<usize, HeraldError> {
    let job_ids = job_ids.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut changed = 0;
            {
                let mut stmt = tx.prepare(
                    "UPDATE batches SET status = 'queued',
                         queued_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE job_id = ?1 AND status = 'pending'",
                )?;
                for job_id in &job_ids {
                    changed += stmt.execute(params![job_id])?;
                }
            }
            tx.commit()?;
            Ok(changed)
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claim a batch for processing.
///
/// Succeeds from `pending`, `queued`, or a retryable `failed` status while
/// attempts remain and the campaign is not paused. Increments `attempts`.
pub async fn claim_batch(db: &Database, job_id: &str) -> Result<ClaimOutcome, HeraldError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE batches SET status = 'processing',
                     attempts = attempts + 1,
                     error_code = NULL,
                     last_attempt_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     started_at = COALESCE(started_at, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 WHERE job_id = ?1
                   AND attempts < max_attempts
                   AND (status IN ('pending', 'queued')
                        OR (status = 'failed'
                            AND (error_code IS NULL OR error_code = 'PROCESSING_ERROR')))
                   AND NOT EXISTS (
                       SELECT 1 FROM campaigns c WHERE c.id = batches.campaign_id AND c.paused = 1)",
                params![job_id],
            )?;

            let Some(batch) = load_batch(conn, &job_id)? else {
                return Ok(ClaimOutcome::UnknownBatch);
            };
            if changed == 1 {
                return Ok(ClaimOutcome::Claimed(Box::new(batch)));
            }

            let waiting = batch.status.is_claimable()
                || batch.status == BatchStatus::Paused
                || (batch.status == BatchStatus::Failed
                    && batch.error_code.is_none_or(ErrorCode::allows_batch_retry));
            if !waiting {
                return Ok(ClaimOutcome::NotClaimable(batch.status));
            }
            let paused: bool = conn.query_row(
                "SELECT paused FROM campaigns WHERE id = ?1",
                params![batch.campaign_id],
                |row| row.get(0),
            )?;
            if paused {
                Ok(ClaimOutcome::Paused)
            } else if batch.attempts >= batch.max_attempts {
                Ok(ClaimOutcome::Exhausted)
            } else {
                Ok(ClaimOutcome::NotClaimable(batch.status))
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Apply the outcome of one send attempt to recipient `index` of a batch.
///
/// Stats move with the recipient: a first failure adds to `failed`, a later
/// success takes it back. Recipients already sent are never changed.
pub async fn record_recipient(
    db: &Database,
    job_id: &str,
    index: usize,
    outcome: RecipientOutcome,
) -> Result<RecipientUpdate, HeraldError> {
    let id = job_id.to_string();
    let result = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut batch) = load_batch(&tx, &id)? else {
                return Ok(None);
            };
            let Some(recipient) = batch.recipients.get(index).cloned() else {
                return Ok(None);
            };
            let now = now_timestamp();
            let prev = recipient.status;
            let mut next = recipient;

            if !prev.is_sent() {
                match outcome {
                    RecipientOutcome::Sent { message_id } => {
                        next.attempts += 1;
                        next.status = RecipientStatus::Sent;
                        next.error = None;
                        next.error_code = None;
                        next.processed_at = Some(now);
                        if prev == RecipientStatus::Failed {
                            batch.stats.failed = batch.stats.failed.saturating_sub(1);
                        }
                        batch.stats.sent += 1;
                        tx.execute(
                            "INSERT OR IGNORE INTO message_index (message_id, job_id, recipient_index)
                             VALUES (?1, ?2, ?3)",
                            params![message_id, id, index as i64],
                        )?;
                        next.message_id = Some(message_id);
                    }
                    RecipientOutcome::Failed { error, code } => {
                        next.attempts += 1;
                        if prev != RecipientStatus::Failed {
                            batch.stats.failed += 1;
                        }
                        next.status = RecipientStatus::Failed;
                        next.error = Some(error);
                        next.error_code = code;
                        next.processed_at = Some(now);
                    }
                    RecipientOutcome::Exhausted { error, code } => {
                        if prev != RecipientStatus::Failed {
                            batch.stats.failed += 1;
                        }
                        next.status = RecipientStatus::Failed;
                        next.error = Some(error);
                        next.error_code = Some(code);
                        next.processed_at = Some(now);
                    }
                    RecipientOutcome::Skipped { error, code } => {
                        if prev.is_unprocessed() {
                            batch.stats.skipped += 1;
                            next.status = RecipientStatus::Skipped;
                            next.error = Some(error);
                            next.error_code = Some(code);
                            next.processed_at = Some(now);
                        }
                    }
                }
                batch.recipients[index] = next.clone();
                store_recipients(&tx, &batch)?;
            }
            tx.commit()?;
            Ok(Some(RecipientUpdate {
                recipient: next,
                batch_status: batch.status,
            }))
        })
        .await
        .map_err(map_tr_err)?;

    result.ok_or_else(|| HeraldError::not_found("recipient", format!("{job_id}#{index}")))
}

/// Record a recoverable failure of recipient `index` together with what
/// follows it: a retry row for the next attempt, or `RETRIES_EXHAUSTED`
/// once `max_attempts` are spent.
///
/// The recipient update, the new retry row and the resolution of
/// `failure.resolves` commit in one transaction, so a crash can never leave
/// a failed recipient without its retry.
pub async fn record_retryable_failure(
    db: &Database,
    job_id: &str,
    index: usize,
    failure: RetryableFailure,
) -> Result<FailureRecord, HeraldError> {
    let id = job_id.to_string();
    let recipient_index = u32::try_from(index)
        .map_err(|_| HeraldError::Internal(format!("recipient index {index} out of range")))?;
    let result = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut batch) = load_batch(&tx, &id)? else {
                return Ok(None);
            };
            let Some(mut next) = batch.recipients.get(index).cloned() else {
                return Ok(None);
            };

            let mut retry_scheduled = false;
            if !next.status.is_sent() {
                if next.status != RecipientStatus::Failed {
                    batch.stats.failed += 1;
                }
                next.attempts += 1;
                next.status = RecipientStatus::Failed;
                next.error = Some(failure.error.clone());
                next.processed_at = Some(now_timestamp());
                if next.attempts < failure.max_attempts {
                    next.error_code = Some(failure.code);
                    insert_retry(
                        &tx,
                        &NewRetry {
                            job_id: id.clone(),
                            recipient_index,
                            contact_id: next.contact_id.clone(),
                            phone: next.phone.clone(),
                            reason: failure.error.clone(),
                            attempt: next.attempts,
                            next_attempt_at: failure.next_attempt_at.clone(),
                        },
                    )?;
                    retry_scheduled = true;
                } else {
                    next.error_code = Some(ErrorCode::RetriesExhausted);
                }
                batch.recipients[index] = next.clone();
                store_recipients(&tx, &batch)?;
            }

            if let Some(entry) = failure.resolves {
                let status = if retry_scheduled || next.status.is_sent() {
                    RetryStatus::Done
                } else {
                    RetryStatus::Exhausted
                };
                resolve_in(&tx, entry, status)?;
            }
            tx.commit()?;
            Ok(Some(FailureRecord {
                recipient: next,
                retry_scheduled,
            }))
        })
        .await
        .map_err(map_tr_err)?;

    result.ok_or_else(|| HeraldError::not_found("recipient", format!("{job_id}#{index}")))
}

/// Skip every unprocessed recipient of a batch. Returns how many were skipped.
pub async fn skip_unprocessed(
    db: &Database,
    job_id: &str,
    code: ErrorCode,
    error: &str,
) -> Result<u32, HeraldError> {
    let job_id = job_id.to_string();
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut batch) = load_batch(&tx, &job_id)? else {
                return Ok(0);
            };
            let skipped = skip_unprocessed_in(&mut batch, code, &error, &now_timestamp());
            if skipped > 0 {
                store_recipients(&tx, &batch)?;
            }
            tx.commit()?;
            Ok(skipped)
        })
        .await
        .map_err(map_tr_err)
}

/// Complete a `processing` batch once no recipient is unprocessed and no
/// retry is outstanding. Returns the new status when the batch settled.
pub async fn settle_batch(db: &Database, job_id: &str) -> Result<Option<BatchStatus>, HeraldError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let Some(batch) = load_batch(conn, &job_id)? else {
                return Ok(None);
            };
            if batch.status != BatchStatus::Processing || batch.unprocessed().next().is_some() {
                return Ok(None);
            }
            let outstanding: i64 = conn.query_row(
                "SELECT COUNT(*) FROM retries
                 WHERE job_id = ?1 AND status IN ('pending', 'processing')",
                params![job_id],
                |row| row.get(0),
            )?;
            if outstanding > 0 {
                return Ok(None);
            }
            let changed = conn.execute(
                "UPDATE batches SET status = 'completed',
                     completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE job_id = ?1 AND status = 'processing'",
                params![job_id],
            )?;
            Ok((changed == 1).then_some(BatchStatus::Completed))
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a batch `failed` with `code`.
///
/// Only `PROCESSING_ERROR` leaves the batch claimable again, so only other
/// codes record `completed_at`.
pub async fn fail_batch(
    db: &Database,
    job_id: &str,
    code: ErrorCode,
    error: &str,
) -> Result<(), HeraldError> {
    let job_id = job_id.to_string();
    let error = error.to_string();
    let terminal = !code.allows_batch_retry();
    let code = code.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE batches SET status = 'failed', error_code = ?2, last_error = ?3,
                     completed_at = CASE WHEN ?4
                         THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now') ELSE NULL END
                 WHERE job_id = ?1",
                params![job_id, code, error, terminal],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Stop every not-yet-claimed batch of a campaign on quota exhaustion.
///
/// Their recipients become `skipped` and the batches `failed` with
/// `QUOTA_EXCEEDED`. Returns the halted job IDs.
pub async fn halt_campaign(
    db: &Database,
    campaign_id: &str,
    error: &str,
) -> Result<Vec<String>, HeraldError> {
    let campaign_id = campaign_id.to_string();
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut batches = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {BATCH_COLUMNS} FROM batches
                     WHERE campaign_id = ?1 AND status IN ('pending', 'queued', 'paused')
                     ORDER BY batch_index"
                ))?;
                let rows = stmt.query_map(params![campaign_id], batch_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let now = now_timestamp();
            let code = ErrorCode::QuotaExceeded.to_string();
            for batch in &mut batches {
                skip_unprocessed_in(batch, ErrorCode::QuotaExceeded, &error, &now);
                store_recipients(&tx, batch)?;
                tx.execute(
                    "UPDATE batches SET status = 'failed', error_code = ?2, last_error = ?3,
                         completed_at = ?4
                     WHERE job_id = ?1",
                    params![batch.job_id, code, error, now],
                )?;
            }
            tx.commit()?;
            Ok(batches.into_iter().map(|b| b.job_id).collect())
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a delivery receipt to the recipient that received `message_id`.
///
/// Status only moves forward along `sent → delivered → read`; the batch
/// status is never touched.
pub async fn apply_receipt(
    db: &Database,
    message_id: &str,
    status: RecipientStatus,
) -> Result<ReceiptOutcome, HeraldError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let target: Option<(String, i64)> = tx
                .query_row(
                    "SELECT job_id, recipient_index FROM message_index WHERE message_id = ?1",
                    params![message_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((job_id, index)) = target else {
                return Ok(ReceiptOutcome::UnknownMessage);
            };
            let Some(mut batch) = load_batch(&tx, &job_id)? else {
                return Ok(ReceiptOutcome::UnknownMessage);
            };
            let Some(recipient) = usize::try_from(index)
                .ok()
                .and_then(|i| batch.recipients.get_mut(i))
            else {
                return Ok(ReceiptOutcome::UnknownMessage);
            };

            let prev = recipient.status.delivery_rank();
            let next = status.delivery_rank();
            if prev == 0 || next <= prev {
                return Ok(ReceiptOutcome::Ignored);
            }
            recipient.status = status;
            let delivered_rank = RecipientStatus::Delivered.delivery_rank();
            let read_rank = RecipientStatus::Read.delivery_rank();
            if prev < delivered_rank && next >= delivered_rank {
                batch.stats.delivered += 1;
            }
            if prev < read_rank && next >= read_rank {
                batch.stats.read += 1;
            }
            store_recipients(&tx, &batch)?;
            tx.commit()?;
            Ok(ReceiptOutcome::Applied)
        })
        .await
        .map_err(map_tr_err)
}

/// Repair `processing` batches abandoned by a crashed worker.
///
/// A batch counts as abandoned when its last claim is older than
/// `claimed_before`. Within each one, a failed recipient still waiting on a
/// retry that has no row for its current attempt gets one due now, or
/// `RETRIES_EXHAUSTED` once `max_attempts` are spent. A batch that still
/// has unprocessed recipients then becomes `failed` with `PROCESSING_ERROR`,
/// so the next claim resumes it; one with nothing left to send and no
/// outstanding retry completes.
pub async fn recover_abandoned(
    db: &Database,
    claimed_before: &str,
    max_attempts: u32,
) -> Result<AbandonedRecovery, HeraldError> {
    let claimed_before = claimed_before.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let stale = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {BATCH_COLUMNS} FROM batches
                     WHERE status = 'processing' AND last_attempt_at < ?1"
                ))?;
                let rows = stmt.query_map(params![claimed_before], batch_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let now = now_timestamp();
            let mut recovery = AbandonedRecovery::default();
            for mut batch in stale {
                let job_id = batch.job_id.clone();
                let mut exhausted = false;
                for (index, recipient) in batch.recipients.iter_mut().enumerate() {
                    let awaiting = recipient.status == RecipientStatus::Failed
                        && recipient.error_code.is_some_and(ErrorCode::awaits_retry);
                    if !awaiting {
                        continue;
                    }
                    let recipient_index = u32::try_from(index).map_err(to_sql_err)?;
                    let has_retry: bool = tx.query_row(
                        "SELECT EXISTS(SELECT 1 FROM retries
                         WHERE job_id = ?1 AND recipient_index = ?2 AND attempt = ?3)",
                        params![job_id, recipient_index, recipient.attempts],
                        |row| row.get(0),
                    )?;
                    if has_retry {
                        continue;
                    }
                    if recipient.attempts < max_attempts {
                        insert_retry(
                            &tx,
                            &NewRetry {
                                job_id: job_id.clone(),
                                recipient_index,
                                contact_id: recipient.contact_id.clone(),
                                phone: recipient.phone.clone(),
                                reason: recipient.error.clone().unwrap_or_default(),
                                attempt: recipient.attempts,
                                next_attempt_at: now.clone(),
                            },
                        )?;
                        recovery.rescheduled += 1;
                    } else {
                        recipient.error_code = Some(ErrorCode::RetriesExhausted);
                        exhausted = true;
                    }
                }
                if exhausted {
                    store_recipients(&tx, &batch)?;
                }

                if batch.unprocessed().next().is_some() {
                    tx.execute(
                        "UPDATE batches SET status = 'failed', error_code = 'PROCESSING_ERROR',
                             last_error = 'claim abandoned before the batch finished'
                         WHERE job_id = ?1",
                        params![job_id],
                    )?;
                    recovery.reclaimable.push(job_id);
                    continue;
                }
                let outstanding: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM retries
                     WHERE job_id = ?1 AND status IN ('pending', 'processing')",
                    params![job_id],
                    |row| row.get(0),
                )?;
                if outstanding == 0 {
                    tx.execute(
                        "UPDATE batches SET status = 'completed',
                             completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE job_id = ?1",
                        params![job_id],
                    )?;
                    recovery.completed.push(job_id);
                }
            }
            tx.commit()?;
            Ok(recovery)
        })
        .await
        .map_err(map_tr_err)
}
