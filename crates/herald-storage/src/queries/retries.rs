// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable recipient retry schedule.

use std::str::FromStr;

use herald_core::HeraldError;
use rusqlite::{params, Connection, Row};

use crate::database::{map_tr_err, Database};
use crate::models::{NewRetry, RetryEntry, RetryStatus};
use crate::queries::conversion_err;

const RETRY_COLUMNS: &str = "id, job_id, recipient_index, contact_id, phone, reason, attempt,
    next_attempt_at, status";

fn retry_from_row(row: &Row<'_>) -> Result<RetryEntry, rusqlite::Error> {
    let status: String = row.get(8)?;
    Ok(RetryEntry {
        id: row.get(0)?,
        job_id: row.get(1)?,
        recipient_index: row.get(2)?,
        contact_id: row.get(3)?,
        phone: row.get(4)?,
        reason: row.get(5)?,
        attempt: row.get(6)?,
        next_attempt_at: row.get(7)?,
        status: RetryStatus::from_str(&status).map_err(|e| conversion_err(8, e))?,
    })
}

/// Schedule a retry. Returns `false` when the same (job, recipient, attempt)
/// is already scheduled.
pub async fn schedule(db: &Database, retry: &NewRetry) -> Result<bool, HeraldError> {
    let retry = retry.clone();
    db.connection()
        .call(move |conn| insert_retry(conn, &retry))
        .await
        .map_err(map_tr_err)
}

pub(crate) fn insert_retry(conn: &Connection, retry: &NewRetry) -> Result<bool, rusqlite::Error> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO retries (job_id, recipient_index, contact_id, phone,
             reason, attempt, next_attempt_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            retry.job_id,
            retry.recipient_index,
            retry.contact_id,
            retry.phone,
            retry.reason,
            retry.attempt,
            retry.next_attempt_at,
        ],
    )?;
    Ok(inserted == 1)
}

/// Claim up to `limit` due retries, locking each for `lock_secs`.
///
/// Entries whose previous claim lock expired are due again.
pub async fn claim_due(
    db: &Database,
    limit: u32,
    lock_secs: u64,
) -> Result<Vec<RetryEntry>, HeraldError> {
    let lock = format!("+{lock_secs} seconds");
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let due = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {RETRY_COLUMNS} FROM retries
                     WHERE (status = 'pending'
                            AND next_attempt_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                        OR (status = 'processing'
                            AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                     ORDER BY next_attempt_at, id
                     LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit], retry_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            {
                let mut stmt = tx.prepare(
                    "UPDATE retries SET status = 'processing',
                         locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2),
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                )?;
                for entry in &due {
                    stmt.execute(params![entry.id, lock])?;
                }
            }
            tx.commit()?;
            Ok(due
                .into_iter()
                .map(|entry| RetryEntry {
                    status: RetryStatus::Processing,
                    ..entry
                })
                .collect())
        })
        .await
        .map_err(map_tr_err)
}

/// Resolve a claimed retry as `done` or `exhausted`.
pub async fn resolve(db: &Database, id: i64, status: RetryStatus) -> Result<(), HeraldError> {
    db.connection()
        .call(move |conn| resolve_in(conn, id, status))
        .await
        .map_err(map_tr_err)
}

pub(crate) fn resolve_in(
    conn: &Connection,
    id: i64,
    status: RetryStatus,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE retries SET status = ?2, locked_until = NULL,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?1",
        params![id, status.to_string()],
    )?;
    Ok(())
}

/// Number of retries of a batch not yet resolved.
pub async fn outstanding_for_job(db: &Database, job_id: &str) -> Result<u32, HeraldError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM retries
                 WHERE job_id = ?1 AND status IN ('pending', 'processing')",
                params![job_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// All retries of one batch, oldest first.
pub async fn list_for_job(db: &Database, job_id: &str) -> Result<Vec<RetryEntry>, HeraldError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RETRY_COLUMNS} FROM retries WHERE job_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![job_id], retry_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{format_timestamp, now_timestamp};
    use crate::models::{Campaign, PlanInsert};
    use crate::queries::{batches, campaigns, tenants};
    use herald_core::types::{
        BatchStats, Contact, PlaceholderCounts, Recipient, TemplateRef, VariableMapping,
    };
    use herald_core::{Batch, BatchStatus, Plan};
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("retries.db").to_str().unwrap())
            .await
            .unwrap();
        tenants::upsert_tenant(&db, "t-1", Plan::Free).await.unwrap();
        campaigns::create_campaign(
            &db,
            &Campaign {
                id: "c-1".into(),
                tenant_id: "t-1".into(),
                template: TemplateRef {
                    id: "tpl".into(),
                    name: "promo".into(),
                    language: "en".into(),
                    placeholders: PlaceholderCounts::default(),
                },
                total_recipients: 1,
                paused: false,
                planned_at: None,
                created_at: now_timestamp(),
            },
        )
        .await
        .unwrap();
        let batch = Batch {
            job_id: "c-1:0".into(),
            campaign_id: "c-1".into(),
            tenant_id: "t-1".into(),
            batch_index: 0,
            total_batches: 1,
            recipients: vec![Recipient::pending(&Contact::new("k-1", "+15550001"))],
            recipient_count: 1,
            status: BatchStatus::Pending,
            stats: BatchStats::default(),
            attempts: 0,
            max_attempts: 3,
            last_error: None,
            error_code: None,
            template_id: "tpl".into(),
            template_name: "promo".into(),
            language: "en".into(),
            variable_mapping: VariableMapping::default(),
            queued_at: None,
            started_at: None,
            last_attempt_at: None,
            completed_at: None,
        };
        assert_eq!(
            batches::insert_plan(&db, "c-1", &[batch]).await.unwrap(),
            PlanInsert::Inserted
        );
        (db, dir)
    }

    fn retry(attempt: u32, at: String) -> NewRetry {
        NewRetry {
            job_id: "c-1:0".into(),
            recipient_index: 0,
            contact_id: "k-1".into(),
            phone: "+15550001".into(),
            reason: "TRANSIENT_NETWORK: timeout".into(),
            attempt,
            next_attempt_at: at,
        }
    }

    #[tokio::test]
    async fn scheduling_is_idempotent_per_attempt() {
        let (db, _dir) = setup().await;
        assert!(schedule(&db, &retry(1, now_timestamp())).await.unwrap());
        assert!(!schedule(&db, &retry(1, now_timestamp())).await.unwrap());
        assert!(schedule(&db, &retry(2, now_timestamp())).await.unwrap());
        assert_eq!(outstanding_for_job(&db, "c-1:0").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn only_due_entries_are_claimed() {
        let (db, _dir) = setup().await;
        let later = chrono::Utc::now() + chrono::Duration::hours(1);
        schedule(&db, &retry(1, now_timestamp())).await.unwrap();
        schedule(&db, &retry(2, format_timestamp(later))).await.unwrap();

        let due = claim_due(&db, 10, 60).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempt, 1);
        assert_eq!(due[0].status, RetryStatus::Processing);

        // Claimed and locked: not handed out twice.
        assert!(claim_due(&db, 10, 60).await.unwrap().is_empty());

        resolve(&db, due[0].id, RetryStatus::Done).await.unwrap();
        assert_eq!(outstanding_for_job(&db, "c-1:0").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_claim_is_handed_out_again() {
        let (db, _dir) = setup().await;
        schedule(&db, &retry(1, now_timestamp())).await.unwrap();
        assert_eq!(claim_due(&db, 10, 0).await.unwrap().len(), 1);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(claim_due(&db, 10, 60).await.unwrap().len(), 1);
        let all = list_for_job(&db, "c-1:0").await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
