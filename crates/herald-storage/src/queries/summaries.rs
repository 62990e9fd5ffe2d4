// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily summary rows.

use herald_core::HeraldError;
use rusqlite::{params, OptionalExtension, Row};

use crate::database::{map_tr_err, Database};
use crate::models::DailySummary;
use crate::queries::tenants::{to_i64, to_u64};

fn summary_from_row(row: &Row<'_>) -> Result<DailySummary, rusqlite::Error> {
    Ok(DailySummary {
        tenant_id: row.get(0)?,
        date: row.get(1)?,
        campaigns_initiated: to_u64(row.get(2)?),
        messages_sent: to_u64(row.get(3)?),
        messages_delivered: to_u64(row.get(4)?),
        messages_read: to_u64(row.get(5)?),
        messages_failed: to_u64(row.get(6)?),
        estimated_cost: row.get(7)?,
    })
}

/// Insert or replace the summary for (tenant, date).
///
/// Reruns overwrite every counter, so a summary never double-counts.
pub async fn upsert_summary(db: &Database, summary: &DailySummary) -> Result<(), HeraldError> {
    let s = summary.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO daily_summaries (tenant_id, date, campaigns_initiated,
                     messages_sent, messages_delivered, messages_read, messages_failed,
                     estimated_cost)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(tenant_id, date) DO UPDATE SET
                     campaigns_initiated = excluded.campaigns_initiated,
                     messages_sent = excluded.messages_sent,
                     messages_delivered = excluded.messages_delivered,
                     messages_read = excluded.messages_read,
                     messages_failed = excluded.messages_failed,
                     estimated_cost = excluded.estimated_cost,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    s.tenant_id,
                    s.date,
                    to_i64(s.campaigns_initiated),
                    to_i64(s.messages_sent),
                    to_i64(s.messages_delivered),
                    to_i64(s.messages_read),
                    to_i64(s.messages_failed),
                    s.estimated_cost,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get the summary for one tenant and day.
pub async fn get_summary(
    db: &Database,
    tenant_id: &str,
    date: &str,
) -> Result<Option<DailySummary>, HeraldError> {
    let tenant_id = tenant_id.to_string();
    let date = date.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT tenant_id, date, campaigns_initiated, messages_sent, messages_delivered,
                        messages_read, messages_failed, estimated_cost
                 FROM daily_summaries WHERE tenant_id = ?1 AND date = ?2",
                params![tenant_id, date],
                summary_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// All summaries for one day, by tenant.
pub async fn list_for_date(db: &Database, date: &str) -> Result<Vec<DailySummary>, HeraldError> {
    let date = date.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT tenant_id, date, campaigns_initiated, messages_sent, messages_delivered,
                        messages_read, messages_failed, estimated_cost
                 FROM daily_summaries WHERE date = ?1 ORDER BY tenant_id",
            )?;
            let rows = stmt.query_map(params![date], summary_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn summary(sent: u64, cost: f64) -> DailySummary {
        DailySummary {
            tenant_id: "t-1".into(),
            date: "2026-03-01".into(),
            campaigns_initiated: 1,
            messages_sent: sent,
            messages_delivered: 0,
            messages_read: 0,
            messages_failed: 2,
            estimated_cost: cost,
        }
    }

    #[tokio::test]
    async fn rerun_replaces_rather_than_adds() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("s.db").to_str().unwrap())
            .await
            .unwrap();

        upsert_summary(&db, &summary(10, 0.05)).await.unwrap();
        upsert_summary(&db, &summary(12, 0.06)).await.unwrap();

        let got = get_summary(&db, "t-1", "2026-03-01").await.unwrap().unwrap();
        assert_eq!(got, summary(12, 0.06));
        assert_eq!(list_for_date(&db, "2026-03-01").await.unwrap().len(), 1);
    }
}
