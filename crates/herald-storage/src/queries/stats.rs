// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only aggregate queries over batch state.

use std::str::FromStr;

use herald_core::{CampaignStats, HeraldError, Plan};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::DailyActivity;
use crate::queries::conversion_err;
use crate::queries::tenants::to_u64;

/// Campaign progress from one aggregate query over its batches.
pub async fn campaign_stats(db: &Database, campaign_id: &str) -> Result<CampaignStats, HeraldError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status = 'completed'), 0),
                        COALESCE(SUM(status = 'failed'), 0),
                        COALESCE(SUM(status = 'processing'), 0),
                        COALESCE(SUM(status IN ('pending', 'queued')), 0),
                        COALESCE(SUM(status = 'paused'), 0),
                        COALESCE(SUM(sent), 0),
                        COALESCE(SUM(delivered), 0),
                        COALESCE(SUM(read_count), 0),
                        COALESCE(SUM(failed), 0),
                        COALESCE(SUM(skipped), 0)
                 FROM batches WHERE campaign_id = ?1",
                params![campaign_id],
                |row| {
                    Ok(CampaignStats {
                        total_batches: row.get(0)?,
                        completed: row.get(1)?,
                        failed: row.get(2)?,
                        processing: row.get(3)?,
                        pending: row.get(4)?,
                        paused: row.get(5)?,
                        sent: to_u64(row.get(6)?),
                        delivered: to_u64(row.get(7)?),
                        read: to_u64(row.get(8)?),
                        failed_messages: to_u64(row.get(9)?),
                        skipped: to_u64(row.get(10)?),
                    })
                },
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Per-tenant activity on `date` (`YYYY-MM-DD`, UTC).
///
/// Messages are attributed to the day their recipient was last processed.
/// Tenants with no activity on that day are omitted.
pub async fn daily_activity(db: &Database, date: &str) -> Result<Vec<DailyActivity>, HeraldError> {
    let date = date.to_string();
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.plan,
                        (SELECT COUNT(*) FROM campaigns c
                         WHERE c.tenant_id = t.id AND substr(c.created_at, 1, 10) = ?1),
                        COALESCE(m.sent, 0), COALESCE(m.delivered, 0),
                        COALESCE(m.read, 0), COALESCE(m.failed, 0)
                 FROM tenants t
                 LEFT JOIN (
                     SELECT b.tenant_id AS tenant_id,
                            SUM(json_extract(r.value, '$.status') IN ('sent', 'delivered', 'read')) AS sent,
                            SUM(json_extract(r.value, '$.status') IN ('delivered', 'read')) AS delivered,
                            SUM(json_extract(r.value, '$.status') = 'read') AS read,
                            SUM(json_extract(r.value, '$.status') = 'failed') AS failed
                     FROM batches b, json_each(b.recipients) r
                     WHERE substr(json_extract(r.value, '$.processed_at'), 1, 10) = ?1
                     GROUP BY b.tenant_id
                 ) m ON m.tenant_id = t.id
                 ORDER BY t.id",
            )?;
            let rows = stmt.query_map(params![date], |row| {
                let plan: String = row.get(1)?;
                Ok(DailyActivity {
                    tenant_id: row.get(0)?,
                    plan: Plan::from_str(&plan).map_err(|e| conversion_err(1, e))?,
                    campaigns_initiated: to_u64(row.get(2)?),
                    messages_sent: to_u64(row.get(3)?),
                    messages_delivered: to_u64(row.get(4)?),
                    messages_read: to_u64(row.get(5)?),
                    messages_failed: to_u64(row.get(6)?),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;

    Ok(rows
        .into_iter()
        .filter(|a| {
            a.campaigns_initiated + a.messages_sent + a.messages_failed > 0
        })
        .collect())
}
