// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant rows and atomic usage counter updates.
//!
//! Every reservation is a single conditional `UPDATE`, so two workers racing
//! for the last unit of quota can never both succeed.

use std::str::FromStr;

use herald_core::{HeraldError, Plan, QuotaReason, UsageCounters};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{MessageLimits, Reservation, Tenant};
use crate::queries::conversion_err;

/// Create a tenant, or change the plan of an existing one.
pub async fn upsert_tenant(db: &Database, id: &str, plan: Plan) -> Result<(), HeraldError> {
    let id = id.to_string();
    let plan = plan.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tenants (id, plan) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET plan = excluded.plan,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![id, plan],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a tenant by ID.
pub async fn get_tenant(db: &Database, id: &str) -> Result<Option<Tenant>, HeraldError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, plan, messages_today, messages_this_month, template_submissions_today
                 FROM tenants WHERE id = ?1",
                params![id],
                |row| {
                    let plan: String = row.get(1)?;
                    Ok(Tenant {
                        id: row.get(0)?,
                        plan: Plan::from_str(&plan).map_err(|e| conversion_err(1, e))?,
                        usage: UsageCounters {
                            messages_today: to_u64(row.get(2)?),
                            messages_this_month: to_u64(row.get(3)?),
                            template_submissions_today: to_u64(row.get(4)?),
                        },
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Reserve `count` messages against the daily and monthly counters.
///
/// Both counters move together or not at all. Returns `None` when the
/// tenant does not exist.
pub async fn reserve_messages(
    db: &Database,
    tenant_id: &str,
    count: u64,
    limits: MessageLimits,
) -> Result<Option<Reservation>, HeraldError> {
    let tenant_id = tenant_id.to_string();
    let n = to_i64(count);
    let daily = limits.daily.map(to_i64);
    let monthly = limits.monthly.map(to_i64);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tenants SET
                     messages_today = messages_today + ?2,
                     messages_this_month = messages_this_month + ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1
                   AND (?3 IS NULL OR messages_today + ?2 <= ?3)
                   AND (?4 IS NULL OR messages_this_month + ?2 <= ?4)",
                params![tenant_id, n, daily, monthly],
            )?;

            let counters = read_counters(conn, &tenant_id)?;
            let Some(usage) = counters else {
                return Ok(None);
            };
            if changed == 1 {
                return Ok(Some(Reservation::Reserved(usage)));
            }

            let denied = match (limits.daily, limits.monthly) {
                (Some(limit), _) if usage.messages_today + count > limit => Reservation::Denied {
                    reason: QuotaReason::DailyMessages,
                    current: usage.messages_today,
                    limit,
                },
                (_, Some(limit)) => Reservation::Denied {
                    reason: QuotaReason::MonthlyMessages,
                    current: usage.messages_this_month,
                    limit,
                },
                (Some(limit), None) => Reservation::Denied {
                    reason: QuotaReason::DailyMessages,
                    current: usage.messages_today,
                    limit,
                },
                (None, None) => Reservation::Reserved(usage),
            };
            Ok(Some(denied))
        })
        .await
        .map_err(map_tr_err)
}

/// Return `count` previously reserved messages. Counters never go below zero.
pub async fn release_messages(
    db: &Database,
    tenant_id: &str,
    count: u64,
) -> Result<(), HeraldError> {
    let tenant_id = tenant_id.to_string();
    let n = to_i64(count);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE tenants SET
                     messages_today = MAX(messages_today - ?2, 0),
                     messages_this_month = MAX(messages_this_month - ?2, 0),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![tenant_id, n],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Reserve one template submission. Returns `None` when the tenant does not exist.
pub async fn reserve_template_submission(
    db: &Database,
    tenant_id: &str,
    limit: Option<u64>,
) -> Result<Option<Reservation>, HeraldError> {
    let tenant_id = tenant_id.to_string();
    let bound = limit.map(to_i64);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tenants SET
                     template_submissions_today = template_submissions_today + 1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND (?2 IS NULL OR template_submissions_today + 1 <= ?2)",
                params![tenant_id, bound],
            )?;
            let Some(usage) = read_counters(conn, &tenant_id)? else {
                return Ok(None);
            };
            Ok(Some(match (changed, limit) {
                (1, _) | (_, None) => Reservation::Reserved(usage),
                (_, Some(limit)) => Reservation::Denied {
                    reason: QuotaReason::DailyTemplateSubmissions,
                    current: usage.template_submissions_today,
                    limit,
                },
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Zero the daily counters of every tenant. Returns the number of tenants reset.
pub async fn reset_daily(db: &Database) -> Result<usize, HeraldError> {
    db.connection()
        .call(|conn| {
            conn.execute(
                "UPDATE tenants SET messages_today = 0, template_submissions_today = 0,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                [],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Zero the monthly counter of every tenant. Returns the number of tenants reset.
pub async fn reset_monthly(db: &Database) -> Result<usize, HeraldError> {
    db.connection()
        .call(|conn| {
            conn.execute(
                "UPDATE tenants SET messages_this_month = 0,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                [],
            )
        })
        .await
        .map_err(map_tr_err)
}

fn read_counters(
    conn: &rusqlite::Connection,
    tenant_id: &str,
) -> Result<Option<UsageCounters>, rusqlite::Error> {
    conn.query_row(
        "SELECT messages_today, messages_this_month, template_submissions_today
         FROM tenants WHERE id = ?1",
        params![tenant_id],
        |row| {
            Ok(UsageCounters {
                messages_today: to_u64(row.get(0)?),
                messages_this_month: to_u64(row.get(1)?),
                template_submissions_today: to_u64(row.get(2)?),
            })
        },
    )
    .optional()
}

pub(crate) fn to_u64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

pub(crate) fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
