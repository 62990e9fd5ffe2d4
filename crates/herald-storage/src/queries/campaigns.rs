// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign CRUD and pause/resume.

use herald_core::types::{PlaceholderCounts, TemplateRef};
use herald_core::HeraldError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::Campaign;
use crate::queries::conversion_err;

/// Create a new, unplanned campaign.
pub async fn create_campaign(db: &Database, campaign: &Campaign) -> Result<(), HeraldError> {
    let campaign = campaign.clone();
    let placeholders = serde_json::to_string(&campaign.template.placeholders)?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO campaigns (id, tenant_id, template_id, template_name, language,
                     placeholders, total_recipients, paused, planned_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    campaign.id,
                    campaign.tenant_id,
                    campaign.template.id,
                    campaign.template.name,
                    campaign.template.language,
                    placeholders,
                    campaign.total_recipients,
                    campaign.paused,
                    campaign.planned_at,
                    campaign.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a campaign by ID.
pub async fn get_campaign(db: &Database, id: &str) -> Result<Option<Campaign>, HeraldError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, tenant_id, template_id, template_name, language, placeholders,
                        total_recipients, paused, planned_at, created_at
                 FROM campaigns WHERE id = ?1",
                params![id],
                |row| {
                    let placeholders: String = row.get(5)?;
                    let placeholders: PlaceholderCounts = serde_json::from_str(&placeholders)
                        .map_err(|e| conversion_err(5, e))?;
                    Ok(Campaign {
                        id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        template: TemplateRef {
                            id: row.get(2)?,
                            name: row.get(3)?,
                            language: row.get(4)?,
                            placeholders,
                        },
                        total_recipients: row.get(6)?,
                        paused: row.get(7)?,
                        planned_at: row.get(8)?,
                        created_at: row.get(9)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Pause or resume a campaign.
///
/// Pausing moves the campaign's `pending`/`queued` batches to `paused`;
/// resuming moves them to `queued`. Returns the job IDs of the batches that
/// moved, or `None` for an unknown campaign.
pub async fn set_paused(
    db: &Database,
    id: &str,
    paused: bool,
) -> Result<Option<Vec<String>>, HeraldError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE campaigns SET paused = ?2 WHERE id = ?1",
                params![id, paused],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            let (from, to) = if paused {
                ("('pending', 'queued')", "'paused'")
            } else {
                ("('paused')", "'queued'")
            };
            let job_ids = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT job_id FROM batches WHERE campaign_id = ?1 AND status IN {from}
                     ORDER BY batch_index"
                ))?;
                let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            tx.execute(
                &format!(
                    "UPDATE batches SET status = {to},
                     queued_at = CASE WHEN {to} = 'queued'
                         THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now') ELSE queued_at END
                     WHERE campaign_id = ?1 AND status IN {from}"
                ),
                params![id],
            )?;
            tx.commit()?;
            Ok(Some(job_ids))
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::tenants::upsert_tenant;
    use herald_core::Plan;
    use tempfile::tempdir;

    fn sample_campaign(id: &str) -> Campaign {
        Campaign {
            id: id.to_string(),
            tenant_id: "t-1".to_string(),
            template: TemplateRef {
                id: "tpl-1".to_string(),
                name: "order_update".to_string(),
                language: "en_US".to_string(),
                placeholders: PlaceholderCounts {
                    header: 0,
                    body: 2,
                    buttons: 0,
                },
            },
            total_recipients: 120,
            paused: false,
            planned_at: None,
            created_at: "2026-03-01T09:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trips_template() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("c.db").to_str().unwrap())
            .await
            .unwrap();
        upsert_tenant(&db, "t-1", Plan::Basic).await.unwrap();
        create_campaign(&db, &sample_campaign("c-1")).await.unwrap();

        let got = get_campaign(&db, "c-1").await.unwrap().unwrap();
        assert_eq!(got, sample_campaign("c-1"));
        assert!(get_campaign(&db, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pausing_unknown_campaign_returns_none() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("c.db").to_str().unwrap())
            .await
            .unwrap();
        assert!(set_paused(&db, "nope", true).await.unwrap().is_none());
    }
}
