// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `herald stats` and `herald rollup` command implementations.

use chrono::NaiveDate;
use herald_config::HeraldConfig;
use herald_core::{CampaignStats, DailySummary, HeraldError};
use herald_pipeline::{RunSummary, StatusAggregator};
use herald_storage::Database;
use serde::Serialize;

/// Structured output for `herald stats --json`.
#[derive(Debug, Serialize)]
struct StatsOutput<'a> {
    campaign_id: &'a str,
    summary: RunSummary,
    stats: CampaignStats,
}

/// Run the `herald stats` command.
pub async fn run_stats(
    config: &HeraldConfig,
    campaign_id: &str,
    json: bool,
) -> Result<(), HeraldError> {
    let db = Database::from_config(&config.storage).await?;
    let aggregator = StatusAggregator::new(db, &config.pricing);
    let stats = aggregator.campaign_stats(campaign_id).await?;
    let summary = RunSummary::from(&stats);

    if json {
        let output = StatsOutput {
            campaign_id,
            summary,
            stats,
        };
        let rendered = serde_json::to_string_pretty(&output)
            .map_err(|e| HeraldError::Internal(format!("failed to render stats: {e}")))?;
        println!("{rendered}");
    } else {
        print!("{}", format_stats(campaign_id, &stats));
    }
    Ok(())
}

/// Run the `herald rollup` command for `date`, or today (UTC) when unset.
pub async fn run_rollup(config: &HeraldConfig, date: Option<NaiveDate>) -> Result<(), HeraldError> {
    let date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let db = Database::from_config(&config.storage).await?;
    let aggregator = StatusAggregator::new(db, &config.pricing);
    let rows = aggregator.rollup_daily(date).await?;

    println!("rollup {date}: {} tenant(s)", rows.len());
    for row in &rows {
        println!("{}", format_summary_row(row));
    }
    Ok(())
}

fn format_stats(campaign_id: &str, s: &CampaignStats) -> String {
    format!(
        "campaign  {campaign_id}\n\
         batches   {} total, {} completed, {} failed, {} processing, {} pending, {} paused\n\
         messages  {} sent, {} delivered, {} read, {} failed, {} stopped\n",
        s.total_batches,
        s.completed,
        s.failed,
        s.processing,
        s.pending,
        s.paused,
        s.sent,
        s.delivered,
        s.read,
        s.failed_messages,
        s.skipped,
    )
}

fn format_summary_row(row: &DailySummary) -> String {
    format!(
        "  {:<24} campaigns={} sent={} delivered={} read={} failed={} cost={:.4}",
        row.tenant_id,
        row.campaigns_initiated,
        row.messages_sent,
        row.messages_delivered,
        row.messages_read,
        row.messages_failed,
        row.estimated_cost,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_table_lists_batches_and_messages() {
        let stats = CampaignStats {
            total_batches: 3,
            completed: 2,
            failed: 1,
            sent: 95,
            failed_messages: 3,
            skipped: 2,
            ..CampaignStats::default()
        };
        let out = format_stats("c-1", &stats);
        assert!(out.contains("3 total, 2 completed, 1 failed"));
        assert!(out.contains("95 sent"));
        assert!(out.contains("3 failed, 2 stopped"));
    }

    #[tokio::test]
    async fn stats_for_unknown_campaign_fail() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HeraldConfig::default();
        config.storage.database_path = dir.path().join("h.db").to_string_lossy().to_string();

        let err = run_stats(&config, "missing", false).await.unwrap_err();
        assert!(matches!(err, HeraldError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rollup_of_empty_day_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HeraldConfig::default();
        config.storage.database_path = dir.path().join("h.db").to_string_lossy().to_string();

        let date = NaiveDate::from_ymd_opt(2026, 1, 15);
        run_rollup(&config, date).await.unwrap();
    }
}
