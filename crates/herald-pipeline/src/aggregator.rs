// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign progress and daily per-tenant rollups.

use std::time::Duration;

use chrono::NaiveDate;
use herald_config::model::{PricingConfig, RollupConfig};
use herald_core::{CampaignStats, DailySummary, HeraldError};
use herald_storage::queries::{campaigns, stats, summaries};
use herald_storage::Database;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// The user-visible outcome of a bulk send so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub sent: u64,
    pub failed: u64,
    /// Recipients skipped because the run stopped on quota.
    pub stopped: u64,
}

impl From<&CampaignStats> for RunSummary {
    fn from(stats: &CampaignStats) -> Self {
        Self {
            sent: stats.sent,
            failed: stats.failed_messages,
            stopped: stats.skipped,
        }
    }
}

/// Read-only campaign statistics and idempotent daily summaries.
#[derive(Clone)]
pub struct StatusAggregator {
    db: Database,
    pricing: PricingConfig,
}

impl StatusAggregator {
    pub fn new(db: Database, pricing: &PricingConfig) -> Self {
        Self {
            db,
            pricing: pricing.clone(),
        }
    }

    /// Progress of one campaign, computed from its batches.
    pub async fn campaign_stats(&self, campaign_id: &str) -> Result<CampaignStats, HeraldError> {
        if campaigns::get_campaign(&self.db, campaign_id).await?.is_none() {
            return Err(HeraldError::not_found("campaign", campaign_id));
        }
        stats::campaign_stats(&self.db, campaign_id).await
    }

    pub async fn run_summary(&self, campaign_id: &str) -> Result<RunSummary, HeraldError> {
        let stats = self.campaign_stats(campaign_id).await?;
        Ok(RunSummary::from(&stats))
    }

    /// Write one summary per active tenant for `date`, replacing any earlier
    /// rollup of the same day.
    pub async fn rollup_daily(&self, date: NaiveDate) -> Result<Vec<DailySummary>, HeraldError> {
        let day = date.format("%Y-%m-%d").to_string();
        let activity = stats::daily_activity(&self.db, &day).await?;

        let mut written = Vec::with_capacity(activity.len());
        for row in activity {
            let summary = DailySummary {
                estimated_cost: row.messages_sent as f64 * self.pricing.cost_per_message(row.plan),
                tenant_id: row.tenant_id,
                date: day.clone(),
                campaigns_initiated: row.campaigns_initiated,
                messages_sent: row.messages_sent,
                messages_delivered: row.messages_delivered,
                messages_read: row.messages_read,
                messages_failed: row.messages_failed,
            };
            summaries::upsert_summary(&self.db, &summary).await?;
            written.push(summary);
        }
        debug!(date = %day, tenants = written.len(), "daily rollup written");
        Ok(written)
    }
}

/// Periodically rolls up today and yesterday.
///
/// Yesterday is included so receipts arriving after midnight still reach
/// the previous day's summary.
pub struct RollupRunner {
    aggregator: StatusAggregator,
    interval: Duration,
}

impl RollupRunner {
    pub fn new(aggregator: StatusAggregator, config: &RollupConfig) -> Self {
        Self {
            aggregator,
            interval: Duration::from_secs(config.interval_secs.max(1)),
        }
    }

    pub async fn tick(&self) -> Result<usize, HeraldError> {
        let today = chrono::Utc::now().date_naive();
        let mut written = 0;
        if let Some(yesterday) = today.pred_opt() {
            written += self.aggregator.rollup_daily(yesterday).await?.len();
        }
        written += self.aggregator.rollup_daily(today).await?.len();
        Ok(written)
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "rollup runner started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "daily rollup failed");
                    }
                }
            }
        }
        info!("rollup runner stopped");
    }
}
