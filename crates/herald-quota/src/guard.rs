// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage enforcement with daily and monthly caps.
//!
//! Limits come from the plan table in `QuotaConfig`; counters live in the
//! tenants table and only ever change through a single conditional
//! `UPDATE`. A `tracing::warn` is emitted once usage crosses the configured
//! warn ratio (80% by default) of any cap.

use herald_config::model::{PlanLimits, PlanTable, QuotaConfig};
use herald_core::{HeraldError, QuotaReason, UsageCounters};
use herald_storage::queries::tenants;
use herald_storage::{Database, MessageLimits, Reservation, Tenant};
use tracing::{debug, warn};

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageDecision {
    /// Within limits. Carries the counters after the check (after the
    /// increment for a reservation).
    Allow(UsageCounters),
    Deny {
        reason: QuotaReason,
        current: u64,
        limit: u64,
    },
}

impl UsageDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    /// Turn a denial into [`HeraldError::QuotaExceeded`].
    pub fn into_result(self) -> Result<UsageCounters, HeraldError> {
        match self {
            Self::Allow(usage) => Ok(usage),
            Self::Deny {
                reason,
                current,
                limit,
            } => Err(HeraldError::QuotaExceeded {
                reason,
                current,
                limit,
            }),
        }
    }
}

impl From<Reservation> for UsageDecision {
    fn from(r: Reservation) -> Self {
        match r {
            Reservation::Reserved(usage) => Self::Allow(usage),
            Reservation::Denied {
                reason,
                current,
                limit,
            } => Self::Deny {
                reason,
                current,
                limit,
            },
        }
    }
}

/// Tracks and enforces per-tenant send and template-submission quotas.
#[derive(Clone)]
pub struct UsageGuard {
    db: Database,
    plans: PlanTable,
    warn_ratio: f64,
}

impl UsageGuard {
    pub fn new(db: Database, config: &QuotaConfig) -> Self {
        Self {
            db,
            plans: config.plans.clone(),
            warn_ratio: config.warn_ratio,
        }
    }

    async fn tenant(&self, tenant_id: &str) -> Result<(Tenant, PlanLimits), HeraldError> {
        let tenant = tenants::get_tenant(&self.db, tenant_id)
            .await?
            .ok_or_else(|| HeraldError::not_found("tenant", tenant_id))?;
        let limits = self.plans.limits_for(tenant.plan);
        Ok((tenant, limits))
    }

    /// Whether `count` more messages fit the tenant's limits. Changes nothing.
    ///
    /// Used before a campaign starts so an over-quota bulk request is
    /// rejected before any send.
    pub async fn preflight(&self, tenant_id: &str, count: u64) -> Result<UsageDecision, HeraldError> {
        let (tenant, limits) = self.tenant(tenant_id).await?;
        let usage = tenant.usage;
        let checks = [
            (QuotaReason::DailyMessages, usage.messages_today, limits.daily_messages),
            (QuotaReason::MonthlyMessages, usage.messages_this_month, limits.monthly_messages),
        ];
        for (reason, current, limit) in checks {
            if let Some(limit) = limit
                && current + count > limit
            {
                debug!(tenant_id, %reason, current, limit, count, "pre-flight quota check failed");
                return Ok(UsageDecision::Deny {
                    reason,
                    current,
                    limit,
                });
            }
        }
        Ok(UsageDecision::Allow(usage))
    }

    /// Atomically reserve `count` messages for the tenant.
    ///
    /// Either both the daily and monthly counters move by `count` or neither
    /// does. A reservation that is not used must be [`release`](Self::release)d.
    pub async fn check_and_reserve(
        &self,
        tenant_id: &str,
        count: u64,
    ) -> Result<UsageDecision, HeraldError> {
        let (_, limits) = self.tenant(tenant_id).await?;
        let reservation = tenants::reserve_messages(
            &self.db,
            tenant_id,
            count,
            MessageLimits {
                daily: limits.daily_messages,
                monthly: limits.monthly_messages,
            },
        )
        .await?
        .ok_or_else(|| HeraldError::not_found("tenant", tenant_id))?;

        let decision = UsageDecision::from(reservation);
        match decision {
            UsageDecision::Allow(usage) => self.warn_if_near(tenant_id, &usage, &limits),
            UsageDecision::Deny {
                reason,
                current,
                limit,
            } => {
                warn!(tenant_id, %reason, current, limit, "message quota exhausted");
            }
        }
        Ok(decision)
    }

    /// Return `count` reserved but unused messages.
    pub async fn release(&self, tenant_id: &str, count: u64) -> Result<(), HeraldError> {
        tenants::release_messages(&self.db, tenant_id, count).await
    }

    /// Reserve one template submission against the separate daily counter.
    pub async fn check_template_submission(
        &self,
        tenant_id: &str,
    ) -> Result<UsageDecision, HeraldError> {
        let (_, limits) = self.tenant(tenant_id).await?;
        let reservation = tenants::reserve_template_submission(
            &self.db,
            tenant_id,
            limits.daily_template_submissions,
        )
        .await?
        .ok_or_else(|| HeraldError::not_found("tenant", tenant_id))?;
        Ok(reservation.into())
    }

    /// Zero every tenant's daily counters. Called by the external daily job.
    pub async fn reset_daily(&self) -> Result<usize, HeraldError> {
        let reset = tenants::reset_daily(&self.db).await?;
        debug!(tenants = reset, "daily usage counters reset");
        Ok(reset)
    }

    /// Zero every tenant's monthly counter. Called by the external monthly job.
    pub async fn reset_monthly(&self) -> Result<usize, HeraldError> {
        let reset = tenants::reset_monthly(&self.db).await?;
        debug!(tenants = reset, "monthly usage counters reset");
        Ok(reset)
    }

    fn warn_if_near(&self, tenant_id: &str, usage: &UsageCounters, limits: &PlanLimits) {
        if let Some(cap) = limits.daily_messages
            && usage.messages_today as f64 >= cap as f64 * self.warn_ratio
        {
            warn!(
                tenant_id,
                messages_today = usage.messages_today,
                daily_cap = cap,
                "approaching daily message cap"
            );
        }
        if let Some(cap) = limits.monthly_messages
            && usage.messages_this_month as f64 >= cap as f64 * self.warn_ratio
        {
            warn!(
                tenant_id,
                messages_this_month = usage.messages_this_month,
                monthly_cap = cap,
                "approaching monthly message cap"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::Plan;
    use tempfile::tempdir;

    async fn guard_with(limits: PlanLimits) -> (UsageGuard, Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("quota.db").to_str().unwrap())
            .await
            .unwrap();
        tenants::upsert_tenant(&db, "t-1", Plan::Free).await.unwrap();
        let mut config = QuotaConfig::default();
        config.plans.free = limits;
        (UsageGuard::new(db.clone(), &config), db, dir)
    }

    fn daily(n: u64) -> PlanLimits {
        PlanLimits {
            daily_messages: Some(n),
            monthly_messages: Some(n * 30),
            daily_template_submissions: Some(1),
        }
    }

    #[tokio::test]
    async fn preflight_rejects_without_changing_counters() {
        let (guard, db, _dir) = guard_with(daily(100)).await;
        let decision = guard.preflight("t-1", 150).await.unwrap();
        assert_eq!(
            decision,
            UsageDecision::Deny {
                reason: QuotaReason::DailyMessages,
                current: 0,
                limit: 100,
            }
        );
        let usage = tenants::get_tenant(&db, "t-1").await.unwrap().unwrap().usage;
        assert_eq!(usage, UsageCounters::default());
        assert!(guard.preflight("t-1", 100).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn reservations_stop_at_the_limit() {
        let (guard, _db, _dir) = guard_with(daily(2)).await;
        assert!(guard.check_and_reserve("t-1", 1).await.unwrap().is_allowed());
        assert!(guard.check_and_reserve("t-1", 1).await.unwrap().is_allowed());
        let denied = guard.check_and_reserve("t-1", 1).await.unwrap();
        let err = denied.into_result().unwrap_err();
        assert!(matches!(err, HeraldError::QuotaExceeded { current: 2, limit: 2, .. }));

        guard.release("t-1", 1).await.unwrap();
        assert!(guard.check_and_reserve("t-1", 1).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn concurrent_reservations_never_overshoot() {
        let (guard, db, _dir) = guard_with(daily(10)).await;
        let mut handles = Vec::new();
        for _ in 0..25 {
            let g = guard.clone();
            handles.push(tokio::spawn(async move { g.check_and_reserve("t-1", 1).await }));
        }
        let mut allowed = 0;
        for h in handles {
            if h.await.unwrap().unwrap().is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
        let usage = tenants::get_tenant(&db, "t-1").await.unwrap().unwrap().usage;
        assert_eq!(usage.messages_today, 10);
    }

    #[tokio::test]
    async fn unknown_tenant_is_not_found() {
        let (guard, _db, _dir) = guard_with(daily(1)).await;
        let err = guard.check_and_reserve("ghost", 1).await.unwrap_err();
        assert!(matches!(err, HeraldError::NotFound { .. }));
    }

    #[tokio::test]
    async fn template_submissions_are_limited_separately() {
        let (guard, _db, _dir) = guard_with(daily(100)).await;
        assert!(guard.check_template_submission("t-1").await.unwrap().is_allowed());
        let second = guard.check_template_submission("t-1").await.unwrap();
        assert!(matches!(
            second,
            UsageDecision::Deny {
                reason: QuotaReason::DailyTemplateSubmissions,
                ..
            }
        ));
        assert!(guard.check_and_reserve("t-1", 1).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn enterprise_plan_is_unlimited() {
        let (guard, db, _dir) = guard_with(daily(1)).await;
        tenants::upsert_tenant(&db, "t-1", Plan::Enterprise).await.unwrap();
        assert!(guard.preflight("t-1", 1_000_000).await.unwrap().is_allowed());
        assert!(guard.check_and_reserve("t-1", 5_000).await.unwrap().is_allowed());
    }
}
