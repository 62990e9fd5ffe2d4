// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `TestHarness` assembles planner, worker, retry poller, and aggregator
//! over a temp SQLite database and a [`MockSendClient`]. Pacing is off and
//! the queue lock is short so tests run in milliseconds.

use std::sync::Arc;
use std::time::Duration;

use herald_config::model::PlanLimits;
use herald_config::HeraldConfig;
use herald_core::types::{PlaceholderCounts, TemplateRef, VariableMapping};
use herald_core::{Batch, Contact, HeraldError, JobQueue, Plan, UsageCounters};
use herald_pipeline::{
    BatchPlanner, BatchWorker, BulkSendRequest, BulkSendService, BulkSubmission, RetryPolicy,
    RetryPoller, RetryScheduler, StatusAggregator, WorkerPool,
};
use herald_quota::UsageGuard;
use herald_storage::queries::{batches, tenants};
use herald_storage::{Database, SqliteJobQueue};

use crate::mock_send::MockSendClient;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: HeraldConfig,
    retry_policy: Option<RetryPolicy>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = HeraldConfig::default();
        config.worker.pacing_ms = 0;
        config.worker.poll_interval_ms = 10;
        config.retry.base_delay_secs = 0;
        config.retry.poll_interval_ms = 10;
        Self {
            config,
            retry_policy: None,
        }
    }

    /// Override the limits of the free plan, which [`TestHarness::add_tenant`]
    /// assigns by default.
    pub fn with_free_limits(mut self, limits: PlanLimits) -> Self {
        self.config.quota.plans.free = limits;
        self
    }

    /// Daily and monthly message cap of `daily` on the free plan.
    pub fn with_daily_limit(self, daily: u64) -> Self {
        self.with_free_limits(PlanLimits {
            daily_messages: Some(daily),
            monthly_messages: Some(daily * 30),
            daily_template_submissions: Some(5),
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.planner.batch_size = batch_size;
        self
    }

    /// Wait `pacing` between consecutive sends of a batch.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.config.worker.pacing_ms = u64::try_from(pacing.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Use an explicit retry policy instead of the zero-delay default.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, HeraldError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| HeraldError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");
        let mut config = self.config;
        config.storage.database_path = db_path.to_string_lossy().to_string();

        let db = Database::from_config(&config.storage).await?;
        let sender = Arc::new(MockSendClient::new());
        let queue = Arc::new(SqliteJobQueue::new(
            db.clone(),
            config.worker.lock_timeout_secs,
            config.planner.max_batch_attempts,
        ));
        let guard = UsageGuard::new(db.clone(), &config.quota);
        let policy = self
            .retry_policy
            .unwrap_or_else(|| RetryPolicy::from(&config.retry));
        let scheduler = RetryScheduler::new(db.clone(), policy);

        let worker = Arc::new(
            BatchWorker::new(
                db.clone(),
                sender.clone(),
                queue.clone(),
                guard.clone(),
                scheduler,
            )
            .with_pacing(config.worker.pacing()),
        );
        let planner = BatchPlanner::new(db.clone(), &config.planner);
        let service = BulkSendService::new(db.clone(), planner, guard.clone(), queue.clone());
        let aggregator = StatusAggregator::new(db.clone(), &config.pricing);
        let pool = WorkerPool::new(Arc::clone(&worker), &config.worker);
        let poller = RetryPoller::new(Arc::clone(&worker), &config.retry, &config.worker);

        Ok(TestHarness {
            db,
            sender,
            queue,
            guard,
            worker,
            service,
            aggregator,
            pool,
            poller,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a mock send client and temp storage.
pub struct TestHarness {
    /// Database on a temp file, removed on drop.
    pub db: Database,
    pub sender: Arc<MockSendClient>,
    pub queue: Arc<SqliteJobQueue>,
    pub guard: UsageGuard,
    pub worker: Arc<BatchWorker>,
    pub service: BulkSendService,
    pub aggregator: StatusAggregator,
    pub pool: WorkerPool,
    pub poller: RetryPoller,
    pub config: HeraldConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default limits.
    pub async fn new() -> Result<Self, HeraldError> {
        Self::builder().build().await
    }

    pub async fn add_tenant(&self, id: &str) -> Result<(), HeraldError> {
        self.add_tenant_on(id, Plan::Free).await
    }

    pub async fn add_tenant_on(&self, id: &str, plan: Plan) -> Result<(), HeraldError> {
        tenants::upsert_tenant(&self.db, id, plan).await
    }

    /// Reserve `count` messages directly, as earlier sends would have.
    pub async fn consume_quota(&self, tenant_id: &str, count: u64) -> Result<(), HeraldError> {
        self.guard
            .check_and_reserve(tenant_id, count)
            .await?
            .into_result()
            .map(|_| ())
    }

    pub async fn usage(&self, tenant_id: &str) -> Result<UsageCounters, HeraldError> {
        let tenant = tenants::get_tenant(&self.db, tenant_id)
            .await?
            .ok_or_else(|| HeraldError::not_found("tenant", tenant_id))?;
        Ok(tenant.usage)
    }

    /// Submit a bulk send of a placeholder-free template.
    pub async fn submit(
        &self,
        tenant_id: &str,
        contacts: Vec<Contact>,
    ) -> Result<BulkSubmission, HeraldError> {
        self.service
            .submit(BulkSendRequest {
                campaign_id: None,
                tenant_id: tenant_id.to_string(),
                contacts,
                template: template(),
                variables: VariableMapping::default(),
            })
            .await
    }

    /// Process queued jobs until the queue is empty.
    pub async fn drain(&self) -> Result<usize, HeraldError> {
        self.pool.drain().await
    }

    /// Poll the retry schedule until no entry of `job_id` is outstanding.
    ///
    /// Gives up after `max_polls` polls spaced 5 ms apart.
    pub async fn settle_retries(&self, job_id: &str, max_polls: usize) -> Result<(), HeraldError> {
        for _ in 0..max_polls {
            if self.worker.retries().outstanding(job_id).await? == 0 {
                return Ok(());
            }
            self.poller.poll_once().await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Err(HeraldError::Internal(format!(
            "retries of {job_id} still outstanding after {max_polls} polls"
        )))
    }

    pub async fn batch(&self, job_id: &str) -> Result<Batch, HeraldError> {
        batches::get_batch(&self.db, job_id)
            .await?
            .ok_or_else(|| HeraldError::not_found("batch", job_id))
    }

    pub fn job_queue(&self) -> Arc<dyn JobQueue> {
        self.queue.clone()
    }
}

/// `n` distinct contacts, phones `+15550000000`, `+15550000001`, ...
pub fn contacts(n: usize) -> Vec<Contact> {
    (0..n)
        .map(|i| Contact::new(format!("contact-{i}"), format!("+1555{i:07}")))
        .collect()
}

fn template() -> TemplateRef {
    TemplateRef {
        id: "tpl-test".into(),
        name: "test_template".into(),
        language: "en_US".into(),
        placeholders: PlaceholderCounts::default(),
    }
}
