// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bulk-send entry point and operator actions on campaigns.
//!
//! A submission is rejected as a whole, before any record is written, when
//! its input is invalid or the tenant's remaining quota cannot cover every
//! recipient.

use std::sync::Arc;

use herald_core::types::{TemplateRef, VariableMapping};
use herald_core::{Campaign, Contact, HeraldError, JobQueue, RecipientStatus};
use herald_quota::UsageGuard;
use herald_storage::database::now_timestamp;
use herald_storage::queries::{batches, campaigns};
use herald_storage::{Database, ReceiptOutcome};
use serde::Serialize;
use tracing::{debug, info};

use crate::planner::{partition, BatchPlanner};

/// A request to send one template to many contacts.
#[derive(Debug, Clone)]
pub struct BulkSendRequest {
    /// Generated when absent.
    pub campaign_id: Option<String>,
    pub tenant_id: String,
    pub contacts: Vec<Contact>,
    pub template: TemplateRef,
    pub variables: VariableMapping,
}

/// An accepted bulk send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSubmission {
    pub campaign_id: String,
    pub job_ids: Vec<String>,
    pub total_recipients: u32,
}

/// Creates, plans, and enqueues campaigns; pauses and resumes them.
pub struct BulkSendService {
    db: Database,
    planner: BatchPlanner,
    guard: UsageGuard,
    queue: Arc<dyn JobQueue>,
}

impl BulkSendService {
    pub fn new(
        db: Database,
        planner: BatchPlanner,
        guard: UsageGuard,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            db,
            planner,
            guard,
            queue,
        }
    }

    /// Validate, pre-flight the quota, then create, plan, and enqueue.
    pub async fn submit(&self, request: BulkSendRequest) -> Result<BulkSubmission, HeraldError> {
        request.variables.validate(&request.template.placeholders)?;
        partition(&request.contacts, self.planner.batch_size())?;
        let total = u32::try_from(request.contacts.len())
            .map_err(|_| HeraldError::Validation("too many recipients".into()))?;

        self.guard
            .preflight(&request.tenant_id, u64::from(total))
            .await?
            .into_result()?;

        let campaign_id = request
            .campaign_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if campaigns::get_campaign(&self.db, &campaign_id).await?.is_some() {
            return Err(HeraldError::Conflict(format!(
                "campaign {campaign_id} already exists"
            )));
        }
        campaigns::create_campaign(
            &self.db,
            &Campaign {
                id: campaign_id.clone(),
                tenant_id: request.tenant_id.clone(),
                template: request.template.clone(),
                total_recipients: total,
                paused: false,
                planned_at: None,
                created_at: now_timestamp(),
            },
        )
        .await?;

        let planned = self
            .planner
            .plan(
                &campaign_id,
                &request.tenant_id,
                &request.contacts,
                &request.template,
                &request.variables,
            )
            .await?;

        let job_ids: Vec<String> = planned.into_iter().map(|b| b.job_id).collect();
        for job_id in &job_ids {
            self.queue.enqueue(job_id).await?;
        }
        batches::mark_queued(&self.db, &job_ids).await?;

        info!(
            campaign_id = %campaign_id,
            tenant_id = %request.tenant_id,
            recipients = total,
            batches = job_ids.len(),
            "bulk send accepted"
        );
        Ok(BulkSubmission {
            campaign_id,
            job_ids,
            total_recipients: total,
        })
    }

    /// Stop claims for a campaign. Returns how many batches were paused.
    pub async fn pause(&self, campaign_id: &str) -> Result<usize, HeraldError> {
        let paused = campaigns::set_paused(&self.db, campaign_id, true)
            .await?
            .ok_or_else(|| HeraldError::not_found("campaign", campaign_id))?;
        info!(campaign_id, batches = paused.len(), "campaign paused");
        Ok(paused.len())
    }

    /// Lift a pause and enqueue the campaign's waiting batches again.
    ///
    /// Deliveries dropped while paused are replaced here, including those of
    /// batches waiting on a batch-level retry.
    pub async fn resume(&self, campaign_id: &str) -> Result<usize, HeraldError> {
        let mut job_ids = campaigns::set_paused(&self.db, campaign_id, false)
            .await?
            .ok_or_else(|| HeraldError::not_found("campaign", campaign_id))?;
        let retryable = batches::list_batches(&self.db, campaign_id)
            .await?
            .into_iter()
            .filter(|b| b.can_retry())
            .map(|b| b.job_id);
        job_ids.extend(retryable);

        for job_id in &job_ids {
            self.queue.enqueue(job_id).await?;
        }
        info!(campaign_id, batches = job_ids.len(), "campaign resumed");
        Ok(job_ids.len())
    }

    /// Apply a delivery receipt reported by the provider.
    pub async fn record_receipt(
        &self,
        message_id: &str,
        status: RecipientStatus,
    ) -> Result<ReceiptOutcome, HeraldError> {
        if !matches!(status, RecipientStatus::Delivered | RecipientStatus::Read) {
            return Err(HeraldError::Validation(format!(
                "receipts carry delivered or read, not {status}"
            )));
        }
        let outcome = batches::apply_receipt(&self.db, message_id, status).await?;
        debug!(message_id, %status, ?outcome, "receipt processed");
        Ok(outcome)
    }
}
