// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic partitioning of a campaign's recipients into batches.

use herald_config::model::PlannerConfig;
use herald_core::types::{BatchStats, TemplateRef, VariableMapping};
use herald_core::{Batch, BatchStatus, Contact, HeraldError, Recipient};
use herald_storage::queries::batches;
use herald_storage::{Database, PlanInsert};
use tracing::info;

/// Split `contacts` into consecutive chunks of `batch_size`.
///
/// The last chunk may be smaller. An empty list or a zero batch size is a
/// validation error.
pub fn partition(contacts: &[Contact], batch_size: usize) -> Result<Vec<&[Contact]>, HeraldError> {
    if contacts.is_empty() {
        return Err(HeraldError::Validation(
            "recipient list must not be empty".into(),
        ));
    }
    if batch_size == 0 {
        return Err(HeraldError::Validation(
            "batch size must be greater than zero".into(),
        ));
    }
    Ok(contacts.chunks(batch_size).collect())
}

/// Build the batch records of a campaign without persisting them.
pub fn build_batches(
    campaign_id: &str,
    tenant_id: &str,
    contacts: &[Contact],
    template: &TemplateRef,
    mapping: &VariableMapping,
    batch_size: usize,
    max_attempts: u32,
) -> Result<Vec<Batch>, HeraldError> {
    mapping.validate(&template.placeholders)?;
    let chunks = partition(contacts, batch_size)?;
    let total_batches = u32::try_from(chunks.len())
        .map_err(|_| HeraldError::Validation("too many batches".into()))?;

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let batch_index = u32::try_from(index)
                .map_err(|_| HeraldError::Validation("too many batches".into()))?;
            let recipients: Vec<Recipient> = chunk.iter().map(Recipient::pending).collect();
            Ok(Batch {
                job_id: Batch::job_id_for(campaign_id, batch_index),
                campaign_id: campaign_id.to_string(),
                tenant_id: tenant_id.to_string(),
                batch_index,
                total_batches,
                recipient_count: recipients.len() as u32,
                recipients,
                status: BatchStatus::Pending,
                stats: BatchStats::default(),
                attempts: 0,
                max_attempts,
                last_error: None,
                error_code: None,
                template_id: template.id.clone(),
                template_name: template.name.clone(),
                language: template.language.clone(),
                variable_mapping: mapping.clone(),
                queued_at: None,
                started_at: None,
                last_attempt_at: None,
                completed_at: None,
            })
        })
        .collect()
}

/// Persists a campaign's batches in one transaction.
#[derive(Clone)]
pub struct BatchPlanner {
    db: Database,
    batch_size: usize,
    max_attempts: u32,
}

impl BatchPlanner {
    pub fn new(db: Database, config: &PlannerConfig) -> Self {
        Self {
            db,
            batch_size: config.batch_size,
            max_attempts: config.max_batch_attempts,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Plan with the configured batch size.
    pub async fn plan(
        &self,
        campaign_id: &str,
        tenant_id: &str,
        contacts: &[Contact],
        template: &TemplateRef,
        mapping: &VariableMapping,
    ) -> Result<Vec<Batch>, HeraldError> {
        self.plan_with_size(campaign_id, tenant_id, contacts, template, mapping, self.batch_size)
            .await
    }

    /// Partition and persist. The campaign is marked planned in the same
    /// transaction; a second plan of the same campaign is a conflict.
    pub async fn plan_with_size(
        &self,
        campaign_id: &str,
        tenant_id: &str,
        contacts: &[Contact],
        template: &TemplateRef,
        mapping: &VariableMapping,
        batch_size: usize,
    ) -> Result<Vec<Batch>, HeraldError> {
        let planned = build_batches(
            campaign_id,
            tenant_id,
            contacts,
            template,
            mapping,
            batch_size,
            self.max_attempts,
        )?;

        match batches::insert_plan(&self.db, campaign_id, &planned).await? {
            PlanInsert::Inserted => {}
            PlanInsert::AlreadyPlanned => {
                return Err(HeraldError::Conflict(format!(
                    "campaign {campaign_id} is already planned"
                )));
            }
            PlanInsert::UnknownCampaign => {
                return Err(HeraldError::not_found("campaign", campaign_id));
            }
        }

        info!(
            campaign_id,
            tenant_id,
            recipients = contacts.len(),
            batches = planned.len(),
            batch_size,
            "campaign planned"
        );
        Ok(planned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::PlaceholderCounts;
    use proptest::prelude::*;

    fn contacts(n: usize) -> Vec<Contact> {
        (0..n)
            .map(|i| Contact::new(format!("k-{i}"), format!("+1555{i:07}")))
            .collect()
    }

    fn template(body: usize) -> TemplateRef {
        TemplateRef {
            id: "tpl-1".into(),
            name: "promo".into(),
            language: "en".into(),
            placeholders: PlaceholderCounts {
                header: 0,
                body,
                buttons: 0,
            },
        }
    }

    #[test]
    fn hundred_twenty_recipients_make_three_batches() {
        let list = contacts(120);
        let batches = build_batches(
            "c-1",
            "t-1",
            &list,
            &template(0),
            &VariableMapping::default(),
            50,
            3,
        )
        .unwrap();
        let sizes: Vec<u32> = batches.iter().map(|b| b.recipient_count).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
        assert!(batches.iter().all(|b| b.total_batches == 3));
        assert_eq!(batches[2].job_id, "c-1:2");
        assert_eq!(batches[2].recipients[0].contact_id, "k-100");
    }

    #[test]
    fn empty_list_and_zero_size_are_rejected() {
        assert!(matches!(
            partition(&[], 50),
            Err(HeraldError::Validation(_))
        ));
        assert!(matches!(
            partition(&contacts(3), 0),
            Err(HeraldError::Validation(_))
        ));
    }

    #[test]
    fn mapping_is_checked_before_partitioning() {
        let err = build_batches(
            "c-1",
            "t-1",
            &contacts(2),
            &template(1),
            &VariableMapping::default(),
            50,
            3,
        )
        .unwrap_err();
        assert!(matches!(err, HeraldError::Validation(_)));
    }

    proptest! {
        #[test]
        fn partition_preserves_order_and_sizes(n in 1usize..600, size in 1usize..120) {
            let list = contacts(n);
            let chunks = partition(&list, size).unwrap();

            prop_assert_eq!(chunks.len(), n.div_ceil(size));
            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
            prop_assert!(chunks[..chunks.len() - 1].iter().all(|c| c.len() == size));

            let flattened: Vec<&Contact> = chunks.iter().flat_map(|c| c.iter()).collect();
            prop_assert_eq!(flattened.len(), n);
            prop_assert!(flattened.iter().zip(&list).all(|(a, b)| *a == b));
        }
    }
}
