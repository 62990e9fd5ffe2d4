// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Herald bulk-send pipeline.
//!
//! This crate provides the domain model shared by every pipeline stage
//! (campaigns, batches, recipients, usage counters, summaries), the single
//! error type used across the workspace, and the traits at the two
//! collaborator boundaries: the provider [`SendClient`] and the [`JobQueue`].

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::HeraldError;
pub use types::{
    Batch, BatchStats, BatchStatus, Campaign, CampaignStats, Contact, DailySummary, ErrorCode,
    HealthStatus, Plan, PlaceholderCounts, QuotaReason, Recipient, RecipientStatus, TemplateRef,
    UsageCounters, VariableMapping,
};

pub use traits::{
    FailureDisposition, Job, JobQueue, SendClient, SendError, SendErrorKind, SendReceipt,
    SendRequest,
};
