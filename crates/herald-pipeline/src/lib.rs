// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Herald bulk-send pipeline.
//!
//! A bulk request is pre-flighted against the tenant's quota, partitioned
//! into batches by the [`BatchPlanner`], and enqueued one job per batch.
//! [`BatchWorker`]s claim and run batches; recoverable failures are handed
//! to the [`RetryScheduler`] and drained by the [`RetryPoller`]. The
//! [`StatusAggregator`] reports campaign progress and writes daily rollups.

pub mod aggregator;
pub mod metrics;
pub mod planner;
pub mod retry;
pub mod runner;
pub mod shutdown;
pub mod submit;
pub mod worker;

pub use aggregator::{RollupRunner, RunSummary, StatusAggregator};
pub use planner::BatchPlanner;
pub use retry::{RetryPolicy, RetryScheduler};
pub use runner::{recover_abandoned, RetryPoller, WorkerPool};
pub use submit::{BulkSendRequest, BulkSendService, BulkSubmission};
pub use worker::{BatchRunReport, BatchWorker, JobOutcome, RetryResolution};
