// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator boundaries of the pipeline.
//!
//! Both traits use `#[async_trait]` so workers can hold them as
//! `Arc<dyn _>` handles passed in at construction time.

pub mod queue;
pub mod send;

pub use queue::{Job, JobQueue};
pub use send::{FailureDisposition, SendClient, SendError, SendErrorKind, SendReceipt, SendRequest};
