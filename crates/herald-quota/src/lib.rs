// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant usage quotas for the Herald bulk-send pipeline.
//!
//! The [`UsageGuard`] resolves a tenant's plan limits from configuration and
//! enforces them through atomic conditional counter updates in storage.

pub mod guard;

pub use guard::{UsageDecision, UsageGuard};
