// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Herald integration tests.
//!
//! Provides a scripted send client and a harness that wires the whole
//! pipeline over a temporary SQLite database, for fast, deterministic tests
//! without a provider account.
//!
//! # Components
//!
//! - [`MockSendClient`] - Send client with per-phone scripted outcomes and call capture
//! - [`TestHarness`] - Planner, worker, retry poller, and aggregator on a temp database

pub mod harness;
pub mod mock_send;

pub use harness::{contacts, TestHarness};
pub use mock_send::{MockOutcome, MockSendClient};
