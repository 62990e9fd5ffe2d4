// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Herald bulk-send pipeline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, typed queries for tenants,
//! campaigns, batches, retries and summaries, and a crash-safe job queue.

pub mod database;
pub mod job_queue;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use job_queue::SqliteJobQueue;
pub use models::*;
