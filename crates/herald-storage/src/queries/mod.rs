// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for storage entities.

pub mod batches;
pub mod campaigns;
pub mod queue;
pub mod retries;
pub mod stats;
pub mod summaries;
pub mod tenants;

/// Map a TEXT column that failed to parse into a rusqlite conversion error.
pub(crate) fn conversion_err(
    column: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

/// Map a value that failed to serialize into a rusqlite conversion error.
pub(crate) fn to_sql_err(e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
}
