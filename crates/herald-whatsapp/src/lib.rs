// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API adapter for Herald.
//!
//! [`CloudApiClient`] implements [`herald_core::SendClient`] by posting
//! template messages to the Graph API and mapping failures onto
//! [`herald_core::SendErrorKind`].

pub mod classify;
pub mod client;
pub mod types;

pub use classify::{classify_response, classify_transport};
pub use client::CloudApiClient;
