// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as batch bounds, backoff ordering, and listen addresses.

use crate::diagnostic::ConfigError;
use crate::model::HeraldConfig;

/// Largest batch the planner accepts.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &HeraldConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if !matches!(
        config.service.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        invalid(format!(
            "service.log_level must be one of trace, debug, info, warn, error, got `{}`",
            config.service.log_level
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    if config.planner.batch_size == 0 || config.planner.batch_size > MAX_BATCH_SIZE {
        invalid(format!(
            "planner.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
            config.planner.batch_size
        ));
    }

    if config.planner.max_batch_attempts < 1 {
        invalid("planner.max_batch_attempts must be at least 1, got 0".to_string());
    }

    if config.worker.concurrency < 1 {
        invalid("worker.concurrency must be at least 1, got 0".to_string());
    }

    if config.worker.lock_timeout_secs == 0 {
        invalid("worker.lock_timeout_secs must be positive".to_string());
    }

    let retry = &config.retry;
    if retry.max_attempts < 1 {
        invalid("retry.max_attempts must be at least 1, got 0".to_string());
    }
    if retry.base_delay_secs > retry.max_delay_secs {
        invalid(format!(
            "retry.base_delay_secs ({}) must not exceed retry.max_delay_secs ({})",
            retry.base_delay_secs, retry.max_delay_secs
        ));
    }
    if !(0.0..1.0).contains(&retry.jitter_factor) {
        invalid(format!(
            "retry.jitter_factor must be in [0.0, 1.0), got {}",
            retry.jitter_factor
        ));
    }
    if retry.poll_limit == 0 {
        invalid("retry.poll_limit must be at least 1, got 0".to_string());
    }

    if !(config.quota.warn_ratio > 0.0 && config.quota.warn_ratio <= 1.0) {
        invalid(format!(
            "quota.warn_ratio must be in (0.0, 1.0], got {}",
            config.quota.warn_ratio
        ));
    }

    for (plan, limits) in config.quota.plans.entries() {
        if let (Some(daily), Some(monthly)) = (limits.daily_messages, limits.monthly_messages)
            && daily > monthly
        {
            invalid(format!(
                "quota.plans.{plan}.daily_messages ({daily}) exceeds monthly_messages ({monthly})"
            ));
        }
    }

    let pricing = [
        ("free", config.pricing.free),
        ("basic", config.pricing.basic),
        ("premium", config.pricing.premium),
        ("enterprise", config.pricing.enterprise),
    ];
    for (plan, cost) in pricing {
        if cost < 0.0 || !cost.is_finite() {
            invalid(format!("pricing.{plan} must be non-negative, got {cost}"));
        }
    }

    if config.rollup.enabled && config.rollup.interval_secs == 0 {
        invalid("rollup.interval_secs must be positive when rollup is enabled".to_string());
    }

    let base_url = config.whatsapp.api_base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        invalid(format!(
            "whatsapp.api_base_url `{base_url}` must start with http:// or https://"
        ));
    }
    if config.whatsapp.request_timeout_secs == 0 {
        invalid("whatsapp.request_timeout_secs must be positive".to_string());
    }
    for (tenant, account) in &config.whatsapp.accounts {
        if account.phone_number_id.trim().is_empty() || account.access_token.trim().is_empty() {
            invalid(format!(
                "whatsapp.accounts.{tenant} needs both phone_number_id and access_token"
            ));
        }
    }

    if config.metrics.enabled
        && config
            .metrics
            .listen_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        invalid(format!(
            "metrics.listen_address `{}` is not a valid socket address",
            config.metrics.listen_address
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
