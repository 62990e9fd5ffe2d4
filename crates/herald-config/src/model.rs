// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Herald pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::HashMap;
use std::time::Duration;

use herald_core::Plan;
use serde::{Deserialize, Serialize};

/// Top-level Herald configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeraldConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Batch planning settings.
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Batch worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Recipient retry settings.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-plan usage limits.
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Per-message cost estimates used by daily rollups.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Daily summary rollup schedule.
    #[serde(default)]
    pub rollup: RollupConfig,

    /// WhatsApp Cloud API settings.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name, used as the queue lock holder in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "herald".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("herald").join("herald.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("herald.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Batch planning configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerConfig {
    /// Recipients per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Claims allowed per batch before it is terminally failed.
    #[serde(default = "default_max_attempts")]
    pub max_batch_attempts: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batch_attempts: default_max_attempts(),
        }
    }
}

fn default_batch_size() -> usize {
    herald_core::types::DEFAULT_BATCH_SIZE
}

fn default_max_attempts() -> u32 {
    herald_core::types::DEFAULT_MAX_ATTEMPTS
}

/// Batch worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Number of batches processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delay between two sends within one batch, in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Sleep between empty queue polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a dequeued claim message stays locked before redelivery.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            pacing_ms: default_pacing_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl WorkerConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_pacing_ms() -> u64 {
    50
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_lock_timeout_secs() -> u64 {
    300
}

/// Recipient retry configuration.
///
/// The delay before retry `n` is `min(base_delay * 2^n, max_delay)`,
/// optionally widened by `±jitter_factor`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total send attempts per recipient, first attempt included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Randomization of each delay, `0.0` disables jitter.
    #[serde(default)]
    pub jitter_factor: f64,

    /// Sleep between polls for due retries, in milliseconds.
    #[serde(default = "default_retry_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum due retries claimed per poll.
    #[serde(default = "default_retry_poll_limit")]
    pub poll_limit: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            jitter_factor: 0.0,
            poll_interval_ms: default_retry_poll_interval_ms(),
            poll_limit: default_retry_poll_limit(),
        }
    }
}

fn default_base_delay_secs() -> u64 {
    30
}

fn default_max_delay_secs() -> u64 {
    3600
}

fn default_retry_poll_interval_ms() -> u64 {
    1000
}

fn default_retry_poll_limit() -> u32 {
    100
}

/// Usage limits for one plan. An absent limit means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlanLimits {
    #[serde(default)]
    pub daily_messages: Option<u64>,

    #[serde(default)]
    pub monthly_messages: Option<u64>,

    #[serde(default)]
    pub daily_template_submissions: Option<u64>,
}

/// The plan configuration table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlanTable {
    #[serde(default = "default_free_limits")]
    pub free: PlanLimits,

    #[serde(default = "default_basic_limits")]
    pub basic: PlanLimits,

    #[serde(default = "default_premium_limits")]
    pub premium: PlanLimits,

    #[serde(default)]
    pub enterprise: PlanLimits,
}

impl Default for PlanTable {
    fn default() -> Self {
        Self {
            free: default_free_limits(),
            basic: default_basic_limits(),
            premium: default_premium_limits(),
            enterprise: PlanLimits::default(),
        }
    }
}

impl PlanTable {
    pub fn limits_for(&self, plan: Plan) -> PlanLimits {
        match plan {
            Plan::Free => self.free,
            Plan::Basic => self.basic,
            Plan::Premium => self.premium,
            Plan::Enterprise => self.enterprise,
        }
    }

    pub(crate) fn entries(&self) -> [(&'static str, &PlanLimits); 4] {
        [
            ("free", &self.free),
            ("basic", &self.basic),
            ("premium", &self.premium),
            ("enterprise", &self.enterprise),
        ]
    }
}

fn default_free_limits() -> PlanLimits {
    PlanLimits {
        daily_messages: Some(250),
        monthly_messages: Some(1_000),
        daily_template_submissions: Some(5),
    }
}

fn default_basic_limits() -> PlanLimits {
    PlanLimits {
        daily_messages: Some(1_000),
        monthly_messages: Some(25_000),
        daily_template_submissions: Some(20),
    }
}

fn default_premium_limits() -> PlanLimits {
    PlanLimits {
        daily_messages: Some(10_000),
        monthly_messages: Some(250_000),
        daily_template_submissions: Some(100),
    }
}

/// Quota enforcement configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Fraction of a limit at which a warning is logged.
    #[serde(default = "default_warn_ratio")]
    pub warn_ratio: f64,

    #[serde(default)]
    pub plans: PlanTable,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            warn_ratio: default_warn_ratio(),
            plans: PlanTable::default(),
        }
    }
}

fn default_warn_ratio() -> f64 {
    0.8
}

/// Estimated provider cost per sent message, in USD, by plan.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    #[serde(default = "default_cost_per_message")]
    pub free: f64,
    #[serde(default = "default_cost_per_message")]
    pub basic: f64,
    #[serde(default = "default_cost_per_message")]
    pub premium: f64,
    #[serde(default = "default_cost_per_message")]
    pub enterprise: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            free: default_cost_per_message(),
            basic: default_cost_per_message(),
            premium: default_cost_per_message(),
            enterprise: default_cost_per_message(),
        }
    }
}

impl PricingConfig {
    pub fn cost_per_message(&self, plan: Plan) -> f64 {
        match plan {
            Plan::Free => self.free,
            Plan::Basic => self.basic,
            Plan::Premium => self.premium,
            Plan::Enterprise => self.enterprise,
        }
    }
}

fn default_cost_per_message() -> f64 {
    0.005
}

/// Daily rollup schedule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RollupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_rollup_interval_secs")]
    pub interval_secs: u64,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_rollup_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_rollup_interval_secs() -> u64 {
    900
}

/// Credentials of one WhatsApp Business phone number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppAccount {
    pub phone_number_id: String,
    pub access_token: String,
}

/// WhatsApp Cloud API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Request timeout in seconds. A timeout is a transient failure.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Account used for tenants without an entry in `accounts`.
    #[serde(default)]
    pub default_account: Option<WhatsAppAccount>,

    /// Per-tenant accounts keyed by tenant id.
    #[serde(default)]
    pub accounts: HashMap<String, WhatsAppAccount>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_version: default_api_version(),
            request_timeout_secs: default_request_timeout_secs(),
            default_account: None,
            accounts: HashMap::new(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v21.0".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_listen")]
    pub listen_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: default_metrics_listen(),
        }
    }
}

fn default_metrics_listen() -> String {
    "127.0.0.1:9464".to_string()
}
