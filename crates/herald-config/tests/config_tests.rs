// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Herald configuration system.

use herald_config::diagnostic::ConfigError;
use herald_config::model::HeraldConfig;
use herald_config::{load_and_validate_str, load_config_from_path, load_config_from_str};
use herald_core::Plan;

#[test]
fn valid_toml_deserializes_into_herald_config() {
    let toml = r#"
[service]
name = "herald-eu-1"
log_level = "debug"

[storage]
database_path = "/tmp/herald-test.db"
wal_mode = false

[planner]
batch_size = 25

[worker]
concurrency = 8
pacing_ms = 10

[retry]
max_attempts = 5
base_delay_secs = 10
max_delay_secs = 600
jitter_factor = 0.2

[quota.plans.free]
daily_messages = 100
monthly_messages = 2000

[pricing]
premium = 0.004

[whatsapp]
api_version = "v20.0"

[whatsapp.accounts.tenant-a]
phone_number_id = "1098"
access_token = "EAAB"
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should load");
    assert_eq!(config.service.name, "herald-eu-1");
    assert_eq!(config.storage.database_path, "/tmp/herald-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.planner.batch_size, 25);
    assert_eq!(config.worker.concurrency, 8);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.jitter_factor, 0.2);

    let free = config.quota.plans.limits_for(Plan::Free);
    assert_eq!(free.daily_messages, Some(100));
    assert_eq!(free.monthly_messages, Some(2000));
    // Keys not given keep the compiled default of that plan.
    assert_eq!(free.daily_template_submissions, Some(5));

    assert_eq!(config.pricing.cost_per_message(Plan::Premium), 0.004);
    assert_eq!(config.whatsapp.accounts["tenant-a"].phone_number_id, "1098");
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_and_validate_str("").expect("defaults should validate");
    let defaults = HeraldConfig::default();
    assert_eq!(config.planner.batch_size, defaults.planner.batch_size);
    assert_eq!(config.worker.pacing_ms, 50);
    assert_eq!(config.quota.warn_ratio, 0.8);
    assert!(config.rollup.enabled);
}

#[test]
fn unknown_field_yields_suggestion() {
    let toml = r#"
[worker]
pacng_ms = 10
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown key must be rejected");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "pacng_ms");
            assert_eq!(suggestion.as_deref(), Some("pacing_ms"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_section_is_rejected() {
    let err = load_config_from_str("[telemetry]\nenabled = true\n")
        .expect_err("unknown section must be rejected");
    assert!(err.to_string().contains("telemetry"));
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[planner]\nbatch_size = \"fifty\"\n")
        .expect_err("string batch size must be rejected");
    assert!(matches!(errors[0], ConfigError::InvalidType { .. }));
}

#[test]
fn semantic_errors_surface_from_load() {
    let errors = load_and_validate_str("[planner]\nbatch_size = 0\n")
        .expect_err("zero batch size must be rejected");
    assert!(matches!(errors[0], ConfigError::Validation { .. }));
}

#[test]
#[serial_test::serial]
fn env_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("herald.toml");
    std::fs::write(&path, "[worker]\nconcurrency = 2\n").unwrap();

    // SAFETY: serialized test; no other thread reads the environment.
    unsafe { std::env::set_var("HERALD_WORKER_CONCURRENCY", "6") };
    let config = load_config_from_path(&path);
    unsafe { std::env::remove_var("HERALD_WORKER_CONCURRENCY") };

    assert_eq!(config.unwrap().worker.concurrency, 6);
}
