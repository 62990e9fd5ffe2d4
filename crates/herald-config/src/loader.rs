// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./herald.toml` > `~/.config/herald/herald.toml` > `/etc/herald/herald.toml`
//! with environment variable overrides via `HERALD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::HeraldConfig;

/// Top-level sections an environment variable may address.
const ENV_SECTIONS: &[&str] = &[
    "service", "storage", "planner", "worker", "retry", "quota", "pricing", "rollup",
    "whatsapp", "metrics",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/herald/herald.toml` (system-wide)
/// 3. `~/.config/herald/herald.toml` (user XDG config)
/// 4. `./herald.toml` (local directory)
/// 5. `HERALD_*` environment variables
pub fn load_config() -> Result<HeraldConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<HeraldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HeraldConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<HeraldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HeraldConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for standard config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(HeraldConfig::default()))
        .merge(Toml::file("/etc/herald/herald.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("herald/herald.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("herald.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `HERALD_WORKER_PACING_MS` maps to `worker.pacing_ms`, not `worker.pacing.ms`.
fn env_provider() -> Env {
    Env::prefixed("HERALD_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_only_after_section() {
        assert_eq!(map_env_key("worker_pacing_ms"), "worker.pacing_ms");
        assert_eq!(map_env_key("retry_base_delay_secs"), "retry.base_delay_secs");
        assert_eq!(map_env_key("whatsapp_api_version"), "whatsapp.api_version");
    }

    #[test]
    fn unknown_section_is_left_alone() {
        assert_eq!(map_env_key("bogus_key"), "bogus_key");
    }
}
