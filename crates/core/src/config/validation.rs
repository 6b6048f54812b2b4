//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an http(s) URL
    /// - `cache_prefix` or `cache_version` is empty or contains whitespace
    /// - `cache_version` contains `-`, or `cache_prefix` contains `-static-`
    ///   or `-dynamic-`, either of which makes partition names ambiguous
    /// - `offline_page` is not part of `bootstrap_assets`
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    ///
    /// Returns `ConfigError::Missing` if `bootstrap_assets` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(invalid("origin", "must use http or https"));
        }

        for (field, value) in [("cache_prefix", &self.cache_prefix), ("cache_version", &self.cache_version)] {
            if value.is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
            if value.chars().any(char::is_whitespace) {
                return Err(invalid(field, "must not contain whitespace"));
            }
        }
        if self.cache_version.contains('-') {
            return Err(invalid("cache_version", "must not contain '-'"));
        }
        if ["-static-", "-dynamic-"].iter().any(|kind| self.cache_prefix.contains(kind)) {
            return Err(invalid("cache_prefix", "must not contain -static- or -dynamic-"));
        }

        if self.bootstrap_assets.is_empty() {
            return Err(ConfigError::Missing {
                field: "bootstrap_assets".into(),
                hint: "list at least the root document and the offline page".into(),
            });
        }
        if !self.bootstrap_assets.contains(&self.offline_page) {
            return Err(invalid("offline_page", "must be listed in bootstrap_assets"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.dynamic_max_entries == 0 {
            tracing::warn!("dynamic_max_entries is 0; the dynamic partition will grow without bound");
        }

        Ok(())
    }
}
