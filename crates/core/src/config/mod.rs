//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (LANTERN_*)
//! 2. TOML config file (if LANTERN_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (LANTERN_*)
/// 2. TOML config file (if LANTERN_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding every cache partition.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the application; relative URLs resolve against it.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Prefix of every partition name.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version tag of the current agent, embedded in partition names.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// URLs that must all be fetchable at install time.
    #[serde(default = "default_bootstrap_assets")]
    pub bootstrap_assets: Vec<String>,

    /// Pre-cached page served to offline navigations.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Path prefixes routed network-first.
    #[serde(default = "default_api_path_prefixes")]
    pub api_path_prefixes: Vec<String>,

    /// Backend hosts whose traffic is routed network-first.
    ///
    /// Set via LANTERN_API_HOSTS, e.g. `["abc.supabase.co"]`.
    #[serde(default)]
    pub api_hosts: Vec<String>,

    /// File extensions routed cache-first.
    #[serde(default = "default_static_extensions")]
    pub static_extensions: Vec<String>,

    /// Maximum entries kept in the dynamic partition; 0 disables trimming.
    #[serde(default = "default_dynamic_max_entries")]
    pub dynamic_max_entries: usize,

    /// Whether a freshly installed agent activates without waiting for open
    /// pages to close.
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Transport timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum response body size in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Title for push notifications that carry none.
    #[serde(default = "default_notification_title")]
    pub notification_title: String,

    /// Body for push notifications that carry none.
    #[serde(default = "default_notification_body")]
    pub notification_body: String,

    #[serde(default = "default_notification_icon")]
    pub notification_icon: String,

    #[serde(default = "default_notification_badge")]
    pub notification_badge: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./lantern-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_cache_prefix() -> String {
    "lantern".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_bootstrap_assets() -> Vec<String> {
    vec!["/".into(), "/manifest.json".into(), "/offline.html".into()]
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_api_path_prefixes() -> Vec<String> {
    vec!["/api/".into(), "/rest/v1/".into(), "/auth/v1/".into(), "/storage/v1/".into()]
}

fn default_static_extensions() -> Vec<String> {
    ["js", "css", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "woff", "woff2", "ttf"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_dynamic_max_entries() -> usize {
    200
}

fn default_user_agent() -> String {
    "lantern/0.1".into()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_notification_title() -> String {
    "Church Connect".into()
}

fn default_notification_body() -> String {
    "You have a new notification".into()
}

fn default_notification_icon() -> String {
    "/icons/icon-192x192.png".into()
}

fn default_notification_badge() -> String {
    "/icons/badge-72x72.png".into()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            bootstrap_assets: default_bootstrap_assets(),
            offline_page: default_offline_page(),
            api_path_prefixes: default_api_path_prefixes(),
            api_hosts: Vec::new(),
            static_extensions: default_static_extensions(),
            dynamic_max_entries: default_dynamic_max_entries(),
            skip_waiting_on_install: true,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            notification_title: default_notification_title(),
            notification_body: default_notification_body(),
            notification_icon: default_notification_icon(),
            notification_badge: default_notification_badge(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The parsed application origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin).map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `LANTERN_`
    /// 2. TOML file from `LANTERN_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed or
    /// validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("LANTERN_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("LANTERN_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./lantern-cache.sqlite"));
        assert_eq!(config.cache_prefix, "lantern");
        assert_eq!(config.cache_version, "v1");
        assert_eq!(config.bootstrap_assets, vec!["/", "/manifest.json", "/offline.html"]);
        assert_eq!(config.offline_page, "/offline.html");
        assert!(config.api_hosts.is_empty());
        assert!(config.static_extensions.contains(&"png".to_string()));
        assert_eq!(config.dynamic_max_entries, 200);
        assert!(config.skip_waiting_on_install);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_origin_url() {
        let config = AppConfig { origin: "https://church.example.org".into(), ..Default::default() };
        assert_eq!(config.origin_url().unwrap().host_str(), Some("church.example.org"));

        let bad = AppConfig { origin: "not a url".into(), ..Default::default() };
        assert!(matches!(bad.origin_url(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_load_from_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "lantern.toml",
                r#"
                origin = "https://church.example.org"
                cache_version = "v7"
                api_hosts = ["abc.supabase.co"]
                "#,
            )?;
            jail.set_env("LANTERN_CONFIG_FILE", "lantern.toml");
            jail.set_env("LANTERN_DYNAMIC_MAX_ENTRIES", "50");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.origin, "https://church.example.org");
            assert_eq!(config.cache_version, "v7");
            assert_eq!(config.api_hosts, vec!["abc.supabase.co"]);
            assert_eq!(config.dynamic_max_entries, 50);
            Ok(())
        });
    }
}
