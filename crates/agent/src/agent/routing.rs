//! Route policy table.
//!
//! Precedence, highest first; exactly one rule applies:
//! 1. non-GET -> bypass
//! 2. non-http(s) scheme -> bypass
//! 3. API prefix or backend host -> network-first
//! 4. static-asset extension -> cache-first
//! 5. document navigation -> network-first with offline page
//! 6. anything else -> stale-while-revalidate

use lantern_core::{AppConfig, Request};

/// The strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Bypass,
    NetworkFirst,
    CacheFirst,
    NetworkFirstWithFallback,
    StaleWhileRevalidate,
}

#[derive(Debug, Clone)]
pub struct RoutePolicy {
    api_path_prefixes: Vec<String>,
    api_hosts: Vec<String>,
    static_extensions: Vec<String>,
}

impl RoutePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            api_path_prefixes: config.api_path_prefixes.clone(),
            api_hosts: config.api_hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
            static_extensions: config
                .static_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn classify(&self, request: &Request) -> Route {
        if !request.is_get() {
            return Route::Bypass;
        }
        if !matches!(request.url.scheme(), "http" | "https") {
            return Route::Bypass;
        }
        if self.is_api(request) {
            return Route::NetworkFirst;
        }
        if self.is_static_asset(request) {
            return Route::CacheFirst;
        }
        if request.is_navigation() {
            return Route::NetworkFirstWithFallback;
        }
        Route::StaleWhileRevalidate
    }

    fn is_api(&self, request: &Request) -> bool {
        let path = request.url.path();
        if self.api_path_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return true;
        }
        request
            .url
            .host_str()
            .is_some_and(|host| self.api_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
    }

    fn is_static_asset(&self, request: &Request) -> bool {
        let Some(file) = request.url.path_segments().and_then(|mut segments| segments.next_back()) else {
            return false;
        };
        let Some((_, ext)) = file.rsplit_once('.') else {
            return false;
        };
        self.static_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}
