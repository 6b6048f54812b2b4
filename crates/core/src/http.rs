//! Request and response snapshots exchanged between the host, the agent and
//! the partition store.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

/// How the application issued a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// A top-level document navigation.
    Navigate,
    #[default]
    Cors,
    NoCors,
    SameOrigin,
}

/// An outgoing request as seen by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: Url,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub mode: RequestMode,
}

fn default_method() -> String {
    "GET".into()
}

impl Request {
    /// A plain GET request for `url`.
    pub fn get(url: Url) -> Self {
        Self { method: default_method(), url, headers: Vec::new(), mode: RequestMode::default() }
    }

    /// A navigation request for `url` with an HTML `Accept` header.
    pub fn navigate(url: Url) -> Self {
        Self {
            method: default_method(),
            url,
            headers: vec![("accept".into(), "text/html,application/xhtml+xml".into())],
            mode: RequestMode::Navigate,
        }
    }

    /// Builder-style header append.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Whether this request loads a navigable document.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate || self.header("accept").is_some_and(|accept| accept.contains("text/html"))
    }
}

/// An immutable response snapshot.
///
/// The body is reference counted, so cloning a response to store one copy
/// and return the other is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into() }
    }

    /// A `text/plain` response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new(status, vec![("content-type".into(), "text/plain; charset=utf-8".into())], body)
    }

    /// An `application/json` response.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, vec![("content-type".into(), "application/json".into())], value.to_string())
    }

    /// True for 2xx statuses, the only ones ever written to a partition.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
