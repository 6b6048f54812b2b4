//! The platform seam.
//!
//! The agent shares no memory with application instances. Everything it
//! does to them (posting messages, focusing, opening windows, showing
//! notifications, claiming control) goes through a `Host`.

use async_trait::async_trait;
use lantern_core::{AgentMessage, Error};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::agent::push::Notification;

/// Identifier of one open application instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// An open application instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: ClientId,
    /// The document the instance currently shows.
    pub url: Url,
    #[serde(default)]
    pub focused: bool,
}

/// Platform capabilities the agent relies on.
#[async_trait]
pub trait Host: Send + Sync {
    /// Every open application instance, controlled or not.
    async fn clients(&self) -> Vec<ClientInfo>;

    async fn post_message(&self, client: &ClientId, message: &AgentMessage) -> Result<(), Error>;

    async fn focus(&self, client: &ClientId) -> Result<(), Error>;

    async fn open_window(&self, url: &Url) -> Result<(), Error>;

    async fn show_notification(&self, notification: &Notification) -> Result<(), Error>;

    async fn close_notification(&self, notification: &Notification) -> Result<(), Error>;

    /// Take control of already-open instances without a reload.
    async fn claim(&self, version: &str) -> Result<(), Error>;
}
