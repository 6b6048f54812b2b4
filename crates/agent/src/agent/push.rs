//! Push envelopes and notification clicks.

use lantern_client::same_document;
use lantern_core::AgentMessage;
use serde::{Deserialize, Serialize};
use url::Url;

use super::ProxyAgent;
use crate::host::ClientInfo;

/// The JSON payload a push message may carry. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushEnvelope {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub tag: Option<String>,
    pub renotify: Option<bool>,
    #[serde(default)]
    pub actions: Vec<PushAction>,
}

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// A notification as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub renotify: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<PushAction>,
    /// Where a click on the notification body leads.
    pub url: String,
}

impl Notification {
    pub fn action(&self, name: &str) -> Option<&PushAction> {
        self.actions.iter().find(|a| a.action == name)
    }
}

impl ProxyAgent {
    /// Build the notification for a push payload.
    ///
    /// An absent or empty payload yields the configured defaults. A payload
    /// that is not a JSON envelope is shown as raw text.
    pub fn notification_from_push(&self, data: Option<&[u8]>) -> Notification {
        let mut notification = Notification {
            title: self.config.notification_title.clone(),
            body: self.config.notification_body.clone(),
            icon: self.config.notification_icon.clone(),
            badge: self.config.notification_badge.clone(),
            tag: None,
            renotify: false,
            actions: Vec::new(),
            url: "/".into(),
        };

        let Some(data) = data.filter(|d| !d.trim_ascii().is_empty()) else {
            return notification;
        };

        match serde_json::from_slice::<PushEnvelope>(data) {
            Ok(envelope) => {
                if let Some(title) = envelope.title {
                    notification.title = title;
                }
                if let Some(body) = envelope.body {
                    notification.body = body;
                }
                if let Some(url) = envelope.url {
                    notification.url = url;
                }
                notification.renotify = envelope.tag.is_some() && envelope.renotify.unwrap_or(true);
                notification.tag = envelope.tag;
                notification.actions = envelope.actions;
            }
            Err(e) => {
                tracing::debug!(error = %e, "push payload is not a JSON envelope, showing raw text");
                notification.body = String::from_utf8_lossy(data).into_owned();
            }
        }
        notification
    }

    /// Show a notification for an inbound push message.
    pub async fn handle_push(&self, data: Option<&[u8]>) {
        let notification = self.notification_from_push(data);
        if let Err(e) = self.host.show_notification(&notification).await {
            tracing::warn!(title = %notification.title, error = %e, "failed to show notification");
        }
    }

    /// React to a click on a notification or one of its actions.
    pub async fn handle_notification_click(&self, notification: &Notification, action: Option<&str>) {
        if let Err(e) = self.host.close_notification(notification).await {
            tracing::debug!(error = %e, "failed to close notification");
        }

        if let Some(url) = action.and_then(|name| notification.action(name)).and_then(|a| a.url.as_deref()) {
            match self.resolve(url) {
                Ok(target) => self.focus_or_open(&target).await,
                Err(e) => tracing::warn!(error = %e, "notification action has an invalid URL"),
            }
            return;
        }

        let target = match self.resolve(&notification.url) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(error = %e, "notification URL is invalid, using origin");
                self.origin.clone()
            }
        };
        self.focus_or_open(&target).await;
    }

    async fn focus_or_open(&self, target: &Url) {
        let clients = self.host.clients().await;

        if let Some(client) = clients.iter().find(|c| same_document(&c.url, target)) {
            if self.focus(client).await {
                return;
            }
        }

        let any = clients.iter().find(|c| c.focused).or_else(|| clients.first());
        if let Some(client) = any {
            if self.focus(client).await {
                let navigate = AgentMessage::Navigate { url: target.to_string() };
                if let Err(e) = self.host.post_message(&client.id, &navigate).await {
                    tracing::warn!(client = %client.id, error = %e, "failed to post navigate");
                }
                return;
            }
        }

        self.open_window(target).await;
    }

    async fn focus(&self, client: &ClientInfo) -> bool {
        match self.host.focus(&client.id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(client = %client.id, error = %e, "failed to focus client");
                false
            }
        }
    }

    async fn open_window(&self, url: &Url) {
        if let Err(e) = self.host.open_window(url).await {
            tracing::warn!(%url, error = %e, "failed to open window");
        }
    }
}
