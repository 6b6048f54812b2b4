//! JSON-lines stdio host.
//!
//! Platform events arrive on stdin, one JSON object per line, tagged by
//! `event`. Host commands leave on stdout, tagged by `command`. Each event is
//! handled in its own task so a slow fetch never blocks the next line.

use std::sync::Arc;

use async_trait::async_trait;
use lantern_client::{FetchClient, FetchConfig, Network};
use lantern_core::{AgentMessage, AppConfig, CacheDb, CachedResponse, ControlMessage, Error, Request};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinSet;
use url::Url;

use crate::agent::push::Notification;
use crate::agent::{Interception, ProxyAgent};
use crate::host::{ClientId, ClientInfo, Host};
use crate::registration::Registration;

/// An event delivered by the platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// Install the configured version.
    Install,
    /// Install a new version alongside the active one.
    Update { version: String },
    Fetch { id: String, request: Request },
    Sync { tag: String },
    Push {
        #[serde(default)]
        data: Option<String>,
    },
    NotificationClick {
        notification: Notification,
        #[serde(default)]
        action: Option<String>,
    },
    /// A control message from a foreground instance, decoded separately so
    /// unknown types can be logged.
    Message { message: serde_json::Value },
    ClientOpen {
        id: ClientId,
        url: Url,
        #[serde(default)]
        focused: bool,
    },
    ClientClose { id: ClientId },
}

/// A response as written to stdout. Bodies that are not UTF-8 are
/// hex-encoded in `body_hex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_hex: Option<String>,
}

impl From<&CachedResponse> for WireResponse {
    fn from(response: &CachedResponse) -> Self {
        let (body, body_hex) = match std::str::from_utf8(&response.body) {
            Ok(text) => (Some(text.to_string()), None),
            Err(_) => (None, Some(hex::encode(&response.body))),
        };
        Self { status: response.status, headers: response.headers.clone(), body, body_hex }
    }
}

/// A command for the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    Response { id: String, response: WireResponse },
    /// Let the platform perform the request itself.
    Passthrough { id: String },
    PostMessage { client: ClientId, message: AgentMessage },
    Focus { client: ClientId },
    OpenWindow { url: Url },
    ShowNotification { notification: Notification },
    CloseNotification { notification: Notification },
    Claim { version: String },
}

/// A `Host` that tracks open instances from platform events and emits
/// commands through a channel.
pub struct StdioHost {
    clients: RwLock<Vec<ClientInfo>>,
    out: mpsc::UnboundedSender<HostCommand>,
}

impl StdioHost {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostCommand>) {
        let (out, rx) = mpsc::unbounded_channel();
        (Self { clients: RwLock::new(Vec::new()), out }, rx)
    }

    pub fn send(&self, command: HostCommand) -> Result<(), Error> {
        self.out.send(command).map_err(|_| Error::Host("command channel closed".into()))
    }

    pub async fn client_opened(&self, client: ClientInfo) {
        let mut clients = self.clients.write().await;
        clients.retain(|c| c.id != client.id);
        if client.focused {
            for other in clients.iter_mut() {
                other.focused = false;
            }
        }
        clients.push(client);
    }

    pub async fn client_closed(&self, id: &ClientId) {
        self.clients.write().await.retain(|c| c.id != *id);
    }

    async fn require_client(&self, id: &ClientId) -> Result<(), Error> {
        if self.clients.read().await.iter().any(|c| c.id == *id) {
            Ok(())
        } else {
            Err(Error::Host(format!("unknown client: {id}")))
        }
    }
}

#[async_trait]
impl Host for StdioHost {
    async fn clients(&self) -> Vec<ClientInfo> {
        self.clients.read().await.clone()
    }

    async fn post_message(&self, client: &ClientId, message: &AgentMessage) -> Result<(), Error> {
        self.require_client(client).await?;
        self.send(HostCommand::PostMessage { client: client.clone(), message: message.clone() })
    }

    async fn focus(&self, client: &ClientId) -> Result<(), Error> {
        self.require_client(client).await?;
        for c in self.clients.write().await.iter_mut() {
            c.focused = c.id == *client;
        }
        self.send(HostCommand::Focus { client: client.clone() })
    }

    async fn open_window(&self, url: &Url) -> Result<(), Error> {
        self.send(HostCommand::OpenWindow { url: url.clone() })
    }

    async fn show_notification(&self, notification: &Notification) -> Result<(), Error> {
        self.send(HostCommand::ShowNotification { notification: notification.clone() })
    }

    async fn close_notification(&self, notification: &Notification) -> Result<(), Error> {
        self.send(HostCommand::CloseNotification { notification: notification.clone() })
    }

    async fn claim(&self, version: &str) -> Result<(), Error> {
        self.send(HostCommand::Claim { version: version.to_string() })
    }
}

/// Shared state for event handling.
struct Runtime {
    config: AppConfig,
    db: CacheDb,
    network: Arc<dyn Network>,
    host: Arc<StdioHost>,
    registration: Registration,
}

impl Runtime {
    async fn register(&self, version: Option<String>) {
        let mut config = self.config.clone();
        if let Some(version) = version {
            config.cache_version = version;
        }
        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "rejected agent version");
            return;
        }
        let host: Arc<dyn Host> = self.host.clone();
        let agent = match ProxyAgent::new(config, self.db.clone(), self.network.clone(), host) {
            Ok(agent) => agent,
            Err(e) => {
                tracing::error!(error = %e, "failed to create agent");
                return;
            }
        };
        if let Err(e) = self.registration.register(agent).await {
            tracing::error!(error = %e, "registration failed");
        }
    }

    async fn dispatch(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::Install => self.register(None).await,
            PlatformEvent::Update { version } => self.register(Some(version)).await,
            PlatformEvent::Fetch { id, request } => {
                let command = match self.registration.handle_fetch(&request).await {
                    Interception::Bypass => HostCommand::Passthrough { id },
                    Interception::Respond(response) => HostCommand::Response { id, response: (&response).into() },
                };
                if let Err(e) = self.host.send(command) {
                    tracing::error!(error = %e, "failed to answer fetch");
                }
            }
            PlatformEvent::Sync { tag } => {
                self.registration.handle_sync(&tag).await;
            }
            PlatformEvent::Push { data } => {
                self.registration.handle_push(data.as_deref().map(str::as_bytes)).await;
            }
            PlatformEvent::NotificationClick { notification, action } => {
                self.registration.handle_notification_click(&notification, action.as_deref()).await;
            }
            PlatformEvent::Message { message } => match serde_json::from_value::<ControlMessage>(message) {
                Ok(message) => self.registration.handle_control(&message).await,
                Err(e) => tracing::warn!(error = %e, "rejected control message"),
            },
            PlatformEvent::ClientOpen { id, url, focused } => {
                self.host.client_opened(ClientInfo { id, url, focused }).await;
            }
            PlatformEvent::ClientClose { id } => {
                self.host.client_closed(&id).await;
                if let Err(e) = self.registration.try_activate().await {
                    tracing::error!(error = %e, "activation failed");
                }
            }
        }
    }
}

/// Decode one stdin line.
pub fn parse_event(line: &str) -> Result<PlatformEvent, Error> {
    serde_json::from_str(line).map_err(|e| Error::InvalidInput(format!("undecodable event: {e}")))
}

/// Run the agent until stdin closes.
///
/// # Errors
///
/// Returns an error if the cache database cannot be opened, the HTTP client
/// cannot be built, or stdin/stdout fail.
pub async fn run(config: AppConfig) -> Result<(), Error> {
    let db = CacheDb::open(&config.db_path).await?;
    let network: Arc<dyn Network> = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let (host, mut commands) = StdioHost::new();
    let host = Arc::new(host);
    let registration = Registration::new(host.clone());
    let runtime = Arc::new(Runtime { config, db, network, host, registration });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(command) = commands.recv().await {
            let mut line = match serde_json::to_vec(&command) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode command");
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(e) = stdout.write_all(&line).await {
                tracing::error!(error = %e, "stdout closed");
                break;
            }
            if let Err(e) = stdout.flush().await {
                tracing::error!(error = %e, "stdout closed");
                break;
            }
        }
    });

    tracing::info!(version = %runtime.config.cache_version, "lantern agent reading events from stdin");

    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.map_err(|e| Error::Host(format!("stdin: {e}")))? {
        if line.trim().is_empty() {
            continue;
        }
        let event = match parse_event(&line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "skipping line");
                continue;
            }
        };
        match event {
            // Client bookkeeping is applied in order.
            PlatformEvent::ClientOpen { .. } => runtime.dispatch(event).await,
            event => {
                let runtime = runtime.clone();
                tasks.spawn(async move { runtime.dispatch(event).await });
            }
        }
        while tasks.try_join_next().is_some() {}
    }

    tracing::info!(pending = tasks.len(), "stdin closed, finishing pending events");
    while tasks.join_next().await.is_some() {}
    drop(runtime);
    if let Err(e) = writer.await {
        tracing::error!(error = %e, "stdout writer task failed");
    }
    Ok(())
}
