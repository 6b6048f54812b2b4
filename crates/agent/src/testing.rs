//! Scripted network and recording host for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lantern_client::Network;
use lantern_core::{AgentMessage, AppConfig, CacheDb, CachedResponse, Error, Request};
use url::Url;

use crate::agent::ProxyAgent;
use crate::agent::push::Notification;
use crate::host::{ClientId, ClientInfo, Host};

pub const ORIGIN: &str = "https://church.example.org";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn get(path: &str) -> Request {
    Request::get(url(path))
}

pub fn navigate(path: &str) -> Request {
    Request::navigate(url(path))
}

pub fn ok(body: &str) -> CachedResponse {
    CachedResponse::text(200, body)
}

pub fn client(id: &str, path: &str, focused: bool) -> ClientInfo {
    ClientInfo { id: id.into(), url: url(path), focused }
}

pub fn config() -> AppConfig {
    AppConfig { origin: ORIGIN.into(), ..AppConfig::default() }
}

#[derive(Debug, Clone)]
enum Script {
    Respond(CachedResponse),
    Fail,
    Hang,
}

#[derive(Default)]
struct NetworkState {
    scripts: HashMap<String, Script>,
    calls: Vec<String>,
}

/// A network whose answers are scripted per URL. Unscripted URLs fail as if
/// the device were offline.
#[derive(Clone, Default)]
pub struct FakeNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl FakeNetwork {
    pub fn offline() -> Self {
        Self::default()
    }

    fn script(&self, path: &str, script: Script) {
        self.state.lock().unwrap().scripts.insert(url(path).to_string(), script);
    }

    pub fn respond(&self, path: &str, response: CachedResponse) {
        self.script(path, Script::Respond(response));
    }

    pub fn fail(&self, path: &str) {
        self.script(path, Script::Fail);
    }

    pub fn hang(&self, path: &str) {
        self.script(path, Script::Hang);
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn calls_for(&self, path: &str) -> usize {
        let target = url(path).to_string();
        self.state.lock().unwrap().calls.iter().filter(|c| **c == target).count()
    }

    /// Wait until at least `n` fetches were issued, then let the issuing
    /// tasks settle.
    pub async fn wait_for_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while self.calls() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("network was never called");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<CachedResponse, Error> {
        let script = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(request.url.to_string());
            state.scripts.get(request.url.as_str()).cloned()
        };
        match script {
            Some(Script::Respond(response)) => Ok(response),
            Some(Script::Hang) => std::future::pending().await,
            Some(Script::Fail) | None => Err(Error::Network(format!("{}: connection refused", request.url))),
        }
    }
}

/// A host command as seen by [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    PostMessage(ClientId, AgentMessage),
    Focus(ClientId),
    OpenWindow(String),
    ShowNotification(Notification),
    CloseNotification(Notification),
    Claim(String),
}

#[derive(Default)]
pub struct RecordingHost {
    clients: Mutex<Vec<ClientInfo>>,
    commands: Mutex<Vec<RecordedCommand>>,
}

impl RecordingHost {
    pub fn add_client(&self, client: ClientInfo) {
        self.clients.lock().unwrap().push(client);
    }

    pub fn remove_client(&self, id: &str) {
        self.clients.lock().unwrap().retain(|c| c.id.0 != id);
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                RecordedCommand::ShowNotification(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn record(&self, command: RecordedCommand) {
        self.commands.lock().unwrap().push(command);
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn clients(&self) -> Vec<ClientInfo> {
        self.clients.lock().unwrap().clone()
    }

    async fn post_message(&self, client: &ClientId, message: &AgentMessage) -> Result<(), Error> {
        self.record(RecordedCommand::PostMessage(client.clone(), message.clone()));
        Ok(())
    }

    async fn focus(&self, client: &ClientId) -> Result<(), Error> {
        self.record(RecordedCommand::Focus(client.clone()));
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> Result<(), Error> {
        self.record(RecordedCommand::OpenWindow(url.to_string()));
        Ok(())
    }

    async fn show_notification(&self, notification: &Notification) -> Result<(), Error> {
        self.record(RecordedCommand::ShowNotification(notification.clone()));
        Ok(())
    }

    async fn close_notification(&self, notification: &Notification) -> Result<(), Error> {
        self.record(RecordedCommand::CloseNotification(notification.clone()));
        Ok(())
    }

    async fn claim(&self, version: &str) -> Result<(), Error> {
        self.record(RecordedCommand::Claim(version.to_string()));
        Ok(())
    }
}

pub async fn agent_with(network: FakeNetwork) -> (ProxyAgent, Arc<RecordingHost>) {
    agent_with_config(network, config()).await
}

pub async fn agent_with_config(network: FakeNetwork, config: AppConfig) -> (ProxyAgent, Arc<RecordingHost>) {
    let db = CacheDb::open_in_memory().await.unwrap();
    let host = Arc::new(RecordingHost::default());
    let agent = ProxyAgent::new(config, db, Arc::new(network), host.clone()).unwrap();
    (agent, host)
}

/// An agent sharing `db`, `network` and `host` with others.
pub fn agent_on(db: &CacheDb, network: &FakeNetwork, host: &Arc<RecordingHost>, config: AppConfig) -> ProxyAgent {
    ProxyAgent::new(config, db.clone(), Arc::new(network.clone()), host.clone()).unwrap()
}

/// A config for `version` with the given install behaviour.
pub fn versioned(version: &str, skip_waiting_on_install: bool) -> AppConfig {
    AppConfig { cache_version: version.into(), skip_waiting_on_install, ..config() }
}
