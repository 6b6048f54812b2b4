//! Install and activate.
//!
//! Install pre-fetches every bootstrap asset and stores them in one
//! transaction, so the static partition is either complete or untouched.
//! Activate deletes every partition that belongs to another version, then
//! claims open instances.

use std::sync::atomic::Ordering;

use futures_util::future::try_join_all;
use lantern_core::{Error, Request};
use serde::Serialize;
use tokio::sync::watch;

use super::ProxyAgent;

/// Where an agent is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Parsed,
    Installing,
    /// Installed; waiting for the previous agent to let go.
    Waiting,
    Activating,
    Active,
    /// Replaced by a newer active agent.
    Superseded,
    /// Install failed; this agent never activates.
    Discarded,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Superseded => "superseded",
            LifecycleState::Discarded => "discarded",
        }
    }

    /// Whether an agent in this state may write to its partitions.
    pub fn accepts_writes(&self) -> bool {
        !matches!(self, LifecycleState::Superseded | LifecycleState::Discarded)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two partition names owned by one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
    pub static_name: String,
    pub dynamic_name: String,
}

impl PartitionNames {
    pub fn new(prefix: &str, version: &str) -> Self {
        Self { static_name: format!("{prefix}-static-{version}"), dynamic_name: format!("{prefix}-dynamic-{version}") }
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name
    }
}

impl ProxyAgent {
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: LifecycleState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::info!(version = self.version(), from = %prev, to = %next, "agent state changed");
        }
    }

    /// Fetch every bootstrap asset and store the set in the static partition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` if any asset cannot be fetched or
    /// answers with a non-2xx status; the static partition is left
    /// untouched and the agent is discarded.
    pub async fn install(&self) -> Result<(), Error> {
        self.set_state(LifecycleState::Installing);

        match self.fetch_bootstrap().await {
            Ok(()) => {
                if self.config.skip_waiting_on_install {
                    self.skip_waiting();
                }
                self.set_state(LifecycleState::Waiting);
                Ok(())
            }
            Err(e) => {
                tracing::error!(version = self.version(), error = %e, "install failed");
                self.set_state(LifecycleState::Discarded);
                Err(e)
            }
        }
    }

    async fn fetch_bootstrap(&self) -> Result<(), Error> {
        let requests = self
            .config
            .bootstrap_assets
            .iter()
            .map(|asset| {
                self.resolve(asset)
                    .map(Request::get)
                    .map_err(|e| Error::InstallFailed { url: asset.clone(), reason: e.to_string() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let entries = try_join_all(requests.into_iter().map(|request| async move {
            let url = request.url.to_string();
            match self.network.fetch(&request).await {
                Ok(response) if response.is_success() => Ok((request, response)),
                Ok(response) => Err(Error::InstallFailed { url, reason: format!("status {}", response.status) }),
                Err(e) => Err(Error::InstallFailed { url, reason: e.to_string() }),
            }
        }))
        .await?;

        self.static_cache.put_all(&entries).await?;
        tracing::info!(
            partition = self.static_cache.name(),
            assets = entries.len(),
            "bootstrap assets cached"
        );
        Ok(())
    }

    /// Delete every partition belonging to another version, then claim
    /// already-open instances.
    ///
    /// A static partition emptied while the agent was waiting (by
    /// `CLEAR_CACHE`) is refilled from the bootstrap set on a best-effort
    /// basis.
    pub async fn activate(&self) -> Result<(), Error> {
        self.set_state(LifecycleState::Activating);

        for name in self.db.partition_names().await? {
            if self.names.is_current(&name) {
                continue;
            }
            if self.db.delete_partition(&name).await? {
                tracing::info!(partition = %name, "deleted stale partition");
            }
        }

        if self.static_cache.len().await? == 0 && !self.config.bootstrap_assets.is_empty() {
            match self.fetch_bootstrap().await {
                Ok(()) => tracing::info!(partition = self.static_cache.name(), "refilled empty static partition"),
                Err(e) => tracing::warn!(error = %e, "static partition is empty and could not be refilled"),
            }
        }

        if let Err(e) = self.host.claim(self.version()).await {
            tracing::warn!(version = self.version(), error = %e, "failed to claim clients");
        }

        self.set_state(LifecycleState::Active);
        Ok(())
    }

    /// Ask to activate without waiting for open pages to close.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub(crate) fn supersede(&self) {
        self.set_state(LifecycleState::Superseded);
    }

    /// Undo `supersede` when the replacement failed to activate.
    pub(crate) fn reinstate(&self) {
        self.set_state(LifecycleState::Active);
    }

    pub(crate) fn discard(&self) {
        self.set_state(LifecycleState::Discarded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNetwork, RecordedCommand, agent_with, agent_with_config, config, get, ok};
    use lantern_core::{AppConfig, CachedResponse};

    fn bootstrap(network: &FakeNetwork) {
        network.respond("/", ok("<html>home</html>"));
        network.respond("/manifest.json", ok("{}"));
        network.respond("/offline.html", ok("offline"));
    }

    #[test]
    fn test_partition_names() {
        let names = PartitionNames::new("church-connect", "v1");
        assert_eq!(names.static_name, "church-connect-static-v1");
        assert_eq!(names.dynamic_name, "church-connect-dynamic-v1");
        assert!(names.is_current("church-connect-static-v1"));
        assert!(!names.is_current("church-connect-static-v0"));
    }

    #[tokio::test]
    async fn test_install_caches_all_bootstrap_assets() {
        let network = FakeNetwork::offline();
        bootstrap(&network);
        let (agent, _) = agent_with(network).await;

        agent.install().await.unwrap();

        assert_eq!(agent.state(), LifecycleState::Waiting);
        assert_eq!(agent.static_cache.len().await.unwrap(), 3);
        let offline = agent.static_cache.match_request(&get("/offline.html")).await.unwrap();
        assert_eq!(offline, Some(ok("offline")));
    }

    #[tokio::test]
    async fn test_install_failure_writes_nothing() {
        let network = FakeNetwork::offline();
        bootstrap(&network);
        network.respond("/offline.html", CachedResponse::text(404, "not found"));
        let (agent, _) = agent_with(network).await;

        let err = agent.install().await.unwrap_err();

        assert!(matches!(err, Error::InstallFailed { ref url, .. } if url.ends_with("/offline.html")));
        assert_eq!(agent.state(), LifecycleState::Discarded);
        assert_eq!(agent.static_cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_install_failure_on_network_error() {
        let network = FakeNetwork::offline();
        network.respond("/", ok("home"));
        let (agent, _) = agent_with(network).await;

        assert!(agent.install().await.is_err());
        assert!(!agent.db.has_partition(&agent.names.static_name).await.unwrap());
    }

    #[tokio::test]
    async fn test_install_requests_skip_waiting_by_default() {
        let network = FakeNetwork::offline();
        bootstrap(&network);
        let (agent, _) = agent_with(network.clone()).await;
        agent.install().await.unwrap();
        assert!(agent.skip_waiting_requested());

        let (patient, _) =
            agent_with_config(network, AppConfig { skip_waiting_on_install: false, ..config() }).await;
        patient.install().await.unwrap();
        assert!(!patient.skip_waiting_requested());
    }

    #[tokio::test]
    async fn test_activate_deletes_other_versions_and_claims() {
        let network = FakeNetwork::offline();
        bootstrap(&network);
        let (agent, host) = agent_with(network).await;
        agent.db.partition("lantern-static-v0").put(&get("/"), &ok("old")).await.unwrap();
        agent.db.partition("lantern-dynamic-v0").put(&get("/events"), &ok("old")).await.unwrap();
        agent.dynamic_cache.put(&get("/events"), &ok("current")).await.unwrap();

        agent.install().await.unwrap();
        agent.activate().await.unwrap();

        let mut names = agent.db.partition_names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["lantern-dynamic-v1".to_string(), "lantern-static-v1".to_string()]);
        assert_eq!(agent.state(), LifecycleState::Active);
        assert!(host.commands().contains(&RecordedCommand::Claim("v1".into())));
    }

    #[tokio::test]
    async fn test_activate_is_idempotent() {
        let (agent, _) = agent_with(FakeNetwork::offline()).await;
        agent.activate().await.unwrap();
        agent.activate().await.unwrap();
        assert_eq!(agent.state(), LifecycleState::Active);
    }
}
