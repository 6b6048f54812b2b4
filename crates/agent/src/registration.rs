//! Agent version management.
//!
//! A `Registration` holds at most one active and one waiting agent. Only the
//! active agent answers requests; a freshly installed agent waits until
//! there is no active agent, it asked to skip waiting, or no application
//! instance is open. Lifecycle operations are serialized, and the active
//! agent is swapped only after the new one finished activating.

use std::sync::Arc;

use lantern_core::{ControlMessage, Error, Request};
use tokio::sync::{Mutex, RwLock};

use crate::agent::push::Notification;
use crate::agent::{Interception, ProxyAgent};
use crate::host::Host;

pub struct Registration {
    host: Arc<dyn Host>,
    active: RwLock<Option<Arc<ProxyAgent>>>,
    waiting: RwLock<Option<Arc<ProxyAgent>>>,
    lifecycle: Mutex<()>,
}

impl Registration {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host, active: RwLock::new(None), waiting: RwLock::new(None), lifecycle: Mutex::new(()) }
    }

    pub async fn active(&self) -> Option<Arc<ProxyAgent>> {
        self.active.read().await.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<ProxyAgent>> {
        self.waiting.read().await.clone()
    }

    /// Install `agent`, park it as waiting, and activate it if allowed.
    ///
    /// # Errors
    ///
    /// Returns the install error; the previously active agent stays in
    /// control and nothing is parked.
    pub async fn register(&self, agent: ProxyAgent) -> Result<Arc<ProxyAgent>, Error> {
        let _guard = self.lifecycle.lock().await;

        agent.install().await?;
        let agent = Arc::new(agent);

        if let Some(previous) = self.waiting.write().await.replace(agent.clone()) {
            tracing::info!(version = previous.version(), "discarding older waiting agent");
            previous.discard();
        }

        self.activate_waiting().await?;
        Ok(agent)
    }

    /// Activate the waiting agent if the activation rules allow it.
    /// Returns whether an activation happened.
    pub async fn try_activate(&self) -> Result<bool, Error> {
        let _guard = self.lifecycle.lock().await;
        self.activate_waiting().await
    }

    async fn activate_waiting(&self) -> Result<bool, Error> {
        let Some(candidate) = self.waiting().await else {
            return Ok(false);
        };

        let no_active = self.active.read().await.is_none();
        let ready = no_active || candidate.skip_waiting_requested() || self.host.clients().await.is_empty();
        if !ready {
            tracing::debug!(version = candidate.version(), "agent waiting for open instances to close");
            return Ok(false);
        }

        // The outgoing agent stops writing before its partitions are deleted,
        // so a late store cannot recreate them. It keeps answering reads
        // until the swap.
        let previous = self.active().await;
        if let Some(previous) = &previous {
            previous.supersede();
        }
        if let Err(e) = candidate.activate().await {
            if let Some(previous) = &previous {
                previous.reinstate();
            }
            return Err(e);
        }

        self.waiting.write().await.take();
        self.active.write().await.replace(candidate.clone());
        tracing::info!(version = candidate.version(), "agent activated");
        Ok(true)
    }

    /// Route an intercepted request to the active agent.
    pub async fn handle_fetch(&self, request: &Request) -> Interception {
        match self.active().await {
            Some(agent) => agent.handle_fetch(request).await,
            None => Interception::Bypass,
        }
    }

    /// Apply a control message. `SKIP_WAITING` targets the waiting agent and
    /// activates it; the others target the active agent.
    pub async fn handle_control(&self, message: &ControlMessage) {
        if matches!(message, ControlMessage::SkipWaiting) {
            if let Some(waiting) = self.waiting().await {
                waiting.handle_control(message).await;
                if let Err(e) = self.try_activate().await {
                    tracing::error!(error = %e, "activation after skip waiting failed");
                }
            }
            return;
        }

        let agent = match self.active().await {
            Some(active) => Some(active),
            None => self.waiting().await,
        };
        match agent {
            Some(agent) => agent.handle_control(message).await,
            None => tracing::debug!(?message, "no agent to handle control message"),
        }
    }

    pub async fn handle_sync(&self, tag: &str) -> usize {
        match self.active().await {
            Some(agent) => agent.handle_sync(tag).await,
            None => 0,
        }
    }

    pub async fn handle_push(&self, data: Option<&[u8]>) {
        match self.active().await {
            Some(agent) => agent.handle_push(data).await,
            None => tracing::warn!("push received with no active agent"),
        }
    }

    pub async fn handle_notification_click(&self, notification: &Notification, action: Option<&str>) {
        match self.active().await {
            Some(agent) => agent.handle_notification_click(notification, action).await,
            None => tracing::warn!("notification click with no active agent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LifecycleState;
    use crate::testing::{FakeNetwork, RecordingHost, agent_on, client, get, navigate, ok, versioned};
    use lantern_core::{CacheDb, CachedResponse};

    struct Fixture {
        db: CacheDb,
        network: FakeNetwork,
        host: Arc<RecordingHost>,
        registration: Registration,
    }

    async fn fixture() -> Fixture {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = FakeNetwork::offline();
        network.respond("/", ok("<html>home</html>"));
        network.respond("/manifest.json", ok("{}"));
        network.respond("/offline.html", ok("offline"));
        let host = Arc::new(RecordingHost::default());
        let registration = Registration::new(host.clone());
        Fixture { db, network, host, registration }
    }

    #[tokio::test]
    async fn test_no_active_agent_bypasses() {
        let f = fixture().await;
        assert_eq!(f.registration.handle_fetch(&get("/logo.png")).await, Interception::Bypass);
        assert_eq!(f.network.calls(), 0);
    }

    #[tokio::test]
    async fn test_first_agent_activates_immediately() {
        let f = fixture().await;
        let agent = agent_on(&f.db, &f.network, &f.host, versioned("v1", false));

        let agent = f.registration.register(agent).await.unwrap();

        assert_eq!(agent.state(), LifecycleState::Active);
        assert!(f.registration.waiting().await.is_none());
        let response = f.registration.handle_fetch(&get("/manifest.json")).await;
        assert_eq!(response, Interception::Respond(ok("{}")));
    }

    #[tokio::test]
    async fn test_upgrade_waits_for_clients_then_cuts_over() {
        let f = fixture().await;
        f.host.add_client(client("a", "/", true));
        let v1 = f.registration.register(agent_on(&f.db, &f.network, &f.host, versioned("v1", false))).await.unwrap();
        f.network.respond("/api/members", ok("v1 members"));
        f.registration.handle_fetch(&get("/api/members")).await;

        let v2 = f.registration.register(agent_on(&f.db, &f.network, &f.host, versioned("v2", false))).await.unwrap();

        assert_eq!(v2.state(), LifecycleState::Waiting);
        assert_eq!(f.registration.active().await.unwrap().version(), "v1");
        assert!(f.db.has_partition("lantern-dynamic-v1").await.unwrap());

        f.host.remove_client("a");
        assert!(f.registration.try_activate().await.unwrap());

        assert_eq!(v1.state(), LifecycleState::Superseded);
        assert_eq!(v2.state(), LifecycleState::Active);
        let mut names = f.db.partition_names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["lantern-static-v2".to_string()]);

        f.network.fail("/api/members");
        let response = f.registration.handle_fetch(&get("/api/members")).await;
        let Interception::Respond(response) = response else { panic!("expected a response") };
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_skip_waiting_message_activates_waiting_agent() {
        let f = fixture().await;
        f.host.add_client(client("a", "/", true));
        f.registration.register(agent_on(&f.db, &f.network, &f.host, versioned("v1", false))).await.unwrap();
        let v2 = f.registration.register(agent_on(&f.db, &f.network, &f.host, versioned("v2", false))).await.unwrap();
        assert_eq!(v2.state(), LifecycleState::Waiting);

        f.registration.handle_control(&ControlMessage::SkipWaiting).await;

        assert_eq!(f.registration.active().await.unwrap().version(), "v2");
        assert!(!f.db.has_partition("lantern-static-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_skip_waiting_on_install_activates_with_open_clients() {
        let f = fixture().await;
        f.host.add_client(client("a", "/", true));
        f.registration.register(agent_on(&f.db, &f.network, &f.host, versioned("v1", true))).await.unwrap();

        let v2 = f.registration.register(agent_on(&f.db, &f.network, &f.host, versioned("v2", true))).await.unwrap();

        assert_eq!(v2.state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_agent() {
        let f = fixture().await;
        f.registration.register(agent_on(&f.db, &f.network, &f.host, versioned("v1", true))).await.unwrap();

        f.network.respond("/offline.html", CachedResponse::text(404, "gone"));
        let err = f
            .registration
            .register(agent_on(&f.db, &f.network, &f.host, versioned("v2", true)))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INSTALL_FAILED");
        assert_eq!(f.registration.active().await.unwrap().version(), "v1");
        assert!(f.registration.waiting().await.is_none());
        assert!(!f.db.has_partition("lantern-static-v2").await.unwrap());
        let response = f.registration.handle_fetch(&get("/manifest.json")).await;
        assert_eq!(response, Interception::Respond(ok("{}")));
    }

    #[tokio::test]
    async fn test_late_write_from_superseded_agent_leaves_no_partition() {
        let f = fixture().await;
        let v1 = f.registration.register(agent_on(&f.db, &f.network, &f.host, versioned("v1", true))).await.unwrap();
        f.registration.register(agent_on(&f.db, &f.network, &f.host, versioned("v2", true))).await.unwrap();
        assert_eq!(v1.state(), LifecycleState::Superseded);

        f.network.respond("/api/late", ok("late"));
        assert_eq!(v1.network_first(&get("/api/late")).await, ok("late"));
        assert_eq!(v1.stale_while_revalidate(&get("/events")).await.status, 408);

        assert_eq!(f.db.partition_names().await.unwrap(), vec!["lantern-static-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_cache_before_activation_refills_bootstrap_set() {
        let f = fixture().await;
        f.host.add_client(client("a", "/", true));
        f.registration.register(agent_on(&f.db, &f.network, &f.host, versioned("v1", false))).await.unwrap();
        let v2 = f.registration.register(agent_on(&f.db, &f.network, &f.host, versioned("v2", false))).await.unwrap();
        assert_eq!(v2.state(), LifecycleState::Waiting);

        f.registration.handle_control(&ControlMessage::ClearCache).await;
        assert!(!f.db.has_partition("lantern-static-v2").await.unwrap());

        f.registration.handle_control(&ControlMessage::SkipWaiting).await;

        assert_eq!(f.registration.active().await.unwrap().version(), "v2");
        f.network.fail("/sermons");
        let response = f.registration.handle_fetch(&navigate("/sermons")).await;
        assert_eq!(response, Interception::Respond(ok("offline")));
    }
}
