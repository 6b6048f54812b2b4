//! The proxy agent.
//!
//! One `ProxyAgent` exists per version tag. It answers intercepted requests
//! from its own pair of partitions (`{prefix}-static-{version}` and
//! `{prefix}-dynamic-{version}`) and never reads another version's entries.
//!
//! - `routing`: the route policy table
//! - `strategies`: cache-first, network-first, network-first with offline
//!   page, stale-while-revalidate
//! - `lifecycle`: install, activate, supersede
//! - `push`: push envelopes and notification clicks
//! - `sync`: background-sync relay to open instances
//! - `control`: foreground control messages

pub mod control;
pub mod lifecycle;
pub mod push;
pub mod routing;
pub mod strategies;
pub mod sync;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use lantern_client::{Network, resolve};
use lantern_core::{AgentMessage, AppConfig, CacheDb, CachedResponse, Error, Partition, Request};
use tokio::sync::watch;
use url::Url;

use crate::host::Host;

pub use lifecycle::{LifecycleState, PartitionNames};
pub use routing::{Route, RoutePolicy};

/// What the agent does with an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Not intercepted; the host performs the request untouched.
    Bypass,
    /// The agent's answer.
    Respond(CachedResponse),
}

/// A versioned network-interception agent.
pub struct ProxyAgent {
    config: AppConfig,
    origin: Url,
    names: PartitionNames,
    db: CacheDb,
    static_cache: Partition,
    dynamic_cache: Partition,
    routes: RoutePolicy,
    network: Arc<dyn Network>,
    host: Arc<dyn Host>,
    state: watch::Sender<LifecycleState>,
    skip_waiting: AtomicBool,
}

impl std::fmt::Debug for ProxyAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyAgent")
            .field("version", &self.config.cache_version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ProxyAgent {
    /// Create an agent for `config.cache_version`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the configured origin does not parse.
    pub fn new(config: AppConfig, db: CacheDb, network: Arc<dyn Network>, host: Arc<dyn Host>) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let names = PartitionNames::new(&config.cache_prefix, &config.cache_version);
        let static_cache = db.partition(&names.static_name);
        let dynamic_cache = db.partition(&names.dynamic_name);
        let routes = RoutePolicy::from_config(&config);
        let (state, _) = watch::channel(LifecycleState::Parsed);

        Ok(Self {
            config,
            origin,
            names,
            db,
            static_cache,
            dynamic_cache,
            routes,
            network,
            host,
            state,
            skip_waiting: AtomicBool::new(false),
        })
    }

    pub fn version(&self) -> &str {
        &self.config.cache_version
    }

    pub fn partition_names(&self) -> &PartitionNames {
        &self.names
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Answer an intercepted request.
    ///
    /// Never fails: every network or storage failure ends in a cached value
    /// or a synthetic response.
    pub async fn handle_fetch(&self, request: &Request) -> Interception {
        let route = self.routes.classify(request);
        tracing::trace!(url = %request.url, ?route, "intercepted request");
        match route {
            Route::Bypass => Interception::Bypass,
            Route::CacheFirst => Interception::Respond(self.cache_first(request).await),
            Route::NetworkFirst => Interception::Respond(self.network_first(request).await),
            Route::NetworkFirstWithFallback => Interception::Respond(self.network_first_with_fallback(request).await),
            Route::StaleWhileRevalidate => Interception::Respond(self.stale_while_revalidate(request).await),
        }
    }

    /// Post a message to every open instance; returns how many received it.
    pub(crate) async fn broadcast(&self, message: &AgentMessage) -> usize {
        let mut delivered = 0;
        for client in self.host.clients().await {
            match self.host.post_message(&client.id, message).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(client = %client.id, error = %e, "failed to post message"),
            }
        }
        delivered
    }

    /// Resolve an app-relative path against the origin.
    pub(crate) fn resolve(&self, input: &str) -> Result<Url, Error> {
        resolve(&self.origin, input).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))
    }
}
