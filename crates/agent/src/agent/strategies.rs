//! The four caching strategies.
//!
//! Every strategy returns a response; network and storage failures are
//! converted to a fallback here and never reach the caller.

use std::sync::Arc;

use lantern_core::{CachedResponse, Partition, Request};
use serde_json::json;
use tokio::sync::watch;

use super::{LifecycleState, ProxyAgent};

/// Synthetic response for a sub-resource that is neither cached nor
/// reachable.
pub fn offline_response() -> CachedResponse {
    CachedResponse::text(408, "Offline")
}

/// Synthetic response for API traffic with nothing cached.
pub fn offline_api_response() -> CachedResponse {
    CachedResponse::json(
        503,
        &json!({
            "error": "offline",
            "message": "You are offline and this data is not cached",
        }),
    )
}

/// Last resort for a navigation when even the offline page is missing.
pub fn offline_document_response() -> CachedResponse {
    CachedResponse::text(503, "Offline")
}

/// Look up a request, treating storage errors as a miss.
async fn lookup(partition: &Partition, request: &Request) -> Option<CachedResponse> {
    match partition.match_request(request).await {
        Ok(hit) => hit,
        Err(e) => {
            tracing::warn!(partition = partition.name(), url = %request.url, error = %e, "cache lookup failed");
            None
        }
    }
}

/// Store a 2xx response, then trim the partition to `max_entries`.
///
/// Agents that were superseded or discarded never write: their partitions
/// may already be gone, and a write would bring them back.
async fn store(
    partition: &Partition, request: &Request, response: &CachedResponse, max_entries: usize,
    lifecycle: &watch::Receiver<LifecycleState>,
) {
    if !response.is_success() {
        return;
    }
    let state = *lifecycle.borrow();
    if !state.accepts_writes() {
        tracing::debug!(partition = partition.name(), url = %request.url, %state, "skipping write from retired agent");
        return;
    }
    if let Err(e) = partition.put(request, response).await {
        tracing::warn!(partition = partition.name(), url = %request.url, error = %e, "cache write failed");
        return;
    }
    if max_entries > 0 {
        match partition.trim(max_entries).await {
            Ok(0) => {}
            Ok(trimmed) => tracing::debug!(partition = partition.name(), trimmed, "trimmed partition"),
            Err(e) => tracing::warn!(partition = partition.name(), error = %e, "partition trim failed"),
        }
    }
}

impl ProxyAgent {
    /// Serve from the static partition; fill it from the network on a miss.
    pub async fn cache_first(&self, request: &Request) -> CachedResponse {
        if let Some(hit) = lookup(&self.static_cache, request).await {
            tracing::debug!(url = %request.url, "cache-first hit");
            return hit;
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                self.store_static(request, &response).await;
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "cache-first miss while offline");
                offline_response()
            }
        }
    }

    /// Prefer the network; fall back to the dynamic partition, then to a
    /// JSON offline error.
    pub async fn network_first(&self, request: &Request) -> CachedResponse {
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store_dynamic(request, &response).await;
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network-first falling back to cache");
                lookup(&self.dynamic_cache, request)
                    .await
                    .unwrap_or_else(offline_api_response)
            }
        }
    }

    /// Network-first for documents. The fallback chain is the cached copy
    /// of the exact document (dynamic, then the bootstrap set), then the
    /// offline page.
    pub async fn network_first_with_fallback(&self, request: &Request) -> CachedResponse {
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store_dynamic(request, &response).await;
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "document fetch failed, using fallback");
                if let Some(hit) = lookup(&self.dynamic_cache, request).await {
                    return hit;
                }
                if let Some(hit) = lookup(&self.static_cache, &Request::get(request.url.clone())).await {
                    return hit;
                }
                self.offline_page().await
            }
        }
    }

    /// Answer from the cache immediately and refresh the dynamic partition
    /// in a detached task. The dynamic partition is checked first, then the
    /// static one, so bootstrapped and pre-warmed URLs are served too.
    /// Without a cached copy the caller waits for the network.
    pub async fn stale_while_revalidate(&self, request: &Request) -> CachedResponse {
        let cached = match lookup(&self.dynamic_cache, request).await {
            Some(hit) => Some(hit),
            None => lookup(&self.static_cache, request).await,
        };
        if let Some(hit) = cached {
            self.spawn_revalidation(request.clone());
            return hit;
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                self.store_dynamic(request, &response).await;
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "stale-while-revalidate miss while offline");
                offline_response()
            }
        }
    }

    async fn store_static(&self, request: &Request, response: &CachedResponse) {
        store(&self.static_cache, request, response, 0, &self.state.subscribe()).await;
    }

    async fn store_dynamic(&self, request: &Request, response: &CachedResponse) {
        store(&self.dynamic_cache, request, response, self.config.dynamic_max_entries, &self.state.subscribe()).await;
    }

    fn spawn_revalidation(&self, request: Request) {
        let network = Arc::clone(&self.network);
        let partition = self.dynamic_cache.clone();
        let max_entries = self.config.dynamic_max_entries;
        let lifecycle = self.state.subscribe();
        tokio::spawn(async move {
            match network.fetch(&request).await {
                Ok(response) => store(&partition, &request, &response, max_entries, &lifecycle).await,
                Err(e) => tracing::debug!(url = %request.url, error = %e, "background revalidation failed"),
            }
        });
    }

    async fn offline_page(&self) -> CachedResponse {
        let page = match self.resolve(&self.config.offline_page) {
            Ok(url) => lookup(&self.static_cache, &Request::get(url)).await,
            Err(e) => {
                tracing::warn!(error = %e, "offline page URL is invalid");
                None
            }
        };
        page.unwrap_or_else(offline_document_response)
    }
}
