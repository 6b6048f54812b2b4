//! Foreground control messages.

use futures_util::future::join_all;
use lantern_core::{ControlMessage, Error, Request};

use super::ProxyAgent;

impl ProxyAgent {
    /// Apply a control message. Failures are logged; nothing is returned to
    /// the sender.
    pub async fn handle_control(&self, message: &ControlMessage) {
        match message {
            ControlMessage::SkipWaiting => {
                tracing::info!(version = self.version(), "skip waiting requested");
                self.skip_waiting();
            }
            ControlMessage::ClearCache => {
                if let Err(e) = self.clear_all_partitions().await {
                    tracing::error!(error = %e, "failed to clear partitions");
                }
            }
            ControlMessage::CacheUrls { urls } => {
                let stored = self.seed_static(urls).await;
                tracing::info!(requested = urls.len(), stored, "pre-warmed static partition");
            }
        }
    }

    /// Delete every partition, current ones included. Returns how many were
    /// deleted.
    pub async fn clear_all_partitions(&self) -> Result<usize, Error> {
        let mut deleted = 0;
        for name in self.db.partition_names().await? {
            if self.db.delete_partition(&name).await? {
                deleted += 1;
            }
        }
        tracing::info!(deleted, "cleared all partitions");
        Ok(deleted)
    }

    /// Fetch `urls` concurrently and store each 2xx response in the static
    /// partition. Returns how many were stored.
    pub async fn seed_static(&self, urls: &[String]) -> usize {
        let results = join_all(urls.iter().map(|url| self.seed_one(url))).await;
        results.into_iter().filter(|stored| *stored).count()
    }

    async fn seed_one(&self, url: &str) -> bool {
        let request = match self.resolve(url) {
            Ok(resolved) => Request::get(resolved),
            Err(e) => {
                tracing::warn!(error = %e, "skipping invalid URL");
                return false;
            }
        };

        let response = match self.network.fetch(&request).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                tracing::warn!(url = %request.url, status = response.status, "not caching non-success response");
                return false;
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "failed to fetch URL for caching");
                return false;
            }
        };

        match self.static_cache.put(&request, &response).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "failed to cache URL");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNetwork, agent_with, get, ok};

    #[tokio::test]
    async fn test_skip_waiting_marks_agent() {
        let (agent, _) = agent_with(FakeNetwork::offline()).await;
        assert!(!agent.skip_waiting_requested());

        agent.handle_control(&ControlMessage::SkipWaiting).await;
        agent.handle_control(&ControlMessage::SkipWaiting).await;

        assert!(agent.skip_waiting_requested());
    }

    #[tokio::test]
    async fn test_clear_cache_deletes_every_partition() {
        let (agent, _) = agent_with(FakeNetwork::offline()).await;
        agent.static_cache.put(&get("/logo.png"), &ok("png")).await.unwrap();
        agent.dynamic_cache.put(&get("/events"), &ok("events")).await.unwrap();
        agent.db.partition("lantern-static-v0").put(&get("/"), &ok("old")).await.unwrap();

        agent.handle_control(&ControlMessage::ClearCache).await;

        assert!(agent.db.partition_names().await.unwrap().is_empty());
        assert!(agent.static_cache.match_request(&get("/logo.png")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_cache_on_empty_store() {
        let (agent, _) = agent_with(FakeNetwork::offline()).await;
        assert_eq!(agent.clear_all_partitions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_urls_tolerates_failures() {
        let network = FakeNetwork::offline();
        network.respond("/sermons/1.mp3", ok("audio"));
        network.respond("/sermons/2.mp3", lantern_core::CachedResponse::text(500, "boom"));
        let (agent, _) = agent_with(network).await;

        let urls = vec!["/sermons/1.mp3".into(), "/sermons/2.mp3".into(), "/sermons/3.mp3".into()];
        assert_eq!(agent.seed_static(&urls).await, 1);

        assert!(agent.static_cache.match_request(&get("/sermons/1.mp3")).await.unwrap().is_some());
        assert!(agent.static_cache.match_request(&get("/sermons/2.mp3")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_urls_message() {
        let network = FakeNetwork::offline();
        network.respond("/bulletin.pdf", ok("pdf"));
        let (agent, _) = agent_with(network).await;

        agent.handle_control(&ControlMessage::CacheUrls { urls: vec!["/bulletin.pdf".into()] }).await;

        assert_eq!(agent.static_cache.len().await.unwrap(), 1);
    }
}
