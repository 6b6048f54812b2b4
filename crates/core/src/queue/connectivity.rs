//! Connectivity state and the platform signal subscription.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Derived online/offline state of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Online,
    Offline,
    /// Back online and draining the queue.
    Syncing,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
            ConnectivityState::Syncing => write!(f, "syncing"),
        }
    }
}

/// Live subscription to a connectivity signal.
///
/// Unsubscribes when dropped.
#[derive(Debug)]
pub struct ConnectivityListener {
    handle: JoinHandle<()>,
}

impl ConnectivityListener {
    pub(super) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    /// Stop observing the signal.
    pub fn detach(self) {}
}

impl Drop for ConnectivityListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::super::MutationQueue;
    use super::*;
    use std::time::Duration;
    use tokio::sync::watch;

    async fn wait_for(queue: &MutationQueue, expected: ConnectivityState) {
        let mut rx = queue.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.connectivity == expected))
            .await
            .expect("state change timed out")
            .unwrap();
    }

    #[tokio::test]
    async fn test_attach_seeds_from_signal() {
        let (_tx, rx) = watch::channel(false);
        let queue = MutationQueue::new(true);
        let _listener = queue.attach(rx);
        assert_eq!(queue.connectivity(), ConnectivityState::Offline);
    }

    #[tokio::test]
    async fn test_signal_drives_transitions() {
        let (tx, rx) = watch::channel(false);
        let queue = MutationQueue::new(false);
        let _listener = queue.attach(rx);

        tx.send(true).unwrap();
        wait_for(&queue, ConnectivityState::Syncing).await;

        queue.finish_sync();
        assert_eq!(queue.connectivity(), ConnectivityState::Online);

        tx.send(false).unwrap();
        wait_for(&queue, ConnectivityState::Offline).await;
    }

    #[tokio::test]
    async fn test_detach_stops_observing() {
        let (tx, rx) = watch::channel(true);
        let queue = MutationQueue::new(true);
        let listener = queue.attach(rx);
        listener.detach();
        tokio::task::yield_now().await;

        let _ = tx.send(false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.connectivity(), ConnectivityState::Online);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectivityState::Syncing.to_string(), "syncing");
    }
}
