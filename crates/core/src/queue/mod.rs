//! Pending-mutation queue.
//!
//! Records writes that could not be confirmed against the backend, in the
//! order they were made, together with the connectivity state of the
//! application. The queue performs no network I/O: whoever drains it owns
//! retry, backoff and conflict handling. Two offline edits of the same record
//! resolve last-write-wins at the backend.
//!
//! State lives in a `tokio::sync::watch` channel, so every change is
//! observable through [`MutationQueue::subscribe`].

mod connectivity;

pub use connectivity::{ConnectivityListener, ConnectivityState};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

/// Identifier assigned to a mutation at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kind of write a mutation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// A write not yet confirmed against the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    pub id: MutationId,
    pub kind: MutationKind,
    /// Target collection (table) on the backend.
    pub collection: String,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

/// Everything a subscriber can observe.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueState {
    pub connectivity: ConnectivityState,
    pub mutations: Vec<PendingMutation>,
}

/// Outcome of [`MutationQueue::drain_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub remaining: usize,
    /// The mutation whose delivery failed and stopped the drain.
    pub failed: Option<MutationId>,
}

/// Observable FIFO of pending mutations.
///
/// Clones share the same queue.
#[derive(Debug, Clone)]
pub struct MutationQueue {
    state: Arc<watch::Sender<QueueState>>,
}

impl MutationQueue {
    /// Create an empty queue with the given initial connectivity.
    pub fn new(online: bool) -> Self {
        let connectivity = if online { ConnectivityState::Online } else { ConnectivityState::Offline };
        let (tx, _rx) = watch::channel(QueueState { connectivity, mutations: Vec::new() });
        Self { state: Arc::new(tx) }
    }

    /// Append a mutation and return its id.
    pub fn enqueue(&self, kind: MutationKind, collection: impl Into<String>, payload: serde_json::Value) -> MutationId {
        let mutation = PendingMutation {
            id: MutationId::new(),
            kind,
            collection: collection.into(),
            payload,
            enqueued_at: Utc::now(),
        };
        let id = mutation.id;
        tracing::debug!(%id, kind = ?mutation.kind, collection = %mutation.collection, "queued pending mutation");
        self.state.send_modify(|state| state.mutations.push(mutation));
        id
    }

    /// Remove a mutation by id after confirmed delivery.
    ///
    /// Returns false if the id is not queued. Remaining entries keep their
    /// relative order.
    pub fn dequeue(&self, id: MutationId) -> bool {
        self.state.send_if_modified(|state| {
            let before = state.mutations.len();
            state.mutations.retain(|m| m.id != id);
            state.mutations.len() != before
        })
    }

    /// Drop every pending mutation.
    pub fn clear(&self) {
        self.state.send_if_modified(|state| {
            let had_any = !state.mutations.is_empty();
            state.mutations.clear();
            had_any
        });
    }

    pub fn count(&self) -> usize {
        self.state.borrow().mutations.len()
    }

    /// Snapshot of the pending mutations in FIFO order.
    pub fn list(&self) -> Vec<PendingMutation> {
        self.state.borrow().mutations.clone()
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.state.borrow().connectivity
    }

    /// Observe every change to the queue or the connectivity state.
    pub fn subscribe(&self) -> watch::Receiver<QueueState> {
        self.state.subscribe()
    }

    /// Apply a platform connectivity event.
    ///
    /// Coming back online enters `Syncing`; going offline always wins, even
    /// mid-sync.
    pub fn set_online(&self, online: bool) {
        let next = if online { ConnectivityState::Syncing } else { ConnectivityState::Offline };
        self.transition(next);
    }

    /// Report that the caller finished draining the queue.
    ///
    /// Only a `Syncing` queue moves to `Online`; a queue that went offline
    /// during the drain stays offline.
    pub fn finish_sync(&self) {
        if self.connectivity() == ConnectivityState::Syncing {
            self.transition(ConnectivityState::Online);
        }
    }

    pub(crate) fn reset_connectivity(&self, online: bool) {
        let next = if online { ConnectivityState::Online } else { ConnectivityState::Offline };
        self.transition(next);
    }

    fn transition(&self, next: ConnectivityState) {
        let changed = self.state.send_if_modified(|state| {
            if state.connectivity == next {
                return false;
            }
            state.connectivity = next;
            true
        });
        if changed {
            tracing::info!(state = %next, pending = self.count(), "connectivity changed");
        }
    }

    /// Subscribe to a platform online/offline signal.
    ///
    /// The current signal value seeds the state directly; later changes go
    /// through [`MutationQueue::set_online`]. Must be called inside a tokio
    /// runtime. Dropping the returned listener unsubscribes.
    pub fn attach(&self, mut signal: watch::Receiver<bool>) -> ConnectivityListener {
        self.reset_connectivity(*signal.borrow_and_update());
        let queue = self.clone();
        let handle = tokio::spawn(async move {
            while signal.changed().await.is_ok() {
                let online = *signal.borrow_and_update();
                queue.set_online(online);
            }
        });
        ConnectivityListener::new(handle)
    }

    /// Deliver pending mutations in FIFO order, dequeuing each one that
    /// succeeds and stopping at the first failure. Calls
    /// [`MutationQueue::finish_sync`] when done.
    ///
    /// Mutations enqueued while the drain runs are left for the next pass.
    /// Callers must not run two drains at once.
    pub async fn drain_with<F, Fut, E>(&self, mut deliver: F) -> DrainReport
    where
        F: FnMut(PendingMutation) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let mut report = DrainReport::default();
        for mutation in self.list() {
            let id = mutation.id;
            match deliver(mutation).await {
                Ok(()) => {
                    self.dequeue(id);
                    report.delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "mutation delivery failed, stopping drain");
                    report.failed = Some(id);
                    break;
                }
            }
        }
        report.remaining = self.count();
        self.finish_sync();
        report
    }
}
