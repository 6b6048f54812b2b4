//! Typed messages exchanged between the agent and open application
//! instances.
//!
//! Both directions use `{ "type": "...", ...payload }` envelopes.

use serde::{Deserialize, Serialize};

/// Messages the agent posts to application instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMessage {
    /// Connectivity is back; drain queued note writes.
    SyncNotes,
    /// Connectivity is back; drain queued attendance writes.
    SyncAttendance,
    /// Connectivity is back; drain everything.
    SyncAll,
    /// Navigate the receiving instance to `url`.
    Navigate { url: String },
}

/// Control messages application instances send to the agent.
///
/// All of them are fire-and-forget and safe to repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate a waiting agent without waiting for pages to close.
    SkipWaiting,
    /// Delete every cache partition.
    ClearCache,
    /// Pre-warm the static partition with these URLs.
    CacheUrls {
        #[serde(default)]
        urls: Vec<String>,
    },
}
