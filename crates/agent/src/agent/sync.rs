//! Background-sync relay.
//!
//! The agent never replays writes itself. On a reconnection signal it tells
//! every open instance to drain its own queue.

use std::str::FromStr;

use lantern_core::AgentMessage;

use super::ProxyAgent;

/// A recognised background-sync tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Notes,
    Attendance,
    All,
}

impl SyncTrigger {
    pub fn tag(&self) -> &'static str {
        match self {
            SyncTrigger::Notes => "sync-notes",
            SyncTrigger::Attendance => "sync-attendance",
            SyncTrigger::All => "sync-all",
        }
    }

    /// The message broadcast to open instances for this trigger.
    pub fn message(&self) -> AgentMessage {
        match self {
            SyncTrigger::Notes => AgentMessage::SyncNotes,
            SyncTrigger::Attendance => AgentMessage::SyncAttendance,
            SyncTrigger::All => AgentMessage::SyncAll,
        }
    }
}

impl FromStr for SyncTrigger {
    type Err = String;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "sync-notes" => Ok(SyncTrigger::Notes),
            "sync-attendance" => Ok(SyncTrigger::Attendance),
            "sync-all" => Ok(SyncTrigger::All),
            other => Err(format!("unknown sync tag: {other}")),
        }
    }
}

impl ProxyAgent {
    /// Relay a background-sync event. Returns how many instances were told.
    pub async fn handle_sync(&self, tag: &str) -> usize {
        let trigger = match tag.parse::<SyncTrigger>() {
            Ok(trigger) => trigger,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring sync event");
                return 0;
            }
        };

        let delivered = self.broadcast(&trigger.message()).await;
        tracing::info!(tag = trigger.tag(), delivered, "relayed sync event");
        delivered
    }
}
