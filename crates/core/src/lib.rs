//! Core types and shared functionality for lantern.
//!
//! This crate provides:
//! - Versioned cache partitions with a SQLite backend
//! - Request and response snapshot types
//! - The foreground/agent message protocol
//! - The pending-mutation queue and connectivity tracking
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod queue;

pub use cache::{CacheDb, Partition};
pub use config::AppConfig;
pub use error::Error;
pub use http::{CachedResponse, Request, RequestMode};
pub use protocol::{AgentMessage, ControlMessage};
pub use queue::{ConnectivityState, MutationId, MutationKind, MutationQueue, PendingMutation};
