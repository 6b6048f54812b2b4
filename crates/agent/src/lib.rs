//! The lantern proxy agent.
//!
//! This crate provides:
//! - `ProxyAgent`: routing, the four caching strategies, lifecycle,
//!   push notifications, sync relay and the remote control channel
//! - `Registration`: which agent version is active and which is waiting
//! - `Host`: the platform seam the agent talks to open application instances through
//! - A JSON-lines stdio host for running the agent as a standalone process

pub mod agent;
pub mod host;
pub mod registration;
pub mod stdio;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{Interception, LifecycleState, ProxyAgent};
pub use host::{ClientId, ClientInfo, Host};
pub use registration::Registration;
