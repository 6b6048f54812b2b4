//! Network access for lantern.
//!
//! This crate provides the `Network` seam the agent fetches through and its
//! reqwest-backed implementation, plus URL resolution against the
//! application origin.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, Network, UrlError, resolve, same_document};
