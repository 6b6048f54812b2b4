//! SQLite-backed cache partitions.
//!
//! This module provides named, durable key -> response stores using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Request-addressed entries keyed by SHA-256 of method and URL
//! - Whole-partition eviction by name
//! - All-or-nothing batch writes
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod partitions;

pub use crate::Error;

pub use connection::CacheDb;
pub use partitions::Partition;
