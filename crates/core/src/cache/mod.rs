//! SQLite-backed versioned cache generations.
//!
//! Each generation is a named store of request identity → response. Exactly
//! one generation id is current for a running build; every other id under
//! the same prefix is stale and removed at activation.
//!
//! - Request identity keys via SHA-256 hashing
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod generations;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use generations::GenerationId;
pub use store::Store;
