//! Core types and shared functionality for offcache.
//!
//! This crate provides:
//! - Versioned cache generations with a SQLite backend
//! - Request/response model shared by the network layer and the worker
//! - Control channel and push payload wire types
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod manifest;
pub mod message;

pub use cache::{CacheDb, GenerationId, Store};
pub use error::Error;
pub use http::{CacheMode, Destination, Request, RequestMode, Response, ResponseKind};
pub use manifest::ResourceManifest;
pub use message::{ControlMessage, ControlReply, PushPayload};
