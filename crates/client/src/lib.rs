//! Network layer for offcache.
//!
//! This crate provides the `Network` seam the worker fetches through, its
//! reqwest-backed implementation, and URL/origin helpers shared by the
//! interceptor and the notification hooks.

pub mod fetch;

pub use fetch::{FetchConfig, HttpNetwork, Network, UrlError, canonicalize, origin_in, same_origin};
