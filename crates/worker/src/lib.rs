//! Offline-first caching worker.
//!
//! `Worker` owns the lifecycle and routes fetches through the cache-first
//! `Interceptor`; `Runtime` drives it from line-delimited JSON events.

pub mod control;
pub mod fallback;
pub mod host;
pub mod interceptor;
pub mod lifecycle;
pub mod notify;
pub mod runtime;
pub mod seed;
pub mod settings;

#[cfg(test)]
mod testing;

pub use host::{ClientInfo, Host, Notification, NotificationAction};
pub use interceptor::{FetchOutcome, InterceptDecision, Interceptor, SkipReason};
pub use lifecycle::{ErrorSignal, Worker, WorkerState};
pub use runtime::{Envelope, FetchRequest, HostCommand, Outbound, Runtime, StdioHost, WorkerEvent};
pub use seed::{SeedLoader, SeedReport};
pub use settings::WorkerSettings;
