//! Per-request routing: bypass, cache-first, or network-then-cache.
//!
//! A cached entry is served without touching the network and without any
//! freshness check; it stays authoritative until the generation is cleared
//! or superseded. On a miss the network answers, and eligible responses are
//! written back by a detached task the caller never waits on.

use std::sync::Arc;

use offcache_client::{Network, origin_in, same_origin};
use offcache_core::{CacheDb, GenerationId, Request, Response, ResponseKind};
use regex::Regex;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use url::Url;

use crate::fallback::FallbackResolver;
use crate::settings::WorkerSettings;

/// Why a request was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Method,
    Scheme,
    Excluded,
    /// The worker does not control pages yet.
    Inactive,
}

/// Route chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptDecision {
    Skip(SkipReason),
    CacheFirst,
    /// Cache missed; the network answers and may populate the cache.
    NetworkThenCache,
}

/// What the interceptor did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the caller fetches it directly.
    Bypass(SkipReason),
    Cached(Response),
    Network(Response),
    /// The network produced nothing; this is the fallback answer.
    Fallback(Response),
}

impl FetchOutcome {
    pub fn decision(&self) -> InterceptDecision {
        match self {
            FetchOutcome::Bypass(reason) => InterceptDecision::Skip(*reason),
            FetchOutcome::Cached(_) => InterceptDecision::CacheFirst,
            FetchOutcome::Network(_) | FetchOutcome::Fallback(_) => InterceptDecision::NetworkThenCache,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Bypass(_) => None,
            FetchOutcome::Cached(r) | FetchOutcome::Network(r) | FetchOutcome::Fallback(r) => Some(r),
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Bypass(_) => None,
            FetchOutcome::Cached(r) | FetchOutcome::Network(r) | FetchOutcome::Fallback(r) => Some(r),
        }
    }

    /// Short label for logs and wire replies.
    pub fn source(&self) -> &'static str {
        match self {
            FetchOutcome::Bypass(_) => "bypass",
            FetchOutcome::Cached(_) => "cache",
            FetchOutcome::Network(_) => "network",
            FetchOutcome::Fallback(_) => "fallback",
        }
    }
}

pub struct Interceptor {
    db: CacheDb,
    generation: GenerationId,
    origin: Url,
    font_origins: Vec<Url>,
    exclusions: Vec<Regex>,
    network: Arc<dyn Network>,
    fallback: FallbackResolver,
    writes: Mutex<JoinSet<()>>,
}

impl Interceptor {
    pub fn new(db: CacheDb, settings: &WorkerSettings, network: Arc<dyn Network>) -> Self {
        let fallback = FallbackResolver::new(
            db.clone(),
            settings.generation.clone(),
            settings.shell_urls.clone(),
            settings.app_name.clone(),
        );
        Self {
            db,
            generation: settings.generation.clone(),
            origin: settings.origin.clone(),
            font_origins: settings.font_origins.clone(),
            exclusions: settings.exclusions.clone(),
            network,
            fallback,
            writes: Mutex::new(JoinSet::new()),
        }
    }

    /// Decide whether a request is intercepted at all.
    pub fn classify(&self, request: &Request) -> InterceptDecision {
        if !request.is_get() {
            return InterceptDecision::Skip(SkipReason::Method);
        }
        if !matches!(request.url.scheme(), "http" | "https") {
            return InterceptDecision::Skip(SkipReason::Scheme);
        }
        if self.exclusions.iter().any(|re| re.is_match(request.url.as_str())) {
            return InterceptDecision::Skip(SkipReason::Excluded);
        }
        InterceptDecision::CacheFirst
    }

    /// Whether a network response may be written to the cache.
    ///
    /// Exactly 200, readable (not opaque or synthesized), and served from the
    /// app origin or one of the font origins.
    pub fn is_cacheable(&self, response: &Response) -> bool {
        if response.status != 200 {
            return false;
        }
        if !matches!(response.kind, ResponseKind::Basic | ResponseKind::Cors) {
            return false;
        }
        match &response.url {
            Some(url) => same_origin(url, &self.origin) || origin_in(url, &self.font_origins),
            None => false,
        }
    }

    pub async fn handle(&self, request: &Request) -> FetchOutcome {
        if let InterceptDecision::Skip(reason) = self.classify(request) {
            return FetchOutcome::Bypass(reason);
        }

        let store = self.db.store(self.generation.as_str());
        match store.match_request(request).await {
            Ok(Some(cached)) => {
                tracing::debug!("cache hit for {}", request.url);
                return FetchOutcome::Cached(cached);
            }
            Ok(None) => tracing::debug!("cache miss for {}", request.url),
            Err(e) => tracing::warn!(url = %request.url, error = %e, "cache lookup failed; treating as miss"),
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if self.is_cacheable(&response) {
                    self.store_detached(request.clone(), response.clone()).await;
                }
                FetchOutcome::Network(response)
            }
            Err(e) => {
                tracing::debug!("network failed for {}: {}", request.url, e);
                FetchOutcome::Fallback(self.fallback.resolve(request).await)
            }
        }
    }

    async fn store_detached(&self, request: Request, response: Response) {
        let store = self.db.store(self.generation.as_str());
        let mut writes = self.writes.lock().await;
        while writes.try_join_next().is_some() {}
        writes.spawn(async move {
            if let Err(e) = store.put(&request, &response).await {
                tracing::warn!(url = %request.url, error = %e, "cache write failed");
            }
        });
    }

    /// Wait for every detached cache write started so far.
    ///
    /// Write failures were already logged; nothing is reported here.
    pub async fn drain_writes(&self) {
        let mut pending = std::mem::take(&mut *self.writes.lock().await);
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                tracing::warn!("cache write task aborted: {e}");
            }
        }
    }
}
