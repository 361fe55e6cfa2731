//! HTTP network access behind the `Network` seam.
//!
//! ### Response kinds
//! - Same-origin responses are `basic`.
//! - Cross-origin responses are `cors`, unless the request was `no-cors`,
//!   in which case the response is `opaque`: status 0, no headers, no body.
//!
//! ### Cache bypass
//! Requests with cache mode `reload` or `no-cache` carry
//! `Cache-Control: no-cache` and `Pragma: no-cache` so intermediaries
//! revalidate against the origin.

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, origin_in, same_origin};

use ::url::Url;
use offcache_core::{CacheMode, Error, Request, RequestMode, Response, ResponseKind};

/// Anything that can turn a request into a response.
///
/// `Err` means no response could be obtained at all; HTTP error statuses
/// are still `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the HTTP network.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "offcache/<version>")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Origin of the application; decides basic vs cross-origin responses.
    pub app_origin: Url,
}

impl FetchConfig {
    pub fn new(app_origin: Url) -> Self {
        Self {
            user_agent: concat!("offcache/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            app_origin,
        }
    }
}

/// Classify a response the way a browser would expose it to the worker.
pub fn response_kind(mode: RequestMode, final_url: &Url, app_origin: &Url) -> ResponseKind {
    if same_origin(final_url, app_origin) {
        ResponseKind::Basic
    } else if mode == RequestMode::NoCors {
        ResponseKind::Opaque
    } else {
        ResponseKind::Cors
    }
}

/// reqwest-backed network.
pub struct HttpNetwork {
    http: Client,
    config: FetchConfig,
}

impl HttpNetwork {
    /// Create a new network client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn build(&self, request: &Request) -> Result<reqwest::RequestBuilder, Error> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::Network(format!("invalid method {}: {}", request.method, e)))?;

        let mut builder = self.http.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if matches!(request.cache, CacheMode::Reload | CacheMode::NoCache) {
            builder = builder
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::PRAGMA, "no-cache");
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        Ok(builder)
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();

        let response = self.build(request)?.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::FetchTimeout(format!("{} after {:?}", request.url, self.config.timeout))
            } else {
                Error::Network(format!("{}: {}", request.url, e))
            }
        })?;

        let final_url = response.url().clone();
        let kind = response_kind(request.mode, &final_url, &self.config.app_origin);
        if kind == ResponseKind::Opaque {
            tracing::debug!("opaque response for {}", request.url);
            return Ok(Response::opaque(final_url));
        }

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?;

        tracing::debug!(
            "fetched {} -> {} {} in {}ms ({} bytes)",
            request.url,
            final_url,
            status.as_u16(),
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(Response {
            url: Some(final_url),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            kind,
        })
    }
}
