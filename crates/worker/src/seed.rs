//! Install-time population of the current generation from the manifest.
//!
//! A bulk pass fetches every entry and writes them in one transaction, or
//! writes nothing if any entry fails. When it fails, each entry is retried
//! on its own and failures are only logged. Seeding itself never fails.

use std::sync::Arc;

use futures_util::future::{join_all, try_join_all};
use offcache_client::Network;
use offcache_core::{CacheMode, Error, Request, ResourceManifest, Response, Store};
use url::Url;

/// What seeding managed to store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Whether the atomic bulk pass succeeded.
    pub bulk: bool,
    pub stored: Vec<Url>,
    pub failed: Vec<(Url, String)>,
}

pub struct SeedLoader {
    network: Arc<dyn Network>,
}

fn seed_request(url: &Url) -> Request {
    Request::get(url.clone()).with_cache(CacheMode::Reload)
}

impl SeedLoader {
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self { network }
    }

    pub async fn seed(&self, manifest: &ResourceManifest, store: &Store) -> SeedReport {
        match self.seed_bulk(manifest, store).await {
            Ok(()) => {
                tracing::info!(count = manifest.len(), generation = store.generation(), "seeded manifest");
                SeedReport { bulk: true, stored: manifest.entries().to_vec(), failed: Vec::new() }
            }
            Err(e) => {
                tracing::warn!(error = %e, "bulk seeding failed; retrying entries individually");
                self.seed_each(manifest, store).await
            }
        }
    }

    async fn fetch_ok(&self, url: &Url) -> Result<(Request, Response), Error> {
        let request = seed_request(url);
        let response = self.network.fetch(&request).await?;
        if !response.ok() {
            return Err(Error::Network(format!("{url}: status {}", response.status)));
        }
        Ok((request, response))
    }

    async fn seed_bulk(&self, manifest: &ResourceManifest, store: &Store) -> Result<(), Error> {
        let pairs = try_join_all(manifest.entries().iter().map(|url| self.fetch_ok(url))).await?;
        store.put_all(&pairs).await
    }

    async fn seed_each(&self, manifest: &ResourceManifest, store: &Store) -> SeedReport {
        let results = join_all(manifest.entries().iter().map(|url| async move {
            let (request, response) = self.fetch_ok(url).await?;
            store.put(&request, &response).await
        }))
        .await;

        let mut report = SeedReport::default();
        for (url, result) in manifest.entries().iter().zip(results) {
            match result {
                Ok(()) => report.stored.push(url.clone()),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "failed to seed resource");
                    report.failed.push((url.clone(), e.to_string()));
                }
            }
        }
        tracing::info!(
            stored = report.stored.len(),
            failed = report.failed.len(),
            generation = store.generation(),
            "seeded manifest individually"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNetwork, ORIGIN, html, url};
    use offcache_core::CacheDb;

    fn manifest(entries: &[&str]) -> ResourceManifest {
        ResourceManifest::resolve(&Url::parse(ORIGIN).unwrap(), entries).unwrap()
    }

    async fn store() -> Store {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_generation("app-v2").await.unwrap()
    }

    #[tokio::test]
    async fn test_all_entries_seeded_in_bulk() {
        let network = Arc::new(FakeNetwork::new());
        network.route(&url("/"), html("root"));
        network.route(&url("/index.html"), html("index"));
        let store = store().await;

        let report = SeedLoader::new(network.clone())
            .seed(&manifest(&["/", "/index.html"]), &store)
            .await;

        assert!(report.bulk);
        assert_eq!(report.stored.len(), 2);
        assert!(report.failed.is_empty());
        let cached = store.match_request(&Request::get(url("/index.html"))).await.unwrap();
        assert_eq!(&cached.unwrap().body[..], b"index");
    }

    #[tokio::test]
    async fn test_seed_requests_bypass_caches() {
        let network = Arc::new(FakeNetwork::new());
        network.route(&url("/"), html("root"));

        SeedLoader::new(network.clone()).seed(&manifest(&["/"]), &store().await).await;

        assert!(network.calls().iter().all(|r| r.cache == CacheMode::Reload));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successes() {
        let network = Arc::new(FakeNetwork::new());
        network.route(&url("/index.html"), html("index"));
        let store = store().await;

        let report = SeedLoader::new(network.clone())
            .seed(&manifest(&["/", "/index.html"]), &store)
            .await;

        assert!(!report.bulk);
        assert_eq!(report.stored, vec![url("/index.html")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, url("/"));
        assert!(store.match_request(&Request::get(url("/index.html"))).await.unwrap().is_some());
        assert!(store.match_request(&Request::get(url("/"))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_status_fails_entry() {
        let network = Arc::new(FakeNetwork::new());
        network.route(&url("/"), html("root"));
        network.route(&url("/manifest.json"), Response::new(404, "Not Found", ""));
        let store = store().await;

        let report = SeedLoader::new(network)
            .seed(&manifest(&["/", "/manifest.json"]), &store)
            .await;

        assert!(!report.bulk);
        assert_eq!(report.stored, vec![url("/")]);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_everything_unreachable_still_completes() {
        let network = Arc::new(FakeNetwork::new());
        let store = store().await;

        let report = SeedLoader::new(network)
            .seed(&manifest(&["/", "https://fonts.googleapis.com/css2?family=Inter"]), &store)
            .await;

        assert!(report.stored.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(store.is_empty().await.unwrap());
    }
}
