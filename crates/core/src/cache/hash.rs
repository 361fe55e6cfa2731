//! Request identity key generation.

use sha2::{Digest, Sha256};
use url::Url;

/// Compute the storage key for a request identity (method + normalized URL).
///
/// The fragment never reaches the server, so it is dropped before hashing.
pub fn compute_cache_key(method: &str, url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("GET", &url("https://example.com/app.js"));
        let hash2 = compute_cache_key("GET", &url("https://example.com/app.js"));
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_method_case_insensitive() {
        let upper = compute_cache_key("GET", &url("https://example.com/"));
        let lower = compute_cache_key("get", &url("https://example.com/"));
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_cache_key("GET", &url("https://example.com/"));
        let head = compute_cache_key("HEAD", &url("https://example.com/"));
        assert_ne!(get, head);
    }

    #[test]
    fn test_hash_normalizes_host_and_fragment() {
        let plain = compute_cache_key("GET", &url("https://example.com/index.html"));
        let noisy = compute_cache_key("GET", &url("https://EXAMPLE.com/index.html#top"));
        assert_eq!(plain, noisy);
    }

    #[test]
    fn test_hash_keeps_query() {
        let a = compute_cache_key("GET", &url("https://example.com/?a=1"));
        let b = compute_cache_key("GET", &url("https://example.com/?a=2"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("GET", &url("https://example.com"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
