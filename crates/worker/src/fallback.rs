//! Responses for requests the network could not answer at all.

use offcache_core::{CacheDb, GenerationId, Request, Response, ResponseKind};
use url::Url;

pub const UNAVAILABLE_STATUS: u16 = 408;
pub const UNAVAILABLE_STATUS_TEXT: &str = "Offline - resource not available";

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{{title}} - Offline</title>
<style>
body{margin:0;min-height:100vh;display:flex;align-items:center;justify-content:center;font-family:system-ui,sans-serif;background:#f4f4f5;color:#18181b;text-align:center}
main{padding:2rem;max-width:28rem}
button{margin-top:1.5rem;padding:.75rem 1.5rem;border:0;border-radius:.5rem;background:#18181b;color:#fff;font-size:1rem;cursor:pointer}
</style>
</head>
<body>
<main>
<h1>You're offline</h1>
<p>{{title}} can't reach the network right now. Check your connection and try again.</p>
<button type="button" onclick="location.reload()">Retry</button>
</main>
</body>
</html>
"#;

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Self-contained offline document with a retry button.
pub fn offline_page(app_name: &str) -> Response {
    let body = OFFLINE_PAGE.replace("{{title}}", &escape_html(app_name));
    Response::new(200, "OK", body).with_header("Content-Type", "text/html")
}

/// Empty failure for non-document resources. Never cached content.
pub fn unavailable() -> Response {
    Response::new(UNAVAILABLE_STATUS, UNAVAILABLE_STATUS_TEXT, "").with_kind(ResponseKind::Error)
}

/// Picks the response for a request whose network attempt failed.
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    db: CacheDb,
    generation: GenerationId,
    shell_urls: Vec<Url>,
    app_name: String,
}

impl FallbackResolver {
    pub fn new(db: CacheDb, generation: GenerationId, shell_urls: Vec<Url>, app_name: String) -> Self {
        Self { db, generation, shell_urls, app_name }
    }

    /// Cached shell or synthesized page for documents; 408 for everything else.
    pub async fn resolve(&self, request: &Request) -> Response {
        if !request.is_navigation() {
            tracing::debug!("offline: {} unavailable", request.url);
            return unavailable();
        }

        if let Some(shell) = self.cached_shell().await {
            tracing::debug!("offline: serving cached shell for {}", request.url);
            return shell;
        }

        tracing::debug!("offline: no cached shell, serving offline page for {}", request.url);
        offline_page(&self.app_name)
    }

    async fn cached_shell(&self) -> Option<Response> {
        let store = self.db.store(self.generation.as_str());
        for url in &self.shell_urls {
            match store.match_request(&Request::get(url.clone())).await {
                Ok(Some(response)) => return Some(response),
                Ok(None) => {}
                Err(e) => tracing::warn!(url = %url, error = %e, "shell lookup failed"),
            }
        }
        None
    }
}
