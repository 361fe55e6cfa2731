//! Entry operations on a single cache generation.
//!
//! A `Store` is a cheap handle (database + generation id). Writes are
//! upserts keyed by request identity, so a repeated write of the same
//! request simply replaces the previous entry.

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use crate::Error;
use crate::http::{Request, Response, ResponseKind};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

/// Handle on the entries of one generation.
#[derive(Clone, Debug)]
pub struct Store {
    db: CacheDb,
    generation: String,
}

/// Row shape shared by single and batched writes.
struct EntryRow {
    key: String,
    method: String,
    url: String,
    status: i64,
    status_text: String,
    kind: &'static str,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn from_pair(request: &Request, response: &Response) -> Result<Self, Error> {
        let mut url = request.url.clone();
        url.set_fragment(None);
        Ok(Self {
            key: compute_cache_key(&request.method, &request.url),
            method: request.method.to_ascii_uppercase(),
            url: url.to_string(),
            status: i64::from(response.status),
            status_text: response.status_text.clone(),
            kind: response.kind.as_str(),
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.to_vec(),
        })
    }
}

fn insert_entry(conn: &rusqlite::Connection, generation: &str, row: &EntryRow, now: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO generations (id, created_at) VALUES (?1, ?2)",
        params![generation, now],
    )?;
    conn.execute(
        "INSERT INTO entries (
            generation_id, key, method, url, status, status_text, kind, headers_json, body, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(generation_id, key) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            status_text = excluded.status_text,
            kind = excluded.kind,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            generation,
            &row.key,
            &row.method,
            &row.url,
            row.status,
            &row.status_text,
            row.kind,
            &row.headers_json,
            &row.body,
            now,
        ],
    )?;
    Ok(())
}

impl Store {
    pub(crate) fn new(db: CacheDb, generation: &str) -> Self {
        Self { db, generation: generation.to_string() }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Look up the stored response for a request identity.
    ///
    /// Returns None if nothing is stored or the generation no longer exists.
    pub async fn match_request(&self, request: &Request) -> Result<Option<Response>, Error> {
        let key = compute_cache_key(&request.method, &request.url);
        let generation = self.generation.clone();
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<(String, i64, String, String, String, Vec<u8>)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, status, status_text, kind, headers_json, body
                     FROM entries WHERE generation_id = ?1 AND key = ?2",
                )?;
                let result = stmt.query_row(params![generation, key], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
                });

                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((url, status, status_text, kind, headers_json, body)) = row else {
            return Ok(None);
        };

        let status = u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("status {status}")))?;
        let kind = ResponseKind::from_name(&kind).ok_or_else(|| Error::CorruptEntry(format!("kind {kind}")))?;
        let url = Url::parse(&url).map_err(|e| Error::CorruptEntry(e.to_string()))?;

        Ok(Some(Response {
            url: Some(url),
            status,
            status_text,
            headers: serde_json::from_str(&headers_json)?,
            body: body.into(),
            kind,
        }))
    }

    /// Store a response for a request identity, replacing any previous entry.
    ///
    /// Recreates the generation if it was deleted in the meantime.
    pub async fn put(&self, request: &Request, response: &Response) -> Result<(), Error> {
        let row = EntryRow::from_pair(request, response)?;
        let generation = self.generation.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> { insert_entry(conn, &generation, &row, &now) })
            .await
            .map_err(Error::from)
    }

    /// Store every pair in one transaction: either all are written or none.
    pub async fn put_all(&self, pairs: &[(Request, Response)]) -> Result<(), Error> {
        let rows = pairs
            .iter()
            .map(|(req, res)| EntryRow::from_pair(req, res))
            .collect::<Result<Vec<_>, _>>()?;
        let generation = self.generation.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for row in &rows {
                    insert_entry(&tx, &generation, row, &now)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// URLs of every stored entry, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let generation = self.generation.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE generation_id = ?1 ORDER BY url")?;
                let urls = stmt
                    .query_map(params![generation], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn len(&self) -> Result<usize, Error> {
        let generation = self.generation.clone();
        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE generation_id = ?1",
                    params![generation],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Destination;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_generation("app-v1").await.unwrap();
        let request = Request::get(url("https://app.test/index.html"));
        let response = Response::new(200, "OK", "<html></html>")
            .with_header("Content-Type", "text/html")
            .with_header("ETag", "\"abc\"");

        store.put(&request, &response).await.unwrap();

        let cached = store.match_request(&request).await.unwrap().unwrap();
        assert_eq!(cached.status, 200);
        assert_eq!(cached.status_text, "OK");
        assert_eq!(cached.headers, response.headers);
        assert_eq!(cached.body, response.body);
        assert_eq!(cached.kind, ResponseKind::Basic);
        assert_eq!(cached.url, Some(url("https://app.test/index.html")));
    }

    #[tokio::test]
    async fn test_match_ignores_destination_and_fragment() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_generation("app-v1").await.unwrap();
        store
            .put(&Request::get(url("https://app.test/logo.png")), &Response::new(200, "OK", "png"))
            .await
            .unwrap();

        let lookup = Request::get(url("https://app.test/logo.png#hero")).with_destination(Destination::Image);
        assert!(store.match_request(&lookup).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_generation("app-v1").await.unwrap();
        let request = Request::get(url("https://app.test/app.js"));

        store.put(&request, &Response::new(200, "OK", "one")).await.unwrap();
        store.put(&request, &Response::new(200, "OK", "two")).await.unwrap();

        let cached = store.match_request(&request).await.unwrap().unwrap();
        assert_eq!(&cached.body[..], b"two");
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v1 = db.open_generation("app-v1").await.unwrap();
        let v2 = db.open_generation("app-v2").await.unwrap();
        let request = Request::get(url("https://app.test/"));

        v1.put(&request, &Response::new(200, "OK", "old")).await.unwrap();

        assert!(v2.match_request(&request).await.unwrap().is_none());
        assert!(v2.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_put_recreates_deleted_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_generation("app-v1").await.unwrap();
        db.delete_generation("app-v1").await.unwrap();

        store
            .put(&Request::get(url("https://app.test/")), &Response::new(200, "OK", "x"))
            .await
            .unwrap();

        assert!(db.has_generation("app-v1").await.unwrap());
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_all_and_keys() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.open_generation("app-v1").await.unwrap();
        let pairs = vec![
            (Request::get(url("https://app.test/index.html")), Response::new(200, "OK", "index")),
            (Request::get(url("https://app.test/")), Response::new(200, "OK", "root")),
        ];

        store.put_all(&pairs).await.unwrap();

        assert_eq!(
            store.keys().await.unwrap(),
            vec!["https://app.test/".to_string(), "https://app.test/index.html".to_string()]
        );
    }

    #[tokio::test]
    async fn test_match_on_missing_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = db.store("never-opened");
        let result = store.match_request(&Request::get(url("https://app.test/"))).await.unwrap();
        assert!(result.is_none());
    }
}
