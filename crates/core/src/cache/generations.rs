//! Generation registry: open, enumerate, delete and clean up versioned stores.

use std::fmt;

use super::connection::CacheDb;
use super::store::Store;
use crate::Error;
use tokio_rusqlite::params;

/// Identifier of a cache generation, `"{prefix}-{version}"`.
///
/// The prefix names this system's generations so cleanup never touches
/// stores that belong to something else sharing the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationId {
    prefix: String,
    id: String,
}

impl GenerationId {
    pub fn new(prefix: &str, version: &str) -> Self {
        Self { prefix: prefix.to_string(), id: format!("{prefix}-{version}") }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `other` is a generation of this system (current or stale).
    pub fn shares_prefix(&self, other: &str) -> bool {
        other
            .strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl CacheDb {
    /// Return the store for a generation, creating it if absent.
    ///
    /// Idempotent: opening an existing generation leaves its entries intact.
    pub async fn open_generation(&self, id: &str) -> Result<Store, Error> {
        let owned = id.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO generations (id, created_at) VALUES (?1, ?2)",
                    params![owned, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(self.store(id))
    }

    /// A handle on a generation without creating it.
    ///
    /// Lookups against a missing generation simply miss.
    pub fn store(&self, id: &str) -> Store {
        Store::new(self.clone(), id)
    }

    /// Enumerate every persisted generation id, sorted.
    pub async fn list_generations(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT id FROM generations ORDER BY id")?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ids)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn has_generation(&self, id: &str) -> Result<bool, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM generations WHERE id = ?1)",
                    params![id],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and all of its entries.
    ///
    /// Returns whether the generation existed.
    pub async fn delete_generation(&self, id: &str) -> Result<bool, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM generations WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every generation sharing `current`'s prefix except `current`.
    ///
    /// Returns the deleted ids. Generations under other prefixes are left alone.
    pub async fn cleanup_generations(&self, current: &GenerationId) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for id in self.list_generations().await? {
            if id == current.as_str() || !current.shares_prefix(&id) {
                continue;
            }
            if self.delete_generation(&id).await? {
                tracing::info!(generation = %id, "deleted stale cache generation");
                deleted.push(id);
            }
        }
        Ok(deleted)
    }
}
