//! Schema versioning for the cache database.
//!
//! The applied version lives in SQLite's `user_version` pragma. Each step
//! runs in its own transaction together with the version bump, so a failed
//! step leaves the schema at the previous version.

use super::Error;
use tokio_rusqlite::Connection;

/// Ordered schema steps; step `n` (1-based) brings the schema to version `n`.
const STEPS: &[&str] = &[
    include_str!("../../migrations/001_generations.sql"),
    include_str!("../../migrations/002_entries.sql"),
];

/// Schema version this build reads and writes.
pub const SCHEMA_VERSION: i64 = STEPS.len() as i64;

/// Bring the schema up to `SCHEMA_VERSION`.
///
/// Fails if the file was written by a newer build.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if current > SCHEMA_VERSION {
            return Err(Error::MigrationFailed(format!(
                "database schema v{current} is newer than supported v{SCHEMA_VERSION}"
            )));
        }

        for (version, sql) in (1..).zip(STEPS.iter()).skip(current as usize) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("step {version}: {e}")))?;
            tx.pragma_update(None, "user_version", version)?;
            tx.commit()?;
            tracing::debug!(version, "applied cache schema step");
        }
        Ok(())
    })
    .await
    .map_err(Error::from)
}
