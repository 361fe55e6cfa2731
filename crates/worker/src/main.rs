//! offcache worker entry point.
//!
//! Reads worker events from stdin and writes replies and host commands to
//! stdout, one JSON object per line. Logging goes to stderr so stdout stays
//! a clean protocol stream.

use std::sync::Arc;

use anyhow::Result;
use offcache_client::{FetchConfig, HttpNetwork};
use offcache_core::CacheDb;
use offcache_core::config::AppConfig;
use offcache_worker::runtime::{self, OUTPUT_BUFFER};
use offcache_worker::{Runtime, StdioHost, Worker, WorkerSettings};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let settings = WorkerSettings::from_config(&config)?;
    tracing::info!(generation = %settings.generation, db = %config.db_path.display(), "starting offcache worker");

    let db = CacheDb::open(&config.db_path).await?;
    let network = HttpNetwork::new(FetchConfig {
        user_agent: config.user_agent.clone(),
        timeout: config.timeout(),
        ..FetchConfig::new(settings.origin.clone())
    })?;

    let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
    let writer = tokio::spawn(runtime::write_lines(rx, tokio::io::stdout()));

    let host = Arc::new(StdioHost::new(tx.clone()));
    let worker = Arc::new(Worker::new(settings, db.clone(), Arc::new(network), host.clone()));
    let runtime = Runtime::new(worker, host, tx);
    runtime.run(BufReader::new(tokio::io::stdin())).await?;

    drop(runtime);
    writer.await??;
    db.close().await?;
    Ok(())
}
