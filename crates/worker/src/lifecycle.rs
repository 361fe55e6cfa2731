//! The worker and its install → activate → claim lifecycle.
//!
//! Transitions are serialized by an async mutex so install always finishes
//! before activate can run, and cleanup always finishes before the host is
//! asked to claim instances. State is published on a watch channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use offcache_client::Network;
use offcache_core::{CacheDb, Error, Request};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};

use crate::host::Host;
use crate::interceptor::{FetchOutcome, Interceptor, SkipReason};
use crate::seed::{SeedLoader, SeedReport};
use crate::settings::WorkerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    Waiting,
    Activating,
    Active,
    /// A newer worker took over; terminal.
    Superseded,
}

/// Environment-level failure signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSignal {
    Error,
    UnhandledRejection,
}

pub struct Worker {
    pub(crate) settings: WorkerSettings,
    pub(crate) db: CacheDb,
    pub(crate) host: Arc<dyn Host>,
    network: Arc<dyn Network>,
    interceptor: Interceptor,
    state: watch::Sender<WorkerState>,
    skip_waiting: AtomicBool,
    /// Last host report said no instances are open.
    released: AtomicBool,
    transition: Mutex<()>,
}

impl Worker {
    pub fn new(settings: WorkerSettings, db: CacheDb, network: Arc<dyn Network>, host: Arc<dyn Host>) -> Self {
        let interceptor = Interceptor::new(db.clone(), &settings, network.clone());
        let (state, _) = watch::channel(WorkerState::Installing);
        Self {
            settings,
            db,
            host,
            network,
            interceptor,
            state,
            skip_waiting: AtomicBool::new(false),
            released: AtomicBool::new(false),
            transition: Mutex::new(()),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn version(&self) -> &str {
        self.settings.generation.as_str()
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    fn set_state(&self, next: WorkerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(from = ?previous, to = ?next, generation = self.version(), "worker state changed");
        }
    }

    /// Seed the current generation, then wait (or activate if asked to skip waiting).
    ///
    /// Seeding failures never fail install; only storage errors opening the
    /// generation do.
    pub async fn install(&self) -> Result<SeedReport, Error> {
        let report = {
            let _guard = self.transition.lock().await;
            if self.state() != WorkerState::Installing {
                return Err(Error::InvalidState(format!("cannot install while {:?}", self.state())));
            }

            let store = self.db.open_generation(self.version()).await?;
            let report = SeedLoader::new(self.network.clone())
                .seed(&self.settings.manifest, &store)
                .await;
            self.set_state(WorkerState::Waiting);
            report
        };

        if self.skip_waiting.load(Ordering::SeqCst) || self.released.load(Ordering::SeqCst) {
            self.activate().await?;
        }
        Ok(report)
    }

    /// Drop stale generations, then take control of open instances.
    ///
    /// Returns the deleted generation ids. Activating an already active
    /// worker is a no-op.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        let _guard = self.transition.lock().await;
        match self.state() {
            WorkerState::Waiting => {}
            WorkerState::Active => return Ok(Vec::new()),
            other => return Err(Error::InvalidState(format!("cannot activate while {other:?}"))),
        }

        self.set_state(WorkerState::Activating);
        let deleted = match self.db.cleanup_generations(&self.settings.generation).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.set_state(WorkerState::Waiting);
                return Err(e);
            }
        };

        if let Err(e) = self.host.claim().await {
            tracing::warn!(error = %e, "failed to claim clients");
        }
        self.set_state(WorkerState::Active);
        Ok(deleted)
    }

    /// Activate as soon as possible instead of waiting for instances to close.
    pub async fn skip_waiting(&self) -> Result<(), Error> {
        self.skip_waiting.store(true, Ordering::SeqCst);
        if self.state() == WorkerState::Waiting {
            self.activate().await?;
        }
        Ok(())
    }

    /// Every controlled instance has closed; a waiting worker may activate.
    ///
    /// Remembered while installing, so install activates once it finishes.
    pub async fn clients_released(&self) -> Result<(), Error> {
        self.released.store(true, Ordering::SeqCst);
        if self.state() == WorkerState::Waiting {
            self.activate().await?;
        }
        Ok(())
    }

    /// The host reported open instances again; keep waiting.
    pub fn clients_attached(&self) {
        self.released.store(false, Ordering::SeqCst);
    }

    pub fn supersede(&self) {
        self.set_state(WorkerState::Superseded);
    }

    /// Route a fetch. Only an active worker intercepts.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if self.state() != WorkerState::Active {
            return FetchOutcome::Bypass(SkipReason::Inactive);
        }
        self.interceptor.handle(request).await
    }

    /// Log an environment-level failure. Never propagates.
    pub fn report_error(&self, signal: ErrorSignal, detail: &str) {
        match signal {
            ErrorSignal::Error => tracing::error!(state = ?self.state(), "worker error: {detail}"),
            ErrorSignal::UnhandledRejection => {
                tracing::error!(state = ?self.state(), "unhandled rejection: {detail}")
            }
        }
    }

    /// Wait for detached cache writes before shutdown.
    pub async fn drain(&self) {
        self.interceptor.drain_writes().await;
    }
}
