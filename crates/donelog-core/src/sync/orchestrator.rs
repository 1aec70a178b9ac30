//! Sync orchestration
//!
//! Drives one pass: validate the connection, fetch the remote table, merge,
//! upsert the reconciled set, and hand the result back. A pass either
//! completes fully or leaves the caller's entries untouched.
//!
//! ## Status
//!
//! ```text
//!   Idle ──sync──▶ Syncing ──ok──▶ Idle
//!    ▲                │
//!    │                └──err──▶ Failed ──sync──▶ Syncing
//!    └──reconfigure─────────────────┘
//! ```
//!
//! The move into `Syncing` is a single atomic check-and-set on the status
//! channel, so a second pass started while one is in flight is rejected
//! with [`SyncError::AlreadySyncing`].

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use super::merge::{merge, MergedState};
use super::remote::{Connector, RemoteStore};
use super::validator::check_connection;
use crate::config::RemoteConfig;
use crate::models::LogEntry;

/// Sync status as seen by the rest of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No pass running, last pass (if any) succeeded
    Idle,
    /// A pass is in flight
    Syncing,
    /// Last pass failed; stays set until a pass succeeds or config changes
    Failed,
}

impl SyncStatus {
    pub fn can_start(&self) -> bool {
        !matches!(self, SyncStatus::Syncing)
    }
}

/// Remote handle cached per (endpoint, credential)
struct CachedClient<S> {
    key: RemoteConfig,
    store: Arc<S>,
}

/// Runs sync passes against one remote configuration at a time
pub struct SyncOrchestrator<C: Connector> {
    connector: C,
    remote: Mutex<Option<RemoteConfig>>,
    client: Mutex<Option<CachedClient<C::Store>>>,
    status: watch::Sender<SyncStatus>,
    last_error: Mutex<Option<String>>,
    /// Bumped on every cancel; passes watch it for changes
    cancel: watch::Sender<u64>,
    timeout: Duration,
}

impl<C: Connector> SyncOrchestrator<C> {
    /// Create an orchestrator; `remote` may be `None` until configured
    pub fn new(connector: C, remote: Option<RemoteConfig>, timeout: Duration) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        let (cancel, _) = watch::channel(0);
        Self {
            connector,
            remote: Mutex::new(remote),
            client: Mutex::new(None),
            status,
            last_error: Mutex::new(None),
            cancel,
            timeout,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Get the current status
    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Diagnostic of the last failed pass, cleared on success
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    pub fn remote(&self) -> Option<RemoteConfig> {
        lock(&self.remote).clone()
    }

    /// Replace the remote configuration
    ///
    /// Cancels any in-flight pass, drops the cached client if the key
    /// changed and clears the failure indicator.
    pub fn reconfigure(&self, remote: Option<RemoteConfig>) {
        info!(
            "Sync reconfigured: {}",
            remote.as_ref().map(|r| r.endpoint.as_str()).unwrap_or("(none)")
        );
        self.cancel();
        {
            let mut client = lock(&self.client);
            if client
                .as_ref()
                .is_some_and(|cached| Some(&cached.key) != remote.as_ref())
            {
                *client = None;
            }
        }
        *lock(&self.remote) = remote;
        *lock(&self.last_error) = None;
        self.status.send_if_modified(|status| {
            if *status == SyncStatus::Failed {
                *status = SyncStatus::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Abandon the in-flight pass, if any
    pub fn cancel(&self) {
        self.cancel.send_modify(|generation| *generation += 1);
    }

    /// Run one pass over the given local snapshot
    ///
    /// On success the returned state should replace the caller's active
    /// list and trash. On failure the caller keeps what it had.
    pub async fn sync(
        &self,
        local_active: &[LogEntry],
        local_trash: &[LogEntry],
    ) -> SyncResult<MergedState> {
        let guard = PassGuard::begin(&self.status)?;
        let mut cancelled = self.cancel.subscribe();

        info!(
            "Starting sync pass ({} active, {} in trash)",
            local_active.len(),
            local_trash.len()
        );
        let result = self.run_pass(local_active, local_trash, &mut cancelled).await;

        match &result {
            Ok(merged) => {
                info!(
                    "Sync complete: {} active, {} in trash, {} duplicates removed",
                    merged.active.len(),
                    merged.trash.len(),
                    merged.deduplicated
                );
                *lock(&self.last_error) = None;
                guard.finish(SyncStatus::Idle);
            }
            Err(SyncError::Cancelled) => {
                info!("Sync pass cancelled");
                guard.finish(SyncStatus::Idle);
            }
            Err(e) => {
                warn!("Sync failed: {}", e);
                *lock(&self.last_error) = Some(e.to_string());
                guard.finish(SyncStatus::Failed);
            }
        }

        result
    }

    async fn run_pass(
        &self,
        local_active: &[LogEntry],
        local_trash: &[LogEntry],
        cancelled: &mut watch::Receiver<u64>,
    ) -> SyncResult<MergedState> {
        let remote = self.remote().ok_or(SyncError::NotConfigured)?;
        let store = self.client_for(&remote)?;

        self.bounded(cancelled, check_connection(&*store, self.timeout))
            .await?;

        let remote_rows = self.bounded(cancelled, store.fetch_all()).await?;
        debug!("Fetched {} remote entries", remote_rows.len());

        let merged = merge(local_active, local_trash, &remote_rows, Utc::now())?;

        let rows: Vec<LogEntry> = merged.all().cloned().collect();
        self.bounded(cancelled, store.upsert_many(&rows)).await?;

        Ok(merged)
    }

    /// Cached handle for `remote`, rebuilt only when the key changes
    fn client_for(&self, remote: &RemoteConfig) -> SyncResult<Arc<C::Store>> {
        let mut client = lock(&self.client);
        if let Some(cached) = client.as_ref().filter(|c| &c.key == remote) {
            return Ok(Arc::clone(&cached.store));
        }

        debug!("Creating remote client for {}", remote.endpoint);
        let store = Arc::new(self.connector.connect(remote, self.timeout)?);
        *client = Some(CachedClient {
            key: remote.clone(),
            store: Arc::clone(&store),
        });
        Ok(store)
    }

    /// Run a remote call under the timeout, abandoning it on cancellation
    async fn bounded<T>(
        &self,
        cancelled: &mut watch::Receiver<u64>,
        call: impl Future<Output = SyncResult<T>>,
    ) -> SyncResult<T> {
        tokio::select! {
            _ = cancelled.changed() => Err(SyncError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => {
                result.unwrap_or(Err(SyncError::Timeout))
            }
        }
    }
}

/// Holds the `Syncing` status for the lifetime of one pass
///
/// If the pass future is dropped before finishing, the status falls back
/// to `Idle` so later passes are not locked out.
struct PassGuard<'a> {
    status: &'a watch::Sender<SyncStatus>,
    finished: bool,
}

impl<'a> PassGuard<'a> {
    fn begin(status: &'a watch::Sender<SyncStatus>) -> SyncResult<Self> {
        let started = status.send_if_modified(|current| {
            if current.can_start() {
                *current = SyncStatus::Syncing;
                true
            } else {
                false
            }
        });

        if !started {
            return Err(SyncError::AlreadySyncing);
        }
        Ok(Self {
            status,
            finished: false,
        })
    }

    fn finish(mut self, status: SyncStatus) {
        self.status.send_replace(status);
        self.finished = true;
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.status.send_replace(SyncStatus::Idle);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
