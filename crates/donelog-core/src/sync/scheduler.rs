//! Automatic sync
//!
//! Runs sync passes in a background task: once at startup, then on a
//! fixed interval (if one is configured) or whenever asked. Each pass
//! holds the store lock from snapshot to commit, so local edits made
//! through the same store cannot interleave with a pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

use super::orchestrator::{SyncOrchestrator, SyncStatus};
use super::remote::Connector;
use crate::store::Store;

/// Commands sent to the scheduler task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run a pass now
    SyncNow,
    /// Stop the task
    Shutdown,
}

/// Events emitted by the scheduler task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A pass finished and the store was updated
    Synced {
        active: usize,
        trash: usize,
        deduplicated: usize,
    },
    /// A pass failed; the store was left as it was
    Error(String),
}

/// Handle to control the scheduler task
pub struct SchedulerHandle {
    /// Send commands to the task
    pub command_tx: mpsc::Sender<SchedulerCommand>,
    /// Receive events from the task
    pub event_rx: mpsc::Receiver<SchedulerEvent>,
    /// Watch sync status
    pub status_rx: watch::Receiver<SyncStatus>,
    /// Completes when the task exits
    pub task: tokio::task::JoinHandle<()>,
}

/// Spawn the scheduler task
///
/// `interval` of `None` means one pass at startup and afterwards only on
/// [`SchedulerCommand::SyncNow`].
pub fn spawn_scheduler<C>(
    orchestrator: Arc<SyncOrchestrator<C>>,
    store: Arc<Mutex<Store>>,
    interval: Option<Duration>,
) -> SchedulerHandle
where
    C: Connector + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);
    let status_rx = orchestrator.subscribe();

    let task = tokio::spawn(scheduler_loop(
        orchestrator,
        store,
        interval,
        command_rx,
        event_tx,
    ));

    SchedulerHandle {
        command_tx,
        event_rx,
        status_rx,
        task,
    }
}

async fn scheduler_loop<C: Connector>(
    orchestrator: Arc<SyncOrchestrator<C>>,
    store: Arc<Mutex<Store>>,
    interval: Option<Duration>,
    mut command_rx: mpsc::Receiver<SchedulerCommand>,
    event_tx: mpsc::Sender<SchedulerEvent>,
) {
    run_pass(&orchestrator, &store, &event_tx).await;

    loop {
        let tick = async {
            match interval {
                Some(period) => tokio::time::sleep(period).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tick => {
                debug!("Scheduled sync pass");
                run_pass(&orchestrator, &store, &event_tx).await;
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(SchedulerCommand::SyncNow) => {
                        run_pass(&orchestrator, &store, &event_tx).await;
                    }
                    Some(SchedulerCommand::Shutdown) | None => {
                        orchestrator.cancel();
                        break;
                    }
                }
            }
        }
    }
}

async fn run_pass<C: Connector>(
    orchestrator: &SyncOrchestrator<C>,
    store: &Mutex<Store>,
    event_tx: &mpsc::Sender<SchedulerEvent>,
) {
    let mut store = store.lock().await;

    let event = match orchestrator.sync(store.active(), store.trash()).await {
        Ok(merged) => match store.apply_sync(&merged) {
            Ok(()) => SchedulerEvent::Synced {
                active: merged.active.len(),
                trash: merged.trash.len(),
                deduplicated: merged.deduplicated,
            },
            Err(e) => {
                warn!("Failed to save synced entries: {:#}", e);
                SchedulerEvent::Error(format!("{:#}", e))
            }
        },
        Err(e) => SchedulerEvent::Error(e.to_string()),
    };

    let _ = event_tx.send(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RemoteConfig};
    use crate::models::LogEntry;
    use crate::sync::remote::{MemoryConnector, MemoryStore};
    use tempfile::TempDir;

    fn setup(
        temp_dir: &TempDir,
        remote: MemoryStore,
    ) -> (Arc<SyncOrchestrator<MemoryConnector>>, Arc<Mutex<Store>>) {
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        let store = Store::open_with_config(config).unwrap();
        let orchestrator = SyncOrchestrator::new(
            MemoryConnector::new(remote),
            Some(RemoteConfig::new("mem://logs", "key")),
            Duration::from_secs(5),
        );
        (Arc::new(orchestrator), Arc::new(Mutex::new(store)))
    }

    #[tokio::test]
    async fn test_startup_pass_updates_store() {
        let temp_dir = TempDir::new().unwrap();
        let remote = MemoryStore::with_rows([LogEntry::new("from phone")]);
        let (orchestrator, store) = setup(&temp_dir, remote);

        let mut handle = spawn_scheduler(orchestrator, Arc::clone(&store), None);
        let event = handle.event_rx.recv().await.unwrap();
        assert_eq!(
            event,
            SchedulerEvent::Synced {
                active: 1,
                trash: 0,
                deduplicated: 0
            }
        );
        assert_eq!(store.lock().await.active()[0].content, "from phone");

        handle.command_tx.send(SchedulerCommand::Shutdown).await.unwrap();
        handle.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_now_pushes_new_entries() {
        let temp_dir = TempDir::new().unwrap();
        let remote = MemoryStore::new();
        let (orchestrator, store) = setup(&temp_dir, remote.clone());

        let mut handle = spawn_scheduler(orchestrator, Arc::clone(&store), None);
        handle.event_rx.recv().await.unwrap();

        store.lock().await.add("late entry").unwrap();
        handle.command_tx.send(SchedulerCommand::SyncNow).await.unwrap();
        handle.event_rx.recv().await.unwrap();

        assert_eq!(remote.rows().len(), 1);
        assert_eq!(remote.rows()[0].content, "late entry");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_passes() {
        let temp_dir = TempDir::new().unwrap();
        let remote = MemoryStore::new();
        let (orchestrator, store) = setup(&temp_dir, remote.clone());

        let mut handle = spawn_scheduler(orchestrator, store, Some(Duration::from_secs(60)));
        handle.event_rx.recv().await.unwrap();
        handle.event_rx.recv().await.unwrap();
        handle.event_rx.recv().await.unwrap();

        assert_eq!(remote.upsert_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_pass_keeps_store() {
        let temp_dir = TempDir::new().unwrap();
        let remote = MemoryStore::new();
        remote.fail_fetch(Some("503 Service Unavailable"));
        let (orchestrator, store) = setup(&temp_dir, remote);
        store.lock().await.add("keep me").unwrap();

        let mut handle = spawn_scheduler(orchestrator, Arc::clone(&store), None);
        match handle.event_rx.recv().await.unwrap() {
            SchedulerEvent::Error(message) => assert!(message.contains("503")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(*handle.status_rx.borrow(), SyncStatus::Failed);
        assert_eq!(store.lock().await.active()[0].content, "keep me");
    }
}
