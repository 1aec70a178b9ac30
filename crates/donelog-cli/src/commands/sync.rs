//! Sync command handlers

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::Mutex;

use donelog_core::sync::{
    spawn_scheduler, test_connection as check_remote, RestConnector, SchedulerCommand,
    SchedulerEvent,
};
use donelog_core::{Config, RemoteConfig, Store, SyncError, SyncOrchestrator};

use crate::output::{Output, OutputFormat};

/// Remote settings, or a hint on how to set them
fn require_remote(config: &Config) -> Result<RemoteConfig> {
    match config.remote() {
        Some(remote) => Ok(remote),
        None => bail!(
            "Sync is not configured. Set it with:\n  \
             donelog config set endpoint https://your-project.supabase.co\n  \
             donelog config set credential <api-key>"
        ),
    }
}

fn orchestrator_for(config: &Config) -> SyncOrchestrator<RestConnector> {
    SyncOrchestrator::new(RestConnector, config.remote(), config.sync_timeout())
}

/// Run one sync pass, cancelled by Ctrl-C
pub async fn sync(store: &mut Store, output: &Output) -> Result<()> {
    let remote = require_remote(store.config())?;
    let orchestrator = orchestrator_for(store.config());

    output.message(&format!("Syncing with {}...", remote.endpoint));

    let result = tokio::select! {
        result = orchestrator.sync(store.active(), store.trash()) => result,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.cancel();
            Err(SyncError::Cancelled)
        }
    };

    match result {
        Ok(merged) => {
            store.apply_sync(&merged)?;
            match output.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "status": "success",
                        "active": merged.active.len(),
                        "trash": merged.trash.len(),
                        "deduplicated": merged.deduplicated
                    })
                ),
                _ => {
                    output.success("Sync complete");
                    output.message(&format!(
                        "  Active: {}, Trash: {}",
                        merged.active.len(),
                        merged.trash.len()
                    ));
                    if merged.deduplicated > 0 {
                        output.message(&format!(
                            "  Merged {} duplicate entries",
                            merged.deduplicated
                        ));
                    }
                }
            }
            Ok(())
        }
        Err(SyncError::Cancelled) => {
            output.message("Sync cancelled, nothing changed.");
            Ok(())
        }
        Err(e) => bail!("Sync failed: {}", e),
    }
}

/// Sync quietly (for auto-sync) - no output on success
pub async fn sync_quiet(store: &mut Store) -> Result<()> {
    let orchestrator = orchestrator_for(store.config());
    let merged = orchestrator.sync(store.active(), store.trash()).await?;
    store.apply_sync(&merged)
}

/// Check endpoint and credential without syncing
pub async fn test_connection(config: &Config, output: &Output) -> Result<()> {
    let remote = require_remote(config)?;

    output.message(&format!("Testing connection to {}...", remote.endpoint));
    if check_remote(&RestConnector, &remote, config.sync_timeout()).await {
        output.success("Connection ok");
        Ok(())
    } else {
        bail!(
            "Could not connect to {}. Check the endpoint, the credential and that the `logs` table exists.",
            remote.endpoint
        )
    }
}

/// Keep syncing in the foreground until Ctrl-C
pub async fn watch(store: Store, output: &Output) -> Result<()> {
    require_remote(store.config())?;
    let interval = store.config().sync_interval();
    let orchestrator = Arc::new(orchestrator_for(store.config()));

    match interval {
        Some(period) => output.message(&format!(
            "Syncing every {} minute(s). Press Ctrl-C to stop.",
            period.as_secs() / 60
        )),
        None => output.message(
            "No sync interval configured; syncing once. Press Ctrl-C to stop.",
        ),
    }

    let store = Arc::new(Mutex::new(store));
    let mut handle = spawn_scheduler(Arc::clone(&orchestrator), store, interval);

    loop {
        tokio::select! {
            event = handle.event_rx.recv() => match event {
                Some(SchedulerEvent::Synced { active, trash, deduplicated }) => {
                    let now = chrono::Local::now().format("%H:%M:%S");
                    match output.format {
                        OutputFormat::Json => println!(
                            "{}",
                            serde_json::json!({
                                "event": "synced",
                                "active": active,
                                "trash": trash,
                                "deduplicated": deduplicated
                            })
                        ),
                        _ => output.message(&format!(
                            "[{}] Synced: {} active, {} in trash",
                            now, active, trash
                        )),
                    }
                }
                Some(SchedulerEvent::Error(message)) => {
                    if !output.is_quiet() {
                        eprintln!("⚠ Sync failed: {}", message);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                orchestrator.cancel();
                let _ = handle.command_tx.send(SchedulerCommand::Shutdown).await;
                break;
            }
        }
    }

    handle.task.await?;
    Ok(())
}
