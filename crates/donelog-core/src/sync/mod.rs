//! Cloud sync for the log
//!
//! Reconciles the local active list and trash with one remote table.
//!
//! ## Pass
//!
//! 1. Probe the remote (bounded by the configured timeout)
//! 2. Read every remote row
//! 3. Merge: last write wins per id, then duplicates by content and
//!    timestamp are collapsed into one survivor
//! 4. Upload the full merged set
//! 5. Hand the merged active list and trash back to the caller
//!
//! Nothing local changes unless the whole pass succeeds.
//!
//! ## Usage
//!
//! ```ignore
//! let orchestrator = SyncOrchestrator::new(RestConnector, config.remote(), config.sync_timeout());
//! let merged = orchestrator.sync(store.active(), store.trash()).await?;
//! store.apply_sync(&merged)?;
//! ```

mod error;
mod merge;
mod orchestrator;
mod remote;
mod scheduler;
mod validator;

pub use error::{SyncError, SyncResult};
pub use merge::{merge, MergedState};
pub use orchestrator::{SyncOrchestrator, SyncStatus};
pub use remote::{
    Connector, MemoryConnector, MemoryStore, RemoteStore, RestConnector, RestStore, LOGS_TABLE,
};
pub use scheduler::{spawn_scheduler, SchedulerCommand, SchedulerEvent, SchedulerHandle};
pub use validator::{check_connection, test_connection};
