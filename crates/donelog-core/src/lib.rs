//! Donelog Core Library
//!
//! This crate provides the core functionality for donelog, a small
//! append-mostly log of things done, kept locally as JSON and optionally
//! synced with a hosted table.
//!
//! # Architecture
//!
//! - **Local files**: `entries.json` and `trash.json` are the source of truth
//!   on each device
//! - **Remote table**: one `logs` table shared by every device, reconciled
//!   by a last-write-wins merge
//!
//! # Quick Start
//!
//! ```text
//! let mut store = Store::open()?;
//! store.add("Shipped the release")?;
//!
//! let orchestrator = SyncOrchestrator::new(RestConnector, store.config().remote(), timeout);
//! let merged = orchestrator.sync(store.active(), store.trash()).await?;
//! store.apply_sync(&merged)?;
//! ```
//!
//! # Modules
//!
//! - `store`: Local entry and trash storage (main entry point)
//! - `models`: Log entry and its dedup signature
//! - `storage`: JSON file persistence
//! - `sync`: Connection check, merge and sync orchestration
//! - `config`: Application configuration

pub mod config;
pub mod models;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::{Config, RemoteConfig};
pub use models::{LogEntry, Signature};
pub use storage::{EntryFile, StorageError};
pub use store::Store;
pub use sync::{MergedState, RestConnector, SyncError, SyncOrchestrator, SyncStatus};
