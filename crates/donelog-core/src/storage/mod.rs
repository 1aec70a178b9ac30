//! Storage layer
//!
//! Local persistence for the active log and the trash.
//!
//! Both lists are stored as JSON arrays under the data directory and
//! written atomically (temp file, fsync, rename).

pub mod error;
pub mod persistence;

pub use error::{StorageError, StorageResult};
pub use persistence::{EntryFile, StagedWrite};
