//! Local entry store
//!
//! The `Store` owns the device's working state: the active log and the
//! trash. The two lists are disjoint by id and partitioned purely by
//! `is_deleted`. Every mutation is written straight to disk.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::open()?;
//! let entry = store.add("Reviewed the storage PR")?;
//! store.delete(&entry.id)?;   // moves to trash
//! store.restore(&entry.id)?;  // back to active
//! ```

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::LogEntry;
use crate::storage::{EntryFile, StorageError};
use crate::sync::MergedState;

/// Local storage for active entries and trash
pub struct Store {
    active: Vec<LogEntry>,
    trash: Vec<LogEntry>,
    entries_file: EntryFile,
    trash_file: EntryFile,
    config: Config,
}

impl Store {
    /// Open the store using the default configuration
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the store with a specific configuration
    ///
    /// Entries missing `modified_at` get their business time, and each
    /// list's deletion flag is forced to match the file it came from. An id
    /// found in both files (left by an interrupted write) keeps only the
    /// most recently modified copy.
    pub fn open_with_config(config: Config) -> Result<Self> {
        let entries_file = EntryFile::new(config.entries_path());
        let trash_file = EntryFile::new(config.trash_path());

        let active: Vec<LogEntry> = entries_file
            .load()
            .context("Failed to load entries")?
            .into_iter()
            .map(|e| LogEntry {
                is_deleted: false,
                ..e.normalized()
            })
            .collect();
        let trash: Vec<LogEntry> = trash_file
            .load()
            .context("Failed to load trash")?
            .into_iter()
            .map(|e| LogEntry {
                is_deleted: true,
                ..e.normalized()
            })
            .collect();

        let (active, trash) = resolve_overlap(active, trash);

        Ok(Self {
            active,
            trash,
            entries_file,
            trash_file,
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Active entries, in stored order
    pub fn active(&self) -> &[LogEntry] {
        &self.active
    }

    /// Trashed entries, most recently deleted first
    pub fn trash(&self) -> &[LogEntry] {
        &self.trash
    }

    /// Active entries ordered by business time
    pub fn active_sorted(&self) -> Vec<LogEntry> {
        let mut entries = self.active.clone();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        entries
    }

    // ==================== Entry Operations ====================

    /// Add a new entry stamped with the current time
    pub fn add(&mut self, content: impl Into<String>) -> Result<LogEntry> {
        let entry = LogEntry::new(content);
        self.active.push(entry.clone());
        self.save_active()?;
        Ok(entry)
    }

    /// Edit content (and optionally business time) of an active entry
    pub fn edit(
        &mut self,
        id: &str,
        content: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<LogEntry> {
        let idx = find_index(&self.active, id)?;
        self.active[idx].edit(content, timestamp);
        let entry = self.active[idx].clone();
        self.save_active()?;
        Ok(entry)
    }

    /// Soft-delete an active entry, moving it to the front of the trash
    pub fn delete(&mut self, id: &str) -> Result<LogEntry> {
        let idx = find_index(&self.active, id)?;
        let mut active = self.active.clone();
        let mut trash = self.trash.clone();

        let mut entry = active.remove(idx);
        entry.soft_delete();
        trash.insert(0, entry.clone());

        self.commit(active, trash)?;
        Ok(entry)
    }

    /// Bring an entry back from the trash
    pub fn restore(&mut self, id: &str) -> Result<LogEntry> {
        let idx = find_index(&self.trash, id)?;
        let mut active = self.active.clone();
        let mut trash = self.trash.clone();

        let mut entry = trash.remove(idx);
        entry.restore();
        active.push(entry.clone());

        self.commit(active, trash)?;
        Ok(entry)
    }

    /// Drop all trashed entries locally
    ///
    /// The remote table keeps its soft-deleted rows, so the next sync
    /// brings them back into the trash.
    pub fn empty_trash(&mut self) -> Result<usize> {
        let count = self.trash.len();
        self.trash.clear();
        self.save_trash()?;
        Ok(count)
    }

    /// Import entries from an export, skipping ids already known locally
    ///
    /// Imported entries are active; a missing `modified_at` is set to now.
    pub fn import(&mut self, entries: Vec<LogEntry>) -> Result<usize> {
        let now = Utc::now();
        let mut imported = 0;
        for entry in entries {
            if self.contains(&entry.id) {
                debug!("Skipping import of known entry {}", entry.id);
                continue;
            }
            self.active.push(LogEntry {
                modified_at: Some(entry.modified_at.unwrap_or(now)),
                is_deleted: false,
                ..entry
            });
            imported += 1;
        }
        if imported > 0 {
            self.save_active()?;
        }
        Ok(imported)
    }

    /// Replace local state with the result of a successful sync pass
    ///
    /// Either both files and the in-memory lists are replaced, or none are.
    pub fn apply_sync(&mut self, merged: &MergedState) -> Result<()> {
        self.commit(merged.active.clone(), merged.trash.clone())
    }

    /// Find an entry (active or trashed) by full id or unique prefix
    pub fn find(&self, id: &str) -> Result<&LogEntry> {
        let all: Vec<&LogEntry> = self.active.iter().chain(self.trash.iter()).collect();
        if let Some(entry) = all.iter().copied().find(|e| e.id == id) {
            return Ok(entry);
        }
        let matches: Vec<&LogEntry> = all.into_iter().filter(|e| e.id.starts_with(id)).collect();
        match matches.len() {
            1 => Ok(matches[0]),
            0 => Err(StorageError::EntryNotFound(id.to_string()).into()),
            count => Err(StorageError::AmbiguousId {
                prefix: id.to_string(),
                count,
            }
            .into()),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.active.iter().chain(self.trash.iter()).any(|e| e.id == id)
    }

    fn save_active(&self) -> Result<()> {
        self.entries_file
            .save(&self.active)
            .context("Failed to save entries")
    }

    fn save_trash(&self) -> Result<()> {
        self.trash_file
            .save(&self.trash)
            .context("Failed to save trash")
    }

    /// Write both lists, then adopt them
    ///
    /// Both temp files are written and synced before either is renamed
    /// into place, so a failed write leaves disk and memory as they were.
    fn commit(&mut self, active: Vec<LogEntry>, trash: Vec<LogEntry>) -> Result<()> {
        let staged_active = self
            .entries_file
            .stage(&active)
            .context("Failed to save entries")?;
        let staged_trash = self
            .trash_file
            .stage(&trash)
            .context("Failed to save trash")?;

        staged_trash.commit().context("Failed to save trash")?;
        staged_active.commit().context("Failed to save entries")?;

        self.active = active;
        self.trash = trash;
        Ok(())
    }
}

/// Drop the older copy of any id present in both lists
///
/// Ties keep the trashed copy.
fn resolve_overlap(
    mut active: Vec<LogEntry>,
    mut trash: Vec<LogEntry>,
) -> (Vec<LogEntry>, Vec<LogEntry>) {
    let trashed: HashMap<String, DateTime<Utc>> = trash
        .iter()
        .map(|e| (e.id.clone(), e.effective_modified()))
        .collect();

    let mut newer_active = HashSet::new();
    active.retain(|e| match trashed.get(&e.id) {
        Some(deleted_at) if e.effective_modified() > *deleted_at => {
            newer_active.insert(e.id.clone());
            true
        }
        Some(_) => {
            warn!("Entry {} found in both files, keeping the trashed copy", e.id);
            false
        }
        None => true,
    });
    trash.retain(|e| {
        let keep = !newer_active.contains(&e.id);
        if !keep {
            warn!("Entry {} found in both files, keeping the active copy", e.id);
        }
        keep
    });

    (active, trash)
}

/// Position of the entry matching a full id or unique prefix
fn find_index(entries: &[LogEntry], id: &str) -> Result<usize, StorageError> {
    if let Some(idx) = entries.iter().position(|e| e.id == id) {
        return Ok(idx);
    }
    let matches: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.id.starts_with(id))
        .map(|(idx, _)| idx)
        .collect();
    match matches.as_slice() {
        [idx] => Ok(*idx),
        [] => Err(StorageError::EntryNotFound(id.to_string())),
        _ => Err(StorageError::AmbiguousId {
            prefix: id.to_string(),
            count: matches.len(),
        }),
    }
}
