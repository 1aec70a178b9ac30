//! Entry file persistence
//!
//! Saves and loads lists of log entries as JSON arrays.
//! Uses atomic writes (write to temp file, then rename) to prevent corruption.
//!
//! Files (under `data_dir`):
//! - `entries.json` - active entries
//! - `trash.json` - soft-deleted entries

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use super::error::{StorageError, StorageResult};
use crate::models::LogEntry;

/// One JSON file holding a list of entries
#[derive(Debug, Clone)]
pub struct EntryFile {
    path: PathBuf,
}

impl EntryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load entries from disk
    ///
    /// A missing file is an empty list. A file that can't be parsed is
    /// copied aside to `<name>.corrupt` and reported as `CorruptFile`.
    pub fn load(&self) -> StorageResult<Vec<LogEntry>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::ReadError {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<Vec<LogEntry>>(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let backup_path = self.backup_path();
                warn!("Entry file {:?} is corrupted, backing up to {:?}", self.path, backup_path);
                fs::copy(&self.path, &backup_path)
                    .map_err(|err| StorageError::from_io(err, backup_path.clone()))?;
                Err(StorageError::CorruptFile {
                    path: self.path.clone(),
                    backup_path,
                    details: e.to_string(),
                })
            }
        }
    }

    /// Save entries using an atomic write
    pub fn save(&self, entries: &[LogEntry]) -> StorageResult<()> {
        self.stage(entries)?.commit()
    }

    /// Write entries to the temp file without replacing the target yet
    ///
    /// Nothing visible changes until [`StagedWrite::commit`]; dropping the
    /// staged write removes the temp file.
    pub fn stage(&self, entries: &[LogEntry]) -> StorageResult<StagedWrite> {
        let json = serde_json::to_vec_pretty(entries)?;
        stage_write(&self.path, &json)
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".corrupt");
        self.path.with_file_name(name)
    }
}

/// A fully written and synced temp file waiting to be renamed into place
#[derive(Debug)]
pub struct StagedWrite {
    temp_path: PathBuf,
    path: PathBuf,
    committed: bool,
}

impl StagedWrite {
    /// Rename the temp file over the target
    pub fn commit(mut self) -> StorageResult<()> {
        fs::rename(&self.temp_path, &self.path).map_err(|source| {
            StorageError::AtomicWriteFailed {
                from: self.temp_path.clone(),
                to: self.path.clone(),
                source,
            }
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// First half of an atomic write
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
///
/// The rename to the target path happens in [`StagedWrite::commit`].
fn stage_write(path: &Path, data: &[u8]) -> StorageResult<StagedWrite> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    let staged = StagedWrite {
        temp_path,
        path: path.to_path_buf(),
        committed: false,
    };

    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, staged.temp_path.clone()))?;

    file.sync_all()
        .map_err(|e| StorageError::from_io(e, staged.temp_path.clone()))?;

    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let file = EntryFile::new(temp_dir.path().join("entries.json"));
        assert!(!file.exists());
        assert!(file.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = EntryFile::new(temp_dir.path().join("entries.json"));

        let entries = vec![LogEntry::new("one"), LogEntry::new("two")];
        file.save(&entries).unwrap();

        assert!(file.exists());
        assert_eq!(file.load().unwrap(), entries);
        assert!(!temp_dir.path().join("entries.tmp").exists());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let file = EntryFile::new(temp_dir.path().join("a").join("b").join("trash.json"));

        file.save(&[LogEntry::new("nested")]).unwrap();
        assert_eq!(file.load().unwrap().len(), 1);
    }

    #[test]
    fn test_dropped_stage_leaves_target_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let file = EntryFile::new(temp_dir.path().join("entries.json"));
        file.save(&[LogEntry::new("kept")]).unwrap();

        let staged = file.stage(&[]).unwrap();
        assert!(temp_dir.path().join("entries.tmp").exists());
        drop(staged);

        assert!(!temp_dir.path().join("entries.tmp").exists());
        assert_eq!(file.load().unwrap()[0].content, "kept");
    }

    #[test]
    fn test_corrupt_file_is_backed_up() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entries.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = EntryFile::new(&path).load().unwrap_err();
        match err {
            StorageError::CorruptFile { backup_path, .. } => {
                assert!(backup_path.ends_with("entries.json.corrupt"));
                assert_eq!(fs::read(backup_path).unwrap(), b"{ not json");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
