//! Storage error handling
//!
//! Provides typed errors for local entry files with descriptive messages
//! and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing the local log
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Entry file could not be parsed
    #[error("Entry file '{path}' is corrupted: {details}. A backup has been created at '{backup_path}'.")]
    CorruptFile {
        path: PathBuf,
        backup_path: PathBuf,
        details: String,
    },

    /// Failed to encode entries
    #[error("Failed to encode entries: {0}")]
    Encode(#[from] serde_json::Error),

    /// No entry with the given id (or id prefix)
    #[error("No entry matching '{0}'")]
    EntryNotFound(String),

    /// An id prefix matched more than one entry
    #[error("'{prefix}' matches {count} entries, use a longer prefix")]
    AmbiguousId { prefix: String, count: usize },

    /// Atomic write failed during rename
    #[error("Atomic write failed: could not rename '{from}' to '{to}': {source}")]
    AtomicWriteFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            _ if is_disk_full_error(&error) => StorageError::DiskFull {
                path,
                source: error,
            },
            _ => StorageError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free up disk space and try again."),
            StorageError::PermissionDenied { .. } => {
                Some("Check file and directory permissions for the data directory.")
            }
            StorageError::CorruptFile { .. } => {
                Some("A backup of the corrupted file has been kept. Run a sync to pull your entries back from the remote store.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StorageError::AmbiguousId { .. } => Some("Use more characters of the entry id."),
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_classification() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from_io(io_err, PathBuf::from("/test/path"));

        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_disk_full_detection() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::from_io(io_err, PathBuf::from("/full/disk"));

        assert!(matches!(err, StorageError::DiskFull { .. }));
        assert_eq!(err.recovery_suggestion(), Some("Free up disk space and try again."));
    }

    #[test]
    fn test_corrupt_file_display() {
        let err = StorageError::CorruptFile {
            path: PathBuf::from("/data/entries.json"),
            backup_path: PathBuf::from("/data/entries.json.corrupt"),
            details: "expected value at line 1".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("corrupted"));
        assert!(msg.contains("entries.json.corrupt"));
    }

    #[test]
    fn test_ambiguous_id_display() {
        let err = StorageError::AmbiguousId {
            prefix: "ab".to_string(),
            count: 3,
        };
        assert_eq!(err.to_string(), "'ab' matches 3 entries, use a longer prefix");
        assert!(err.recovery_suggestion().is_some());
    }
}
