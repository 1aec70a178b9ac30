//! Error types for cloud sync.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can fail a sync pass.
///
/// Every variant leaves the caller's local entries untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Endpoint or credential missing.
    #[error("sync is not configured: set endpoint and credential")]
    NotConfigured,

    /// Endpoint unreachable or credential rejected.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Fetching the remote table failed.
    #[error("failed to read remote entries: {0}")]
    RemoteRead(String),

    /// Bulk upsert was rejected or failed in transit.
    #[error("failed to write remote entries: {0}")]
    RemoteWrite(String),

    /// A remote call exceeded the configured timeout.
    #[error("remote call timed out")]
    Timeout,

    /// The pass was cancelled before it completed.
    #[error("sync cancelled")]
    Cancelled,

    /// Another pass is already in flight.
    #[error("a sync pass is already in progress")]
    AlreadySyncing,

    /// The same id appears in both the active list and the trash.
    #[error("entries present in both active list and trash: {}", .0.join(", "))]
    OverlappingLocalIds(Vec<String>),
}

impl SyncError {
    /// Returns true if running the pass again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Connection(_)
                | SyncError::RemoteRead(_)
                | SyncError::RemoteWrite(_)
                | SyncError::Timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::Connection("refused".into()).is_retryable());
        assert!(SyncError::RemoteWrite("constraint".into()).is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::AlreadySyncing.is_retryable());
        assert!(!SyncError::NotConfigured.is_retryable());
    }

    #[test]
    fn error_display_carries_diagnostic() {
        let err = SyncError::RemoteRead("relation \"logs\" does not exist".into());
        assert!(err.to_string().contains("relation \"logs\" does not exist"));

        let err = SyncError::OverlappingLocalIds(vec!["a".into(), "b".into()]);
        assert_eq!(
            err.to_string(),
            "entries present in both active list and trash: a, b"
        );
    }
}
