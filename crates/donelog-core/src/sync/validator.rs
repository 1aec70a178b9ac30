//! Connection validation
//!
//! Checks that an endpoint is reachable and accepts the credential by
//! running the store's bounded probe under a timeout.

use std::time::Duration;

use tracing::{debug, warn};

use super::error::{SyncError, SyncResult};
use super::remote::{Connector, RemoteStore};
use crate::config::RemoteConfig;

/// Check endpoint and credential with a freshly built client.
///
/// Never fails: any transport, auth, schema or timeout problem is logged
/// and reported as `false`.
pub async fn test_connection<C: Connector>(
    connector: &C,
    remote: &RemoteConfig,
    timeout: Duration,
) -> bool {
    let result = match connector.connect(remote, timeout) {
        Ok(store) => check_connection(&store, timeout).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            debug!("Connection to {} ok", remote.endpoint);
            true
        }
        Err(e) => {
            warn!("Connection to {} failed: {}", remote.endpoint, e);
            false
        }
    }
}

/// Probe an existing store handle, mapping every failure to a connection error
pub async fn check_connection<S: RemoteStore>(store: &S, timeout: Duration) -> SyncResult<()> {
    match tokio::time::timeout(timeout, store.probe()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(SyncError::Connection(message))) => Err(SyncError::Connection(message)),
        Ok(Err(SyncError::Timeout)) | Err(_) => Err(SyncError::Timeout),
        Ok(Err(other)) => Err(SyncError::Connection(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::remote::{MemoryConnector, MemoryStore, RestConnector};

    fn remote() -> RemoteConfig {
        RemoteConfig::new("mem://logs", "key")
    }

    #[tokio::test]
    async fn test_connection_ok() {
        let connector = MemoryConnector::new(MemoryStore::new());
        assert!(test_connection(&connector, &remote(), Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_connection_rejected() {
        let store = MemoryStore::new();
        store.fail_probe(Some("401 Unauthorized: Invalid API key"));
        let connector = MemoryConnector::new(store);
        assert!(!test_connection(&connector, &remote(), Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_connection_invalid_credential_never_panics() {
        let remote = RemoteConfig::new("https://abc.supabase.co", "bad\nkey");
        assert!(!test_connection(&RestConnector, &remote, Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_times_out() {
        let store = MemoryStore::new();
        store.set_latency(Duration::from_secs(60));

        let err = check_connection(&store, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, SyncError::Timeout);
    }

    #[tokio::test]
    async fn test_check_connection_maps_errors() {
        let store = MemoryStore::new();
        store.fail_probe(Some("relation \"logs\" does not exist"));
        let err = check_connection(&store, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SyncError::Connection(m) if m.contains("logs")));
    }
}
