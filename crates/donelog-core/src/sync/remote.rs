//! Remote store contract and implementations.
//!
//! The remote side is one logical table, `logs`, holding every entry ever
//! synced (deleted ones included). The sync core only needs three things
//! from it: a bounded probe, a full read and a bulk upsert keyed by `id`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::debug;

use super::error::{SyncError, SyncResult};
use crate::config::RemoteConfig;
use crate::models::LogEntry;

/// Name of the remote table
pub const LOGS_TABLE: &str = "logs";

/// Rows requested per page when reading the whole table
///
/// The server may cap pages below this (`max-rows`), so paging stops only
/// on an empty page.
const PAGE_SIZE: usize = 1000;

/// Columns written by an upsert
const UPSERT_COLUMNS: &str = "id,content,timestamp,modifiedAt,isDeleted";

/// Operations the sync core needs from the remote table.
pub trait RemoteStore: Send + Sync {
    /// Minimal bounded read used to validate endpoint and credential.
    fn probe(&self) -> impl Future<Output = SyncResult<()>> + Send;

    /// Every row, regardless of deletion state. Order is unspecified.
    fn fetch_all(&self) -> impl Future<Output = SyncResult<Vec<LogEntry>>> + Send;

    /// Insert or overwrite rows by `id`. A failure means nothing was applied.
    fn upsert_many(&self, entries: &[LogEntry]) -> impl Future<Output = SyncResult<()>> + Send;
}

/// Builds a remote store handle from endpoint and credential.
pub trait Connector: Send + Sync {
    type Store: RemoteStore + 'static;

    fn connect(&self, remote: &RemoteConfig, timeout: Duration) -> SyncResult<Self::Store>;
}

// ==================== HTTP ====================

/// PostgREST-style HTTP client for the `logs` table.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    table_url: String,
}

impl RestStore {
    /// Create a client for `{endpoint}/rest/v1/logs`
    pub fn new(remote: &RemoteConfig, timeout: Duration) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(&remote.credential)?);
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", remote.credential))?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .user_agent(concat!("donelog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            table_url: table_url(&remote.endpoint),
        })
    }

    pub fn table_url(&self) -> &str {
        &self.table_url
    }

    async fn fetch_page(&self, offset: usize) -> SyncResult<Vec<LogEntry>> {
        let limit = PAGE_SIZE.to_string();
        let offset = offset.to_string();
        let response = self
            .client
            .get(&self.table_url)
            .query(&[
                ("select", "*"),
                ("order", "id.asc"),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
            ])
            .send()
            .await
            .map_err(|e| classify_transport(e, SyncError::RemoteRead))?;

        let response = check_status(response, SyncError::RemoteRead).await?;
        response
            .json::<Vec<LogEntry>>()
            .await
            .map_err(|e| SyncError::RemoteRead(format!("unexpected response body: {}", e)))
    }
}

impl RemoteStore for RestStore {
    async fn probe(&self) -> SyncResult<()> {
        let response = self
            .client
            .get(&self.table_url)
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| classify_transport(e, SyncError::Connection))?;

        check_status(response, SyncError::Connection).await?;
        Ok(())
    }

    async fn fetch_all(&self) -> SyncResult<Vec<LogEntry>> {
        let rows = fetch_pages(|offset| self.fetch_page(offset)).await?;
        debug!("Fetched {} remote rows", rows.len());
        Ok(rows)
    }

    async fn upsert_many(&self, entries: &[LogEntry]) -> SyncResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(&self.table_url)
            .query(&[("on_conflict", "id"), ("columns", UPSERT_COLUMNS)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(entries)
            .send()
            .await
            .map_err(|e| classify_transport(e, SyncError::RemoteWrite))?;

        check_status(response, SyncError::RemoteWrite).await?;
        debug!("Upserted {} rows", entries.len());
        Ok(())
    }
}

/// Connector producing [`RestStore`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestConnector;

impl Connector for RestConnector {
    type Store = RestStore;

    fn connect(&self, remote: &RemoteConfig, timeout: Duration) -> SyncResult<RestStore> {
        RestStore::new(remote, timeout)
    }
}

/// Read pages starting at each running offset until one comes back empty
async fn fetch_pages<F, Fut>(mut fetch_page: F) -> SyncResult<Vec<LogEntry>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = SyncResult<Vec<LogEntry>>>,
{
    let mut rows = Vec::new();
    loop {
        let page = fetch_page(rows.len()).await?;
        if page.is_empty() {
            return Ok(rows);
        }
        rows.extend(page);
    }
}

fn table_url(endpoint: &str) -> String {
    format!("{}/rest/v1/{}", endpoint.trim_end_matches('/'), LOGS_TABLE)
}

fn header_value(value: &str) -> SyncResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| SyncError::Connection("credential contains invalid characters".to_string()))
}

fn classify_transport(error: reqwest::Error, otherwise: fn(String) -> SyncError) -> SyncError {
    if error.is_timeout() {
        SyncError::Timeout
    } else if error.is_connect() {
        SyncError::Connection(error.to_string())
    } else {
        otherwise(error.to_string())
    }
}

async fn check_status(
    response: reqwest::Response,
    otherwise: fn(String) -> SyncError,
) -> SyncResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Connection(message)),
        _ => Err(otherwise(message)),
    }
}

// ==================== In-memory ====================

#[derive(Debug, Default)]
struct MemoryTable {
    rows: HashMap<String, LogEntry>,
    fail_probe: Option<String>,
    fail_fetch: Option<String>,
    fail_upsert: Option<String>,
    latency: Duration,
    upserts: usize,
}

/// Shared in-process table with failure injection.
///
/// Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    table: Arc<Mutex<MemoryTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with rows
    pub fn with_rows(rows: impl IntoIterator<Item = LogEntry>) -> Self {
        let store = Self::new();
        store.table().rows = rows.into_iter().map(|e| (e.id.clone(), e)).collect();
        store
    }

    /// Snapshot of all rows, ordered by id
    pub fn rows(&self) -> Vec<LogEntry> {
        let mut rows: Vec<_> = self.table().rows.values().cloned().collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }

    pub fn get(&self, id: &str) -> Option<LogEntry> {
        self.table().rows.get(id).cloned()
    }

    /// Number of successful upsert calls
    pub fn upsert_count(&self) -> usize {
        self.table().upserts
    }

    pub fn fail_probe(&self, message: Option<&str>) {
        self.table().fail_probe = message.map(str::to_string);
    }

    pub fn fail_fetch(&self, message: Option<&str>) {
        self.table().fail_fetch = message.map(str::to_string);
    }

    pub fn fail_upsert(&self, message: Option<&str>) {
        self.table().fail_upsert = message.map(str::to_string);
    }

    /// Delay applied before every call
    pub fn set_latency(&self, latency: Duration) {
        self.table().latency = latency;
    }

    fn table(&self) -> std::sync::MutexGuard<'_, MemoryTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        let latency = self.table().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl RemoteStore for MemoryStore {
    async fn probe(&self) -> SyncResult<()> {
        self.simulate_latency().await;
        match self.table().fail_probe.clone() {
            Some(message) => Err(SyncError::Connection(message)),
            None => Ok(()),
        }
    }

    async fn fetch_all(&self) -> SyncResult<Vec<LogEntry>> {
        self.simulate_latency().await;
        let table = self.table();
        if let Some(message) = &table.fail_fetch {
            return Err(SyncError::RemoteRead(message.clone()));
        }
        Ok(table.rows.values().cloned().collect())
    }

    async fn upsert_many(&self, entries: &[LogEntry]) -> SyncResult<()> {
        self.simulate_latency().await;
        let mut table = self.table();
        if let Some(message) = &table.fail_upsert {
            return Err(SyncError::RemoteWrite(message.clone()));
        }
        for entry in entries {
            table.rows.insert(entry.id.clone(), entry.clone());
        }
        table.upserts += 1;
        Ok(())
    }
}

/// Connector handing out clones of one [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
    connects: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// How many handles have been created
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    type Store = MemoryStore;

    fn connect(&self, _remote: &RemoteConfig, _timeout: Duration) -> SyncResult<MemoryStore> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.clone())
    }
}
