//! Data models for donelog
//!
//! Defines the log entry record shared by the local store, the merge engine
//! and the remote `logs` table. Field names on the wire are camelCase.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A single work log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Stable identifier, assigned once at creation
    pub id: String,
    /// Free text content
    #[serde(default)]
    pub content: String,
    /// Business time (what the user says the entry is about)
    pub timestamp: DateTime<Utc>,
    /// System time of the last mutation to this id
    ///
    /// Always serialized (as `null` when absent) so bulk uploads carry the
    /// same columns on every row.
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    /// Soft-delete flag
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_deleted: bool,
}

impl LogEntry {
    /// Create a new entry stamped with the current time
    pub fn new(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            timestamp: now,
            modified_at: Some(now),
            is_deleted: false,
        }
    }

    /// Create an entry with a specific ID and business time
    pub fn with_id(id: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            timestamp,
            modified_at: Some(timestamp),
            is_deleted: false,
        }
    }

    /// Update content and optionally the business time
    pub fn edit(&mut self, content: impl Into<String>, timestamp: Option<DateTime<Utc>>) {
        self.content = content.into();
        if let Some(ts) = timestamp {
            self.timestamp = ts;
        }
        self.touch();
    }

    /// Move the entry to the trash
    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
        self.touch();
    }

    /// Bring the entry back from the trash
    ///
    /// This is the only place `is_deleted` is ever cleared.
    pub fn restore(&mut self) {
        self.is_deleted = false;
        self.touch();
    }

    /// Ordering signal for last-write-wins
    pub fn effective_modified(&self) -> DateTime<Utc> {
        self.modified_at.unwrap_or(self.timestamp)
    }

    /// Content signature used to detect independently created duplicates
    pub fn signature(&self) -> Signature {
        Signature(format!(
            "{}|{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.content.trim()
        ))
    }

    /// Fill a missing `modified_at` from the business time
    pub fn normalized(mut self) -> Self {
        if self.modified_at.is_none() {
            self.modified_at = Some(self.timestamp);
        }
        self
    }

    fn touch(&mut self) {
        self.modified_at = Some(Utc::now());
    }
}

/// Composite of canonical timestamp and trimmed content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_entry_new() {
        let entry = LogEntry::new("shipped the release");
        assert_eq!(entry.content, "shipped the release");
        assert!(!entry.is_deleted);
        assert_eq!(entry.modified_at, Some(entry.timestamp));
        assert!(Uuid::parse_str(&entry.id).is_ok());
    }

    #[test]
    fn test_edit_bumps_modified() {
        let mut entry = LogEntry::with_id("a", "draft", at(1_000));
        entry.edit("final", Some(at(2_000)));
        assert_eq!(entry.content, "final");
        assert_eq!(entry.timestamp, at(2_000));
        assert!(entry.effective_modified() > at(2_000));
    }

    #[test]
    fn test_soft_delete_and_restore() {
        let mut entry = LogEntry::with_id("a", "x", at(1_000));
        entry.soft_delete();
        assert!(entry.is_deleted);
        let deleted_at = entry.effective_modified();

        entry.restore();
        assert!(!entry.is_deleted);
        assert!(entry.effective_modified() >= deleted_at);
    }

    #[test]
    fn test_effective_modified_falls_back_to_timestamp() {
        let mut entry = LogEntry::with_id("a", "x", at(1_000));
        entry.modified_at = None;
        assert_eq!(entry.effective_modified(), at(1_000));
        assert_eq!(entry.normalized().modified_at, Some(at(1_000)));
    }

    #[test]
    fn test_signature_trims_content() {
        let a = LogEntry::with_id("a", "  standup notes\n", at(1_700_000_000));
        let b = LogEntry::with_id("b", "standup notes", at(1_700_000_000));
        assert_eq!(a.signature(), b.signature());
        assert_eq!(
            a.signature().as_str(),
            "2023-11-14T22:13:20.000Z|standup notes"
        );
    }

    #[test]
    fn test_signature_differs_by_time() {
        let a = LogEntry::with_id("a", "c", at(1_000));
        let b = LogEntry::with_id("b", "c", at(1_001));
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let entry = LogEntry::with_id("a", "x", at(0));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], "a");
        assert_eq!(json["isDeleted"], false);
        assert!(json.get("modifiedAt").is_some());
    }

    #[test]
    fn test_remote_row_without_modified_at() {
        let json = r#"{"id":"r1","content":"x","timestamp":"2024-01-02T03:04:05.000Z","isDeleted":null}"#;
        let entry: LogEntry = serde_json::from_str(json).unwrap();
        assert!(entry.modified_at.is_none());
        assert!(!entry.is_deleted);
        assert_eq!(entry.effective_modified(), entry.timestamp);

        let back = serde_json::to_value(&entry).unwrap();
        assert!(back["modifiedAt"].is_null());
    }

    #[test]
    fn test_offset_timestamps_are_canonicalized() {
        let json = r#"{"id":"r1","content":"x","timestamp":"2024-01-02T05:04:05+02:00"}"#;
        let entry: LogEntry = serde_json::from_str(json).unwrap();
        assert!(entry.signature().as_str().starts_with("2024-01-02T03:04:05.000Z|"));
    }
}
