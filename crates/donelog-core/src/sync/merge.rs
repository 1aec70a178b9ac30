//! Reconciliation of local and remote entries.
//!
//! The merge is a pure function over three snapshots: the local active
//! list, the local trash and the freshly fetched remote table. It never
//! performs I/O; the orchestrator decides whether the result is committed.
//!
//! 1. Identity merge: per id, keep the copy with the latest
//!    `modifiedAt` (falling back to `timestamp`). Local wins ties.
//! 2. Deduplication: entries with different ids but the same
//!    [`Signature`] collapse to one survivor. Non-deleted entries sort
//!    first, then by id; every other live member of the group is
//!    soft-deleted and stamped with the merge time. Members that are
//!    already deleted keep their `modifiedAt`, so merging a merge's own
//!    output (as local and remote) yields the same output again.
//! 3. Split: the reconciled map is partitioned by `isDeleted`.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::error::{SyncError, SyncResult};
use crate::models::{LogEntry, Signature};

/// Outcome of a merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedState {
    /// Entries with `is_deleted == false`, ordered by business time
    pub active: Vec<LogEntry>,
    /// Entries with `is_deleted == true`, most recently modified first
    pub trash: Vec<LogEntry>,
    /// How many entries were soft-deleted as duplicates in this merge
    pub deduplicated: usize,
}

impl MergedState {
    /// All reconciled entries, active first
    pub fn all(&self) -> impl Iterator<Item = &LogEntry> {
        self.active.iter().chain(self.trash.iter())
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.trash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.trash.is_empty()
    }
}

/// Reconcile local state against the remote table.
///
/// `now` stamps the entries that lose a deduplication tie-break.
/// Fails only when an id is present in both local lists.
pub fn merge(
    local_active: &[LogEntry],
    local_trash: &[LogEntry],
    remote: &[LogEntry],
    now: DateTime<Utc>,
) -> SyncResult<MergedState> {
    check_disjoint(local_active, local_trash)?;

    let local = local_active
        .iter()
        .cloned()
        .map(|e| LogEntry {
            is_deleted: false,
            ..e
        })
        .chain(local_trash.iter().cloned().map(|e| LogEntry {
            is_deleted: true,
            ..e
        }));

    let mut merged = merge_by_id(remote, local);
    let deduplicated = deduplicate(&mut merged, now);

    debug!(
        "Merged {} local and {} remote entries into {} ({} duplicates)",
        local_active.len() + local_trash.len(),
        remote.len(),
        merged.len(),
        deduplicated
    );

    Ok(split(merged, deduplicated))
}

fn check_disjoint(active: &[LogEntry], trash: &[LogEntry]) -> SyncResult<()> {
    let active_ids: HashSet<&str> = active.iter().map(|e| e.id.as_str()).collect();
    let mut overlapping: Vec<String> = trash
        .iter()
        .filter(|e| active_ids.contains(e.id.as_str()))
        .map(|e| e.id.clone())
        .collect();

    if overlapping.is_empty() {
        return Ok(());
    }
    overlapping.sort();
    overlapping.dedup();
    Err(SyncError::OverlappingLocalIds(overlapping))
}

/// Last-write-wins per id, seeded from the remote side
fn merge_by_id(
    remote: &[LogEntry],
    local: impl Iterator<Item = LogEntry>,
) -> HashMap<String, LogEntry> {
    let mut map: HashMap<String, LogEntry> = remote
        .iter()
        .map(|entry| (entry.id.clone(), entry.clone()))
        .collect();

    for entry in local {
        match map.get(&entry.id) {
            Some(current) if entry.effective_modified() < current.effective_modified() => {}
            _ => {
                map.insert(entry.id.clone(), entry);
            }
        }
    }

    map
}

/// Soft-delete all but one entry per signature. Returns the number of losers.
///
/// Losers that are already deleted keep their `modified_at`, so feeding a
/// merge result back in yields the same result.
fn deduplicate(map: &mut HashMap<String, LogEntry>, now: DateTime<Utc>) -> usize {
    let mut groups: BTreeMap<Signature, Vec<&LogEntry>> = BTreeMap::new();
    for entry in map.values() {
        groups.entry(entry.signature()).or_default().push(entry);
    }

    let losers: Vec<String> = groups
        .into_values()
        .filter(|group| group.len() > 1)
        .flat_map(|mut group| {
            group.sort_by(|a, b| (a.is_deleted, &a.id).cmp(&(b.is_deleted, &b.id)));
            group
                .into_iter()
                .skip(1)
                .filter(|e| !e.is_deleted)
                .map(|e| e.id.clone())
                .collect::<Vec<_>>()
        })
        .collect();

    for id in &losers {
        if let Some(entry) = map.get_mut(id) {
            entry.is_deleted = true;
            entry.modified_at = Some(now);
        }
    }

    losers.len()
}

fn split(map: HashMap<String, LogEntry>, deduplicated: usize) -> MergedState {
    let (mut active, mut trash): (Vec<_>, Vec<_>) =
        map.into_values().partition(|entry| !entry.is_deleted);

    active.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    trash.sort_by(|a, b| {
        b.effective_modified()
            .cmp(&a.effective_modified())
            .then_with(|| a.id.cmp(&b.id))
    });

    MergedState {
        active,
        trash,
        deduplicated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn entry(id: &str, content: &str, ts: i64, modified: i64) -> LogEntry {
        LogEntry {
            id: id.to_string(),
            content: content.to_string(),
            timestamp: at(ts),
            modified_at: Some(at(modified)),
            is_deleted: false,
        }
    }

    fn deleted(mut e: LogEntry) -> LogEntry {
        e.is_deleted = true;
        e
    }

    fn ids(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    fn now() -> DateTime<Utc> {
        at(10_000)
    }

    #[test]
    fn test_new_local_entry_is_kept() {
        let local = vec![entry("a", "buy milk", 0, 0)];
        let result = merge(&local, &[], &[], now()).unwrap();
        assert_eq!(ids(&result.active), vec!["a"]);
        assert!(result.trash.is_empty());
        assert_eq!(result.deduplicated, 0);
    }

    #[test]
    fn test_remote_only_entries_are_pulled() {
        let remote = vec![entry("r", "from phone", 0, 0), deleted(entry("d", "gone", 1, 5))];
        let result = merge(&[], &[], &remote, now()).unwrap();
        assert_eq!(ids(&result.active), vec!["r"]);
        assert_eq!(ids(&result.trash), vec!["d"]);
    }

    #[test]
    fn test_newer_remote_edit_wins() {
        let local = vec![entry("a", "x", 0, 1)];
        let remote = vec![entry("a", "x-edited", 0, 2)];
        let result = merge(&local, &[], &remote, now()).unwrap();
        assert_eq!(result.active.len(), 1);
        assert_eq!(result.active[0].content, "x-edited");
    }

    #[test]
    fn test_newer_local_edit_wins() {
        let local = vec![entry("a", "local", 0, 3)];
        let remote = vec![entry("a", "remote", 0, 2)];
        let result = merge(&local, &[], &remote, now()).unwrap();
        assert_eq!(result.active[0].content, "local");
    }

    #[test]
    fn test_local_wins_exact_tie() {
        let local = vec![entry("a", "local", 0, 2)];
        let remote = vec![entry("a", "remote", 0, 2)];
        let result = merge(&local, &[], &remote, now()).unwrap();
        assert_eq!(result.active[0].content, "local");
    }

    #[test]
    fn test_missing_modified_at_falls_back_to_timestamp() {
        let mut remote_row = entry("a", "remote", 5, 0);
        remote_row.modified_at = None;
        let local = vec![entry("a", "local", 0, 4)];

        let result = merge(&local, &[], &[remote_row], now()).unwrap();
        assert_eq!(result.active[0].content, "remote");
    }

    #[test]
    fn test_local_delete_propagates() {
        let trash = vec![deleted(entry("a", "x", 0, 5))];
        let remote = vec![entry("a", "x", 0, 1)];
        let result = merge(&[], &trash, &remote, now()).unwrap();
        assert!(result.active.is_empty());
        assert_eq!(ids(&result.trash), vec!["a"]);
    }

    #[test]
    fn test_remote_delete_propagates() {
        let local = vec![entry("a", "x", 0, 1)];
        let remote = vec![deleted(entry("a", "x", 0, 5))];
        let result = merge(&local, &[], &remote, now()).unwrap();
        assert!(result.active.is_empty());
        assert_eq!(ids(&result.trash), vec!["a"]);
    }

    #[test]
    fn test_newer_remote_restore_wins_over_older_local_delete() {
        let trash = vec![deleted(entry("a", "x", 0, 3))];
        let remote = vec![entry("a", "x", 0, 7)];
        let result = merge(&[], &trash, &remote, now()).unwrap();
        assert_eq!(ids(&result.active), vec!["a"]);
    }

    #[test]
    fn test_local_lists_are_normalized_by_membership() {
        let mut in_trash = entry("t", "x", 0, 1);
        in_trash.is_deleted = false;
        let in_active = deleted(entry("a", "y", 0, 1));

        let result = merge(&[in_active], &[in_trash], &[], now()).unwrap();
        assert_eq!(ids(&result.active), vec!["a"]);
        assert_eq!(ids(&result.trash), vec!["t"]);
    }

    #[test]
    fn test_duplicates_collapse_to_smallest_id() {
        let local = vec![entry("b", "c", 0, 0), entry("a", "c", 0, 0)];
        let result = merge(&local, &[], &[], now()).unwrap();

        assert_eq!(ids(&result.active), vec!["a"]);
        assert_eq!(ids(&result.trash), vec!["b"]);
        assert_eq!(result.trash[0].modified_at, Some(now()));
        assert_eq!(result.deduplicated, 1);
    }

    #[test]
    fn test_duplicates_match_on_trimmed_content() {
        let local = vec![entry("a", "  standup\n", 0, 0)];
        let remote = vec![entry("b", "standup", 0, 0)];
        let result = merge(&local, &[], &remote, now()).unwrap();
        assert_eq!(ids(&result.active), vec!["a"]);
        assert_eq!(ids(&result.trash), vec!["b"]);
    }

    #[test]
    fn test_active_duplicate_beats_deleted_one() {
        let local = vec![entry("z", "c", 0, 0)];
        let trash = vec![deleted(entry("a", "c", 0, 0))];
        let result = merge(&local, &trash, &[], now()).unwrap();

        assert_eq!(ids(&result.active), vec!["z"]);
        assert_eq!(ids(&result.trash), vec!["a"]);
    }

    #[test]
    fn test_three_way_duplicate_keeps_one() {
        let remote = vec![entry("c", "c", 0, 0), entry("b", "c", 0, 0)];
        let local = vec![entry("a", "c", 0, 0)];
        let result = merge(&local, &[], &remote, now()).unwrap();

        assert_eq!(ids(&result.active), vec!["a"]);
        assert_eq!(result.trash.len(), 2);
        assert_eq!(result.deduplicated, 2);
    }

    #[test]
    fn test_different_timestamps_are_not_duplicates() {
        let local = vec![entry("a", "c", 0, 0), entry("b", "c", 1, 0)];
        let result = merge(&local, &[], &[], now()).unwrap();
        assert_eq!(ids(&result.active), vec!["a", "b"]);
        assert_eq!(result.deduplicated, 0);
    }

    #[test]
    fn test_trash_sorted_most_recent_first() {
        let trash = vec![
            deleted(entry("old", "1", 0, 1)),
            deleted(entry("new", "2", 0, 9)),
            deleted(entry("mid", "3", 0, 5)),
        ];
        let result = merge(&[], &trash, &[], now()).unwrap();
        assert_eq!(ids(&result.trash), vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_overlapping_local_ids_are_rejected() {
        let local = vec![entry("a", "x", 0, 0)];
        let trash = vec![deleted(entry("a", "x", 0, 1))];
        let err = merge(&local, &trash, &[], now()).unwrap_err();
        assert_eq!(err, SyncError::OverlappingLocalIds(vec!["a".to_string()]));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let local = vec![
            entry("a", "c", 0, 0),
            entry("b", "c", 0, 0),
            entry("x", "solo", 3, 4),
        ];
        let trash = vec![deleted(entry("t", "bin", 1, 2))];
        let remote = vec![entry("x", "solo-remote", 3, 1), entry("r", "phone", 2, 2)];

        let first = merge(&local, &trash, &remote, now()).unwrap();
        let remote_again: Vec<_> = first.all().cloned().collect();
        let second = merge(&first.active, &first.trash, &remote_again, at(20_000)).unwrap();

        assert_eq!(second.active, first.active);
        assert_eq!(second.trash, first.trash);
        assert_eq!(first.deduplicated, 1);
        assert_eq!(second.deduplicated, 0);
    }

    #[test]
    fn test_never_undeletes() {
        let trash = vec![
            deleted(entry("a", "c", 0, 0)),
            deleted(entry("b", "c", 0, 0)),
        ];
        let remote = vec![deleted(entry("r", "other", 1, 1))];
        let result = merge(&[], &trash, &remote, now()).unwrap();

        assert!(result.active.is_empty());
        assert!(result.trash.iter().all(|e| e.is_deleted));
        assert_eq!(result.trash.len(), 3);
    }

    #[test]
    fn test_one_entry_per_id() {
        let local = vec![entry("a", "1", 0, 1), entry("b", "2", 1, 1)];
        let remote = vec![entry("a", "1", 0, 0), entry("b", "2", 1, 2), entry("c", "3", 2, 0)];
        let result = merge(&local, &[], &remote, now()).unwrap();

        let mut seen: Vec<_> = result.all().map(|e| e.id.as_str()).collect();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }
}
