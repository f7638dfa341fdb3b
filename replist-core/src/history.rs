//! The versioned document log.
//!
//! Versions form a dense prefix `0, 1, ..., latest`. Each committed
//! [`Document`] caches both sides of its commit: the storage mutations that
//! went in and the positional edits they produced. Serving a diff from
//! version `v` is then pure concatenation of the cached outputs of
//! `v+1 ..= latest` — no storage work on the read path.
//!
//! A single readers-writer lock guards the log and the current storage
//! together, so `(version, data)` pairs handed to clients are always
//! mutually consistent: commits take the write lock, reads take the read
//! lock and observe either all of a commit or none of it.

use std::sync::RwLock;

use log::debug;

use crate::list::{ListEntry, ListOp};
use crate::op::StorageOp;
use crate::storage::SortedStorage;

/// One committed version.
#[derive(Debug)]
pub struct Document {
    /// Dense version number; 0 is the seed.
    pub version: i64,
    /// Storage mutations committed in this version.
    pub input_ops: Vec<StorageOp>,
    /// Positional edits they produced, in commit order.
    pub output_ops: Vec<ListOp>,
}

struct HistoryState {
    documents: Vec<Document>,
    storage: SortedStorage,
}

impl HistoryState {
    fn latest(&self) -> i64 {
        self.documents.len() as i64 - 1
    }
}

/// Append-only history of [`Document`] versions plus the current storage.
pub struct DocumentHistory {
    state: RwLock<HistoryState>,
}

impl DocumentHistory {
    /// Empty history: no versions yet, empty storage. The first
    /// `add_version` commit becomes version 0.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HistoryState {
                documents: Vec::new(),
                storage: SortedStorage::new(),
            }),
        }
    }

    /// History seeded at version 0 from an already-built storage, with
    /// empty input and output operations.
    pub fn seeded(storage: SortedStorage) -> Self {
        Self {
            state: RwLock::new(HistoryState {
                documents: vec![Document {
                    version: 0,
                    input_ops: Vec::new(),
                    output_ops: Vec::new(),
                }],
                storage,
            }),
        }
    }

    /// Commit a batch of operations as one new version.
    ///
    /// An empty batch is a no-op — no version is produced. The new version
    /// is observable only after the write lock drops, so concurrent readers
    /// never see a half-written commit.
    pub fn add_version(&self, ops: Vec<StorageOp>) {
        if ops.is_empty() {
            return;
        }

        let mut state = self.state.write().expect("history lock poisoned");

        let output_ops = state.storage.apply_ops(&ops);
        let version = state.latest() + 1;
        debug!(
            "committing v{version}: {} input ops, {} output ops",
            ops.len(),
            output_ops.len()
        );

        state.documents.push(Document { version, input_ops: ops, output_ops });
    }

    /// Latest version and its exported list, as an atomic pair.
    pub fn snapshot(&self) -> (i64, Vec<ListEntry>) {
        let state = self.state.read().expect("history lock poisoned");
        (state.latest(), state.storage.export())
    }

    /// Edits a client at `version` must apply to reach `latest`.
    ///
    /// A client at or ahead of `latest` gets `(latest, [])` — the reply is
    /// clamped to a version the server can actually serve.
    pub fn diff_with_latest(&self, version: i64) -> (i64, Vec<ListOp>) {
        let state = self.state.read().expect("history lock poisoned");
        let latest = state.latest();

        if version >= latest {
            return (latest, Vec::new());
        }

        let start = (version + 1).max(0) as usize;
        let ops = state.documents[start..]
            .iter()
            .flat_map(|doc| doc.output_ops.iter().copied())
            .collect();

        (latest, ops)
    }

    /// Rebuild a fresh storage by replaying inputs `0 ..= version`.
    ///
    /// Audit path only; returns `None` for an unknown version.
    pub fn build_storage(&self, version: i64) -> Option<SortedStorage> {
        let state = self.state.read().expect("history lock poisoned");
        if !valid_version(version, state.latest()) {
            return None;
        }

        let mut storage = SortedStorage::new();
        for doc in &state.documents[..=version as usize] {
            storage.apply_ops(&doc.input_ops);
        }
        Some(storage)
    }

    /// True iff `version` names a committed document.
    pub fn is_version_valid(&self, version: i64) -> bool {
        let state = self.state.read().expect("history lock poisoned");
        valid_version(version, state.latest())
    }

    /// Highest committed version; -1 before the first commit.
    pub fn latest(&self) -> i64 {
        self.state.read().expect("history lock poisoned").latest()
    }

    /// Number of output operations cached for `version`.
    pub fn output_ops_len(&self, version: i64) -> Option<usize> {
        let state = self.state.read().expect("history lock poisoned");
        state.documents.get(usize::try_from(version).ok()?).map(|d| d.output_ops.len())
    }

    /// Evict a version from the middle of the history.
    ///
    /// Unimplemented: every cached diff crossing the removed version would
    /// have to be rebuilt and every client re-seeded.
    pub fn remove_version(&self, _version: i64) {
        unimplemented!("version removal requires rebuilding all downstream diff caches");
    }
}

impl Default for DocumentHistory {
    fn default() -> Self {
        Self::new()
    }
}

fn valid_version(version: i64, latest: i64) -> bool {
    version >= 0 && version <= latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::apply_list_ops;
    use uuid::Uuid;

    fn set(id: Uuid, value: i32, ts: u64) -> StorageOp {
        StorageOp::Set { id, value, author: 1, timestamp: ts }
    }

    fn del(id: Uuid, ts: u64) -> StorageOp {
        StorageOp::Delete { id, author: 1, timestamp: ts }
    }

    #[test]
    fn test_empty_commit_produces_no_version() {
        let history = DocumentHistory::new();
        assert_eq!(history.latest(), -1);

        history.add_version(Vec::new());
        assert_eq!(history.latest(), -1);
    }

    #[test]
    fn test_versions_are_dense() {
        let history = DocumentHistory::new();
        for i in 0..4 {
            history.add_version(vec![set(Uuid::new_v4(), i, (i + 1) as u64)]);
            assert_eq!(history.latest(), i as i64);
            assert!(history.is_version_valid(i as i64));
        }
        assert!(!history.is_version_valid(4));
        assert!(!history.is_version_valid(-1));
    }

    #[test]
    fn test_diff_replay_equals_stepwise_snapshots() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        // Seed v0 from three items, commit two more versions.
        let mut seed = SortedStorage::new();
        seed.apply_ops(&[set(a, 5, 1), set(b, 1, 1), set(c, 10, 1)]);
        let v0_list = seed.export();
        let history = DocumentHistory::seeded(seed);

        history.add_version(vec![set(a, 15, 2), set(Uuid::new_v4(), 3, 2)]);
        history.add_version(vec![del(b, 3)]);

        let (latest, diff) = history.diff_with_latest(0);
        assert_eq!(latest, 2);

        let replayed = apply_list_ops(v0_list, &diff).unwrap();
        let (version, snapshot) = history.snapshot();
        assert_eq!(version, 2);
        assert_eq!(replayed, snapshot);
    }

    #[test]
    fn test_diff_for_current_and_future_versions_is_empty() {
        let history = DocumentHistory::new();
        history.add_version(vec![set(Uuid::new_v4(), 1, 1)]);

        let (version, ops) = history.diff_with_latest(0);
        assert_eq!(version, 0);
        assert!(ops.is_empty());

        // A client claiming to be ahead is clamped back to latest.
        let (version, ops) = history.diff_with_latest(7);
        assert_eq!(version, 0);
        assert!(ops.is_empty());
    }

    #[test]
    fn test_commit_totality() {
        let history = DocumentHistory::new();
        let a = Uuid::new_v4();
        let unknown = Uuid::new_v4();

        // Three ops, one of which (delete of an unknown id) is a no-op.
        history.add_version(vec![set(a, 1, 1), del(unknown, 1), del(a, 1)]);
        assert_eq!(history.output_ops_len(0), Some(2));
    }

    #[test]
    fn test_build_storage_replays_inputs() {
        let history = DocumentHistory::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        history.add_version(vec![set(a, 5, 1), set(b, 2, 1)]);
        history.add_version(vec![set(a, -4, 2)]);

        let rebuilt = history.build_storage(1).unwrap();
        let (_, current) = history.snapshot();
        assert_eq!(rebuilt.export(), current);

        let v0 = history.build_storage(0).unwrap();
        let values: Vec<i32> = v0.export().iter().map(|e| e.value).collect();
        assert_eq!(values, vec![2, 5]);

        assert!(history.build_storage(2).is_none());
    }

    #[test]
    fn test_seeded_history_serves_v0() {
        let mut seed = SortedStorage::new();
        seed.apply_ops(&[set(Uuid::new_v4(), 1, 1)]);
        let history = DocumentHistory::seeded(seed);

        let (version, list) = history.snapshot();
        assert_eq!(version, 0);
        assert_eq!(list.len(), 1);
        assert_eq!(history.output_ops_len(0), Some(0));
    }
}
