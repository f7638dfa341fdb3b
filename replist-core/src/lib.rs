//! # replist-core — versioned sorted-list document engine
//!
//! The server-side heart of replist: a by-value sorted index over
//! identified items, and an append-only version history that can turn any
//! past replica into the current one with a minimal stream of positional
//! edits.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  StorageOp batch   ┌──────────────────────────┐
//! │ batch worker │ ─────────────────► │ DocumentHistory          │
//! └──────────────┘                    │                          │
//!                                     │  v0 ◄─ v1 ◄─ v2 ◄─ ... ◄─┼── latest
//!                                     │  each version caches:    │
//!                                     │   - input StorageOps     │
//!                                     │   - output ListOps       │
//!                                     │                          │
//!                                     │ ┌──────────────────────┐ │
//!                                     │ │ SortedStorage        │ │
//!                                     │ │  by-id map (+tombs)  │ │
//!                                     │ │  by-value order      │ │
//!                                     │ └──────────────────────┘ │
//!                                     └──────────────────────────┘
//!          diff(v) = concat(outputs of v+1 ..= latest)
//! ```
//!
//! ## Modules
//!
//! - [`item`] — the storage record (id, sort key, tombstone, writer meta)
//! - [`list`] — the client-facing view: entries, positional edits, replay
//! - [`op`] — validated storage mutations (Set / Delete)
//! - [`storage`] — the coupled by-id map + by-value ordered index
//! - [`history`] — the versioned document log
//! - [`snapshot`] — initial snapshot generation and loading

pub mod history;
pub mod item;
pub mod list;
pub mod op;
pub mod snapshot;
pub mod storage;

pub use history::{Document, DocumentHistory};
pub use item::{ClientId, Item};
pub use list::{apply_list_ops, ListApplyError, ListEntry, ListOp};
pub use op::{OpError, StorageOp};
pub use snapshot::{generate_snapshot, load_history, SnapshotError};
pub use storage::SortedStorage;

/// Microseconds since the Unix epoch.
///
/// The engine stamps every mutation with this; zero is reserved as
/// "invalid" by the [`StorageOp`] constructors.
pub fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
