//! The coupled by-id map + by-value ordered index.
//!
//! `SortedStorage` is the sole owner of its [`Item`]s. The ordered list is
//! a vector of live item ids kept non-decreasing by value; tombstoned items
//! stay in the map and leave the list. Every effective mutation yields the
//! one positional edit a client needs to mirror it.
//!
//! Invariants, observable at every public call boundary:
//! - every ordered-list id maps to a live item in the by-id map;
//! - every live item in the by-id map appears exactly once in the list;
//! - the list is sorted non-decreasingly by value.
//!
//! An id that is mapped live but cannot be located in the list breaks the
//! engine's ground truth; that path panics rather than serving wrong diffs.

use std::collections::HashMap;

use uuid::Uuid;

use crate::item::{ClientId, Item};
use crate::list::{ListEntry, ListOp};
use crate::op::StorageOp;

/// Sorted-by-value index over identified items with soft deletion.
#[derive(Debug, Default)]
pub struct SortedStorage {
    /// All items ever seen, tombstones included.
    items: HashMap<Uuid, Item>,
    /// Live item ids, ordered by value ascending.
    order: Vec<Uuid>,
}

impl SortedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a storage from pre-sorted records, preserving their order.
    ///
    /// The initial-snapshot loader relies on this: the file is written
    /// sorted by value, and the list must come up in exactly that order.
    pub fn from_items(items: Vec<Item>) -> Self {
        let mut storage = Self {
            items: HashMap::with_capacity(items.len()),
            order: Vec::with_capacity(items.len()),
        };

        for item in items {
            if !item.deleted {
                storage.order.push(item.id);
            }
            storage.items.insert(item.id, item);
        }

        storage
    }

    /// Snapshot of the ordered live view, in index order.
    pub fn export(&self) -> Vec<ListEntry> {
        self.order
            .iter()
            .map(|id| {
                let item = &self.items[id];
                ListEntry { id: item.id, value: item.value }
            })
            .collect()
    }

    /// Apply operations in input order; returns the positional edits they
    /// produced, also in order. No-op deletes contribute nothing.
    pub fn apply_ops(&mut self, ops: &[StorageOp]) -> Vec<ListOp> {
        let mut list_ops = Vec::with_capacity(ops.len());
        for op in ops {
            if let Some(list_op) = op.apply(self) {
                list_ops.push(list_op);
            }
        }
        list_ops
    }

    /// Number of live entries in the ordered list.
    pub fn live_len(&self) -> usize {
        self.order.len()
    }

    /// Number of items in the by-id map, tombstones included.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Create, overwrite, or revive an item.
    pub(crate) fn set(
        &mut self,
        id: Uuid,
        value: i32,
        author: ClientId,
        timestamp: u64,
    ) -> ListOp {
        match self.items.get(&id) {
            None => {
                self.items.insert(id, Item::new(id, value, author, timestamp));
                let index = self.lower_bound(value);
                self.order.insert(index, id);
                ListOp::Insert { id, index, value }
            }
            Some(item) if item.deleted => {
                // Revive a tombstone: it is absent from the list, so this
                // is an insert, not a move.
                let item = self.items.get_mut(&id).expect("just looked up");
                item.value = value;
                item.deleted = false;
                item.updated_by = author;
                item.updated_at = timestamp;

                let index = self.lower_bound(value);
                self.order.insert(index, id);
                ListOp::Insert { id, index, value }
            }
            Some(item) => {
                // The new value may break the ordering, so cut first and
                // reinsert at the post-removal lower bound.
                let index = self.position_of(id, item.value);
                self.order.remove(index);

                let item = self.items.get_mut(&id).expect("just looked up");
                item.value = value;
                item.updated_by = author;
                item.updated_at = timestamp;

                let new_index = self.lower_bound(value);
                self.order.insert(new_index, id);
                ListOp::Update { id, index, new_index, value }
            }
        }
    }

    /// Tombstone an item. Unknown or already-deleted ids are a no-op.
    pub(crate) fn delete(
        &mut self,
        id: Uuid,
        author: ClientId,
        timestamp: u64,
    ) -> Option<ListOp> {
        match self.items.get(&id) {
            None => None,
            Some(item) if item.deleted => None,
            Some(item) => {
                let index = self.position_of(id, item.value);
                self.order.remove(index);

                let item = self.items.get_mut(&id).expect("just looked up");
                item.deleted = true;
                item.updated_by = author;
                item.updated_at = timestamp;

                Some(ListOp::Delete { id, index })
            }
        }
    }

    /// Leftmost list position whose occupant has value >= `value`.
    ///
    /// Equal-valued items therefore admit new arrivals to their left.
    fn lower_bound(&self, value: i32) -> usize {
        self.order.partition_point(|id| self.items[id].value < value)
    }

    /// Unique list position of a live item, found by lower-bound on its
    /// current value and a rightward id scan.
    ///
    /// Panics if the item is not there: the map and the list disagree, and
    /// every diff served from this state would be wrong.
    fn position_of(&self, id: Uuid, value: i32) -> usize {
        let start = self.lower_bound(value);
        for i in start..self.order.len() {
            if self.order[i] == id {
                return i;
            }
        }
        panic!("ordered list out of sync: live item {id} (value {value}) not found from index {start}");
    }
}
