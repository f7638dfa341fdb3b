//! Client-facing list view and positional edits.
//!
//! The server never ships full state after the initial snapshot; it ships
//! [`ListOp`] streams. Every correct client applies them with exactly the
//! semantics of [`apply_list_ops`] — an index that does not fit the local
//! replica means the replica has diverged, which is fatal for the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One row of the exported list view: `(id, value)` at some index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub id: Uuid,
    pub value: i32,
}

/// A positional edit over a replica.
///
/// Each operation is interpreted against the list state immediately before
/// it; a diff is a sequence applied left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListOp {
    /// Insert `{id, value}` at `index`, shifting the suffix right.
    Insert { id: Uuid, index: usize, value: i32 },
    /// Remove the element at `index`, reinsert it at `new_index` (a
    /// position in the shortened list) with `value`, keeping its id.
    Update {
        id: Uuid,
        index: usize,
        new_index: usize,
        value: i32,
    },
    /// Remove the element at `index`.
    Delete { id: Uuid, index: usize },
}

impl ListOp {
    /// Lowercase wire tag, also used in error messages.
    pub fn tag(&self) -> &'static str {
        match self {
            ListOp::Insert { .. } => "insert",
            ListOp::Update { .. } => "update",
            ListOp::Delete { .. } => "delete",
        }
    }

    /// Id of the item the edit touches.
    pub fn id(&self) -> Uuid {
        match self {
            ListOp::Insert { id, .. } | ListOp::Update { id, .. } | ListOp::Delete { id, .. } => {
                *id
            }
        }
    }
}

/// Replay failure: an edit's index does not fit the replica.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListApplyError {
    #[error("op[{op}] ({tag}): index {index} out of range for list of {len}")]
    IndexOutOfRange {
        op: usize,
        tag: &'static str,
        index: usize,
        len: usize,
    },
}

/// Apply a diff to a replica, returning the upgraded replica.
///
/// Bounds per operation: `Insert` admits `index <= len` (append position),
/// `Update` and `Delete` require `index < len`; an `Update`'s `new_index`
/// must fit the shortened list.
pub fn apply_list_ops(
    mut list: Vec<ListEntry>,
    ops: &[ListOp],
) -> Result<Vec<ListEntry>, ListApplyError> {
    for (i, op) in ops.iter().enumerate() {
        let oob = |index: usize| ListApplyError::IndexOutOfRange {
            op: i,
            tag: op.tag(),
            index,
            len: list.len(),
        };

        match *op {
            ListOp::Insert { id, index, value } => {
                if index > list.len() {
                    return Err(oob(index));
                }
                list.insert(index, ListEntry { id, value });
            }
            ListOp::Update {
                index,
                new_index,
                value,
                ..
            } => {
                if index >= list.len() {
                    return Err(oob(index));
                }
                if new_index >= list.len() {
                    return Err(oob(new_index));
                }
                // The id travels with the element; only the value changes.
                let id = list.remove(index).id;
                list.insert(new_index, ListEntry { id, value });
            }
            ListOp::Delete { index, .. } => {
                if index >= list.len() {
                    return Err(oob(index));
                }
                list.remove(index);
            }
        }
    }

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: Uuid, value: i32) -> ListEntry {
        ListEntry { id, value }
    }

    #[test]
    fn test_insert_at_bounds() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        // Insert at 0 into empty, then append at len, then insert at front.
        let list = apply_list_ops(
            Vec::new(),
            &[
                ListOp::Insert { id: a, index: 0, value: 5 },
                ListOp::Insert { id: b, index: 1, value: 10 },
                ListOp::Insert { id: c, index: 0, value: 1 },
            ],
        )
        .unwrap();

        assert_eq!(list, vec![entry(c, 1), entry(a, 5), entry(b, 10)]);
    }

    #[test]
    fn test_insert_past_end_rejected() {
        let err = apply_list_ops(
            Vec::new(),
            &[ListOp::Insert { id: Uuid::new_v4(), index: 1, value: 0 }],
        )
        .unwrap_err();

        assert_eq!(
            err,
            ListApplyError::IndexOutOfRange { op: 0, tag: "insert", index: 1, len: 0 }
        );
    }

    #[test]
    fn test_update_moves_and_keeps_id() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let list = vec![entry(b, 1), entry(a, 5), entry(c, 10)];

        // a: 5 -> 15, moves to the tail; new_index counts the shortened list.
        let list = apply_list_ops(
            list,
            &[ListOp::Update { id: a, index: 1, new_index: 2, value: 15 }],
        )
        .unwrap();

        assert_eq!(list, vec![entry(b, 1), entry(c, 10), entry(a, 15)]);
    }

    #[test]
    fn test_update_same_index_tolerated() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let list = vec![entry(a, 1), entry(b, 5)];

        let list = apply_list_ops(
            list,
            &[ListOp::Update { id: a, index: 0, new_index: 0, value: 2 }],
        )
        .unwrap();

        assert_eq!(list, vec![entry(a, 2), entry(b, 5)]);
    }

    #[test]
    fn test_update_out_of_range() {
        let a = Uuid::new_v4();
        let list = vec![entry(a, 1)];

        let err = apply_list_ops(
            list.clone(),
            &[ListOp::Update { id: a, index: 1, new_index: 0, value: 2 }],
        )
        .unwrap_err();
        assert!(matches!(err, ListApplyError::IndexOutOfRange { tag: "update", .. }));

        // new_index bound is the shortened list, so 1 is already out for a
        // single-element replica.
        let err = apply_list_ops(
            list,
            &[ListOp::Update { id: a, index: 0, new_index: 1, value: 2 }],
        )
        .unwrap_err();
        assert!(matches!(err, ListApplyError::IndexOutOfRange { index: 1, .. }));
    }

    #[test]
    fn test_delete_last_remaining() {
        let a = Uuid::new_v4();
        let list = apply_list_ops(
            vec![entry(a, 7)],
            &[ListOp::Delete { id: a, index: 0 }],
        )
        .unwrap();
        assert!(list.is_empty());

        let err = apply_list_ops(list, &[ListOp::Delete { id: a, index: 0 }]).unwrap_err();
        assert!(matches!(err, ListApplyError::IndexOutOfRange { tag: "delete", .. }));
    }

    #[test]
    fn test_error_reports_failing_op_position() {
        let a = Uuid::new_v4();
        let err = apply_list_ops(
            Vec::new(),
            &[
                ListOp::Insert { id: a, index: 0, value: 1 },
                ListOp::Delete { id: a, index: 3 },
            ],
        )
        .unwrap_err();

        assert_eq!(
            err,
            ListApplyError::IndexOutOfRange { op: 1, tag: "delete", index: 3, len: 1 }
        );
    }
}
