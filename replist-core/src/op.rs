//! Validated storage mutations.
//!
//! A [`StorageOp`] is the unit the batch service queues and the history
//! commits. Construction validates the textual id and the timestamp;
//! application never fails (a delete of an unknown or already-tombstoned
//! id is a no-op).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::item::ClientId;
use crate::list::ListOp;
use crate::storage::SortedStorage;

/// Construction failure for a [`StorageOp`].
#[derive(Debug, Error)]
pub enum OpError {
    #[error("item id: {0}")]
    InvalidId(#[from] uuid::Error),
    #[error("timestamp: must be non-zero")]
    ZeroTimestamp,
}

/// A mutation over [`SortedStorage`]: upsert or tombstone.
///
/// The server does not distinguish client-side "insert" from "update";
/// both arrive here as [`StorageOp::Set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageOp {
    Set {
        id: Uuid,
        value: i32,
        author: ClientId,
        timestamp: u64,
    },
    Delete {
        id: Uuid,
        author: ClientId,
        timestamp: u64,
    },
}

impl StorageOp {
    /// Build a validated upsert from its wire form.
    pub fn set(id: &str, value: i32, author: ClientId, timestamp: u64) -> Result<Self, OpError> {
        Ok(StorageOp::Set {
            id: parse_id(id)?,
            value,
            author,
            timestamp: validate_timestamp(timestamp)?,
        })
    }

    /// Build a validated tombstone from its wire form.
    pub fn delete(id: &str, author: ClientId, timestamp: u64) -> Result<Self, OpError> {
        Ok(StorageOp::Delete {
            id: parse_id(id)?,
            author,
            timestamp: validate_timestamp(timestamp)?,
        })
    }

    /// Id of the item the operation targets.
    pub fn id(&self) -> Uuid {
        match self {
            StorageOp::Set { id, .. } | StorageOp::Delete { id, .. } => *id,
        }
    }

    /// Server-assigned commit ordering key.
    pub fn timestamp(&self) -> u64 {
        match self {
            StorageOp::Set { timestamp, .. } | StorageOp::Delete { timestamp, .. } => *timestamp,
        }
    }

    /// Mutate `storage`, returning the positional edit produced — `None`
    /// only for a no-op delete.
    pub fn apply(&self, storage: &mut SortedStorage) -> Option<ListOp> {
        match *self {
            StorageOp::Set { id, value, author, timestamp } => {
                Some(storage.set(id, value, author, timestamp))
            }
            StorageOp::Delete { id, author, timestamp } => storage.delete(id, author, timestamp),
        }
    }
}

fn parse_id(id: &str) -> Result<Uuid, OpError> {
    Ok(Uuid::parse_str(id)?)
}

fn validate_timestamp(timestamp: u64) -> Result<u64, OpError> {
    if timestamp == 0 {
        return Err(OpError::ZeroTimestamp);
    }
    Ok(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_validates_inputs() {
        let id = Uuid::new_v4().to_string();

        assert!(StorageOp::set(&id, 1, 7, 1).is_ok());
        assert!(matches!(StorageOp::set("not-a-uuid", 1, 7, 1), Err(OpError::InvalidId(_))));
        assert!(matches!(StorageOp::set(&id, 1, 7, 0), Err(OpError::ZeroTimestamp)));
    }

    #[test]
    fn test_delete_validates_inputs() {
        let id = Uuid::new_v4().to_string();

        assert!(StorageOp::delete(&id, 7, 1).is_ok());
        assert!(StorageOp::delete("", 7, 1).is_err());
        assert!(matches!(StorageOp::delete(&id, 7, 0), Err(OpError::ZeroTimestamp)));
    }

    #[test]
    fn test_accessors() {
        let id = Uuid::new_v4();
        let op = StorageOp::set(&id.to_string(), 3, 9, 42).unwrap();
        assert_eq!(op.id(), id);
        assert_eq!(op.timestamp(), 42);
    }
}
