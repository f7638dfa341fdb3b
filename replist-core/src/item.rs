//! The storage record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies the client that authored a mutation. Zero is reserved for
/// the snapshot generator.
pub type ClientId = u32;

/// A single stored record.
///
/// Items are created by the first `Set` naming their id and are never
/// destroyed: `Delete` only tombstones them (`deleted = true`), at which
/// point they leave the ordered list but stay in the by-id map.
///
/// Serde-derived because the initial snapshot file is a bincode-encoded
/// sequence of these records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable opaque identity.
    pub id: Uuid,
    /// Signed 32-bit sort key.
    pub value: i32,
    /// Tombstone flag.
    pub deleted: bool,
    /// Last writer.
    pub updated_by: ClientId,
    /// Last update, microseconds since the Unix epoch.
    pub updated_at: u64,
}

impl Item {
    /// Create a live item.
    pub fn new(id: Uuid, value: i32, updated_by: ClientId, updated_at: u64) -> Self {
        Self {
            id,
            value,
            deleted: false,
            updated_by,
            updated_at,
        }
    }
}
