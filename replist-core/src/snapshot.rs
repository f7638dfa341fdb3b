//! Initial snapshot generation and loading.
//!
//! The v0 data set travels as a single binary blob: a bincode-encoded
//! sequence of [`Item`] records, pre-sorted by value ascending. The loader
//! trusts that order and builds the ordered list without re-sorting, then
//! seeds a [`DocumentHistory`] at version 0.

use std::path::Path;

use log::info;
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::history::DocumentHistory;
use crate::item::Item;
use crate::storage::SortedStorage;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("storage size: must be greater than zero")]
    EmptySize,
    #[error("snapshot file: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encode: {0}")]
    Encode(String),
    #[error("snapshot decode: {0}")]
    Decode(String),
}

/// Generate `size` random items, sort them by value, write the blob.
pub fn generate_snapshot(path: impl AsRef<Path>, size: usize) -> Result<(), SnapshotError> {
    if size == 0 {
        return Err(SnapshotError::EmptySize);
    }

    info!("generating {size} items");
    let items = generate_items(size, crate::now_micros());

    info!("encoding snapshot");
    let raw = bincode::serde::encode_to_vec(&items, bincode::config::standard())
        .map_err(|e| SnapshotError::Encode(e.to_string()))?;

    info!("writing {} bytes to {}", raw.len(), path.as_ref().display());
    std::fs::write(path, raw)?;

    info!("done");
    Ok(())
}

/// Random live items with uniform i32 values, sorted by value ascending.
pub fn generate_items(size: usize, now: u64) -> Vec<Item> {
    let mut rng = rand::thread_rng();
    let mut items: Vec<Item> = (0..size)
        .map(|_| Item::new(Uuid::new_v4(), rng.gen::<i32>(), 0, now))
        .collect();

    items.sort_by_key(|item| item.value);
    items
}

/// Load a snapshot file into a history seeded at version 0.
pub fn load_history(path: impl AsRef<Path>) -> Result<DocumentHistory, SnapshotError> {
    info!("reading {}", path.as_ref().display());
    let raw = std::fs::read(path)?;

    info!("decoding snapshot");
    let (items, _): (Vec<Item>, usize) =
        bincode::serde::decode_from_slice(&raw, bincode::config::standard())
            .map_err(|e| SnapshotError::Decode(e.to_string()))?;

    info!("building storage: {} items", items.len());
    let storage = SortedStorage::from_items(items);

    Ok(DocumentHistory::seeded(storage))
}
