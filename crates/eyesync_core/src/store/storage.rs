//! Storage abstraction for replica persistence.
//!
//! This module defines the [`ReplicaStorage`] trait which abstracts over different
//! storage backends (SQLite, in-memory) for persisting the replicas of a room.

use std::collections::HashMap;

use crate::error::ReplicaError;
use crate::replica::ReplicaRecord;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, ReplicaError>;

/// Trait for replica storage backends.
///
/// # Storage Model
///
/// A room is the unit of loading: [`load_room`](ReplicaStorage::load_room)
/// returns every record of the room at once. Writes are per key, and
/// [`save_record`](ReplicaStorage::save_record) must not return `Ok` until
/// the record would survive a crash.
pub trait ReplicaStorage: Send + Sync {
    /// Load every record stored for a room.
    ///
    /// Returns an empty map if the room has never been written.
    fn load_room(&self, room: &str) -> StorageResult<HashMap<String, ReplicaRecord>>;

    /// Durably store one record, replacing any previous state for the key.
    fn save_record(&self, room: &str, key: &str, record: &ReplicaRecord) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    // Tests are in memory_storage.rs using MemoryStorage
}
