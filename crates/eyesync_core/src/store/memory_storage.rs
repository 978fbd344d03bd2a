//! In-memory storage implementation.
//!
//! This provides a simple in-memory implementation of [`ReplicaStorage`]
//! for use in unit tests and ephemeral deployments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::storage::{ReplicaStorage, StorageResult};
use crate::error::ReplicaError;
use crate::replica::ReplicaRecord;

/// In-memory replica storage.
///
/// Thread-safe via `RwLock`, but data is lost when dropped.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    /// room -> key -> record
    rooms: Arc<RwLock<HashMap<String, HashMap<String, ReplicaRecord>>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplicaStorage for MemoryStorage {
    fn load_room(&self, room: &str) -> StorageResult<HashMap<String, ReplicaRecord>> {
        let rooms = self.rooms.read().map_err(|_| ReplicaError::Poisoned)?;
        Ok(rooms.get(room).cloned().unwrap_or_default())
    }

    fn save_record(&self, room: &str, key: &str, record: &ReplicaRecord) -> StorageResult<()> {
        let mut rooms = self.rooms.write().map_err(|_| ReplicaError::Poisoned)?;
        rooms
            .entry(room.to_string())
            .or_default()
            .insert(key.to_string(), record.clone());
        Ok(())
    }
}
