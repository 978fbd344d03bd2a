//! Room routing.
//!
//! Every room is owned by exactly one [`ReplicaStore`] for the lifetime of the
//! process. The first request for a room opens (and loads) its store; later
//! requests get the same instance.

use crate::config::{Config, StorageBackend};
use eyesync_core::store::SqliteStorage;
use eyesync_core::{MemoryStorage, ReplicaError, ReplicaStorage, ReplicaStore};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Maximum length of a room identifier.
pub const MAX_ROOM_LEN: usize = 128;

/// Statistics about the open rooms
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoomStats {
    pub active_rooms: usize,
}

/// Where new room stores persist their records
enum RoomBackend {
    /// One SQLite file per room
    Sqlite { dir: PathBuf },
    /// One storage shared by every room
    Shared(Arc<dyn ReplicaStorage>),
}

/// Maps room identifiers to their stores
pub struct RoomRouter {
    /// Map of room_id to its store
    rooms: RwLock<HashMap<String, Arc<ReplicaStore>>>,
    backend: RoomBackend,
}

/// Check that a room identifier is safe to use as a file name.
pub fn validate_room(room_id: &str) -> Result<(), ReplicaError> {
    let valid = !room_id.is_empty()
        && room_id.len() <= MAX_ROOM_LEN
        && room_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ReplicaError::InvalidRoom(room_id.to_string()))
    }
}

impl RoomRouter {
    /// Create a router that keeps each room in `dir/<room>.db`
    pub fn sqlite(dir: PathBuf) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            backend: RoomBackend::Sqlite { dir },
        }
    }

    /// Create the router selected by `config.storage`
    pub fn from_config(config: &Config) -> Self {
        match config.storage {
            StorageBackend::Sqlite => Self::sqlite(config.rooms_dir()),
            StorageBackend::Memory => Self::in_memory(),
        }
    }

    /// Create a router backed by process memory
    pub fn in_memory() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    /// Create a router whose rooms all persist through `storage`
    pub fn with_storage(storage: Arc<dyn ReplicaStorage>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            backend: RoomBackend::Shared(storage),
        }
    }

    fn open_store(&self, room_id: &str) -> Result<ReplicaStore, ReplicaError> {
        let storage: Arc<dyn ReplicaStorage> = match &self.backend {
            RoomBackend::Sqlite { dir } => {
                std::fs::create_dir_all(dir)?;
                Arc::new(SqliteStorage::open(dir.join(format!("{}.db", room_id)))?)
            }
            RoomBackend::Shared(storage) => storage.clone(),
        };
        ReplicaStore::open(room_id, storage)
    }

    /// Get or create the store for a room
    pub async fn resolve(&self, room_id: &str) -> Result<Arc<ReplicaStore>, ReplicaError> {
        validate_room(room_id)?;

        // Check if room exists
        {
            let rooms = self.rooms.read().await;
            if let Some(store) = rooms.get(room_id) {
                return Ok(store.clone());
            }
        }

        // Create new room
        let mut rooms = self.rooms.write().await;

        // Double-check after acquiring write lock
        if let Some(store) = rooms.get(room_id) {
            return Ok(store.clone());
        }

        let store = match self.open_store(room_id) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Failed to open replica store for room {}: {}", room_id, e);
                return Err(e);
            }
        };

        rooms.insert(room_id.to_string(), store.clone());
        info!("Opened replica store for room: {}", room_id);

        Ok(store)
    }

    /// Get an existing room's store (does not create if not found)
    pub async fn get(&self, room_id: &str) -> Option<Arc<ReplicaStore>> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).cloned()
    }

    /// Get statistics about the open rooms
    pub async fn stats(&self) -> RoomStats {
        let rooms = self.rooms.read().await;
        RoomStats {
            active_rooms: rooms.len(),
        }
    }
}
