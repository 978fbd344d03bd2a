//! Durable per-room replica storage.

mod memory_storage;
mod replica_store;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
mod sqlite_storage;
mod storage;

pub use memory_storage::MemoryStorage;
pub use replica_store::ReplicaStore;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
pub use sqlite_storage::SqliteStorage;
pub use storage::{ReplicaStorage, StorageResult};
