#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Error (common error types)
pub mod error;

/// Content hashing (version tags shared by client and store)
pub mod hash;

/// Replica data model
pub mod replica;

/// Durable per-room replica storage
pub mod store;

/// Debounced sync client
#[cfg(feature = "native-sync")]
pub mod sync;

pub use error::{ReplicaError, Result};
pub use hash::{VersionTag, compute_content_hash};
pub use replica::{ConditionalGet, Head, Replica, ReplicaRecord};
pub use store::{MemoryStorage, ReplicaStorage, ReplicaStore};
