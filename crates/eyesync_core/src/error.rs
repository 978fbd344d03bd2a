use serde::Serialize;
use thiserror::Error;

/// Unified error type for replica store operations
#[derive(Debug, Error)]
pub enum ReplicaError {
    // IO errors
    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A write was not acknowledged by storage
    #[error("Failed to persist replica '{key}' in room '{room}': {message}")]
    Persistence {
        /// Room of the failed write
        room: String,
        /// Key of the failed write
        key: String,
        /// Underlying storage error
        message: String,
    },

    /// A persisted record failed its hash check on load
    #[error("Stored replica '{key}' in room '{room}' does not match its version tag")]
    Corrupt {
        /// Room of the record
        room: String,
        /// Key of the record
        key: String,
    },

    /// A thread panicked while holding the state lock
    #[error("Replica state lock was poisoned")]
    Poisoned,

    // Addressing errors
    /// Empty, too long or containing control characters
    #[error("Invalid replica key: '{0}'")]
    InvalidKey(String),

    /// Not a valid room identifier
    #[error("Invalid room identifier: '{0}'")]
    InvalidRoom(String),
}

impl ReplicaError {
    /// Whether this error means a write was not acknowledged and may be retried.
    ///
    /// Clients see these as transient failures; addressing errors are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidKey(_) | Self::InvalidRoom(_))
    }
}

/// Result type alias for replica store operations
pub type Result<T> = std::result::Result<T, ReplicaError>;

/// A serializable representation of ReplicaError for JSON error bodies
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
}

impl From<&ReplicaError> for SerializableError {
    fn from(err: &ReplicaError) -> Self {
        let kind = match err {
            ReplicaError::Io(_) => "Io",
            #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
            ReplicaError::Sqlite(_) => "Sqlite",
            ReplicaError::Persistence { .. } => "Persistence",
            ReplicaError::Corrupt { .. } => "Corrupt",
            ReplicaError::Poisoned => "Poisoned",
            ReplicaError::InvalidKey(_) => "InvalidKey",
            ReplicaError::InvalidRoom(_) => "InvalidRoom",
        }
        .to_string();

        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl ReplicaError {
    /// Convert to a serializable representation
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}
