//! Client-side replica sync.
//!
//! The [`SyncClient`] runs inside the application that produces the content
//! (for example a canvas editor). For every key it keeps the last version tag
//! it saw on the store, pushes local edits after a debounce window, and polls
//! the store for changes made elsewhere.
//!
//! # Architecture
//!
//! ```text
//!   ContentSource (editor buffers, dirty flags)
//!         ↑↓
//!    SyncClient (debounce timers, poll loops, tag cache)
//!         ↑↓
//!   ReplicaTransport (HttpTransport / LocalTransport)
//!         ↑↓
//!    ReplicaStore (one per room)
//! ```
//!
//! # Key Components
//!
//! - [`ContentSource`] - What the client needs from the editor
//! - [`ReplicaTransport`] - Conditional GET/HEAD/PUT/DELETE against a store
//! - [`SyncClient`] - Per-key push and pull state machine
//! - [`MemorySource`] - In-memory [`ContentSource`] for headless clients and tests

mod client;
#[cfg(feature = "http-client")]
mod http;
mod local;
mod source;
mod transport;

pub use client::{KeyStatus, SyncClient};
#[cfg(feature = "http-client")]
pub use http::HttpTransport;
pub use local::LocalTransport;
pub use source::{ContentSource, MemorySource};
pub use transport::{BoxFuture, RemoteHead, ReplicaTransport};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ReplicaError;
use crate::hash::VersionTag;

/// Default quiet period before a local change is pushed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(900);

/// Default interval between polls of one key.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Timing policy of a [`SyncClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last local change before pushing
    pub debounce: Duration,
    /// Interval between polls of each key
    pub poll_interval: Duration,
    /// Re-arm the push timer with this delay after a transient push failure.
    ///
    /// `None` waits for the next local change instead.
    pub retry_failed_push: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_failed_push: None,
        }
    }
}

/// Errors surfaced by sync operations.
///
/// None of these are fatal to the client: a failed push leaves the key dirty
/// and a failed poll is retried on the next tick.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request could not be completed
    #[error("Transport error: {0}")]
    Transport(String),

    #[cfg(feature = "http-client")]
    /// HTTP client failure (connect, timeout, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "http-client")]
    /// The server URL could not be parsed
    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Unexpected status code
    #[error("Server responded with status {0}")]
    Server(u16),

    /// Malformed response
    #[error("Unexpected response: {0}")]
    Protocol(String),

    /// Error from an in-process store
    #[error("Replica store error: {0}")]
    Store(#[from] ReplicaError),
}

impl SyncError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport(_) => true,
            #[cfg(feature = "http-client")]
            SyncError::Http(_) => true,
            #[cfg(feature = "http-client")]
            SyncError::InvalidUrl(_) => false,
            SyncError::Server(status) => *status >= 500 || *status == 408 || *status == 429,
            SyncError::Protocol(_) => false,
            SyncError::Store(e) => e.is_retryable(),
        }
    }
}

/// Outcome of a push attempt for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushOutcome {
    /// The key was not dirty; nothing to do.
    Clean,
    /// Local bytes hash to the last known tag; marked clean without a request.
    Unchanged,
    /// Content was stored under the returned tag and the key marked clean.
    Pushed {
        /// Tag returned by the store
        tag: VersionTag,
    },
    /// Content was stored, but the producer changed it during the request.
    /// The key stays dirty and another push is scheduled.
    Superseded {
        /// Tag of the bytes that were stored
        tag: VersionTag,
    },
}

/// Outcome of a poll for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollOutcome {
    /// The store still holds the cached tag (or is still empty).
    Unchanged,
    /// New content was pulled and handed to the source.
    Pulled {
        /// Tag of the pulled content
        tag: VersionTag,
    },
    /// The key was deleted remotely and the source was told to clear it.
    Cleared,
    /// The response was overtaken by a newer local observation and dropped.
    Stale,
}
