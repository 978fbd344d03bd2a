//! The interface the sync client needs from the content layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::hash::{VersionTag, compute_content_hash};

/// Producer/consumer side of the content being replicated.
///
/// The producer's in-memory bytes are always the canvas of record; the
/// replica is a copy. [`apply_remote`](ContentSource::apply_remote) may be
/// called at any time, including while the key is dirty, and the
/// implementation decides whether it is safe to overwrite local state.
pub trait ContentSource: Send + Sync {
    /// Whether the key has local edits not yet confirmed by the store.
    fn is_dirty(&self, key: &str) -> bool;

    /// Mark the key's local content as saved, but only if its bytes still hash
    /// to `pushed`.
    ///
    /// The check and the flag update must happen atomically with respect to
    /// local edits, otherwise an edit landing in between is marked saved and
    /// never pushed. Returns whether the key is clean afterwards.
    fn mark_clean(&self, key: &str, pushed: &VersionTag) -> bool;

    /// Current local bytes for the key.
    fn read_bytes(&self, key: &str) -> Vec<u8>;

    /// Hand pulled content to the consumer; `None` means the key was cleared.
    fn apply_remote(&self, key: &str, content: Option<Vec<u8>>);
}

impl<S: ContentSource + ?Sized> ContentSource for Arc<S> {
    fn is_dirty(&self, key: &str) -> bool {
        (**self).is_dirty(key)
    }

    fn mark_clean(&self, key: &str, pushed: &VersionTag) -> bool {
        (**self).mark_clean(key, pushed)
    }

    fn read_bytes(&self, key: &str) -> Vec<u8> {
        (**self).read_bytes(key)
    }

    fn apply_remote(&self, key: &str, content: Option<Vec<u8>>) {
        (**self).apply_remote(key, content)
    }
}

#[derive(Debug, Default, Clone)]
struct Buffer {
    /// `None` once the key was cleared remotely
    bytes: Option<Vec<u8>>,
    dirty: bool,
    /// Remote content that arrived while local edits were unsent
    deferred: Option<Option<Vec<u8>>>,
}

/// In-memory content buffers keyed by replica key.
///
/// Remote content is applied immediately to clean buffers. For dirty buffers
/// it is held back, since overwriting would discard unsent edits; the newest
/// held-back value can be inspected with [`deferred`](MemorySource::deferred)
/// and is dropped once the local edit is pushed.
#[derive(Debug, Default)]
pub struct MemorySource {
    buffers: Mutex<HashMap<String, Buffer>>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    fn buffers(&self) -> MutexGuard<'_, HashMap<String, Buffer>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the local bytes of `key` and mark it dirty.
    pub fn edit(&self, key: &str, bytes: Vec<u8>) {
        let mut buffers = self.buffers();
        let buffer = buffers.entry(key.to_string()).or_default();
        buffer.bytes = Some(bytes);
        buffer.dirty = true;
    }

    /// Mark `key` dirty without changing its bytes.
    ///
    /// Has no effect on a key that holds no content.
    pub fn touch(&self, key: &str) {
        if let Some(buffer) = self.buffers().get_mut(key)
            && buffer.bytes.is_some()
        {
            buffer.dirty = true;
        }
    }

    /// Current local bytes of `key`; `None` if never written or cleared.
    pub fn local(&self, key: &str) -> Option<Vec<u8>> {
        self.buffers().get(key).and_then(|b| b.bytes.clone())
    }

    /// Remote content held back because `key` was dirty when it arrived.
    pub fn deferred(&self, key: &str) -> Option<Option<Vec<u8>>> {
        self.buffers().get(key).and_then(|b| b.deferred.clone())
    }
}

impl ContentSource for MemorySource {
    fn is_dirty(&self, key: &str) -> bool {
        self.buffers()
            .get(key)
            .is_some_and(|b| b.dirty && b.bytes.is_some())
    }

    fn mark_clean(&self, key: &str, pushed: &VersionTag) -> bool {
        let mut buffers = self.buffers();
        let Some(buffer) = buffers.get_mut(key) else {
            return true;
        };
        let current = buffer.bytes.as_deref().map(compute_content_hash);
        if buffer.dirty && current.as_ref() != Some(pushed) {
            return false;
        }
        buffer.dirty = false;
        buffer.deferred = None;
        true
    }

    fn read_bytes(&self, key: &str) -> Vec<u8> {
        self.buffers()
            .get(key)
            .and_then(|b| b.bytes.clone())
            .unwrap_or_default()
    }

    fn apply_remote(&self, key: &str, content: Option<Vec<u8>>) {
        let mut buffers = self.buffers();
        let buffer = buffers.entry(key.to_string()).or_default();
        if buffer.dirty {
            log::debug!("[MemorySource] {}: holding back remote content, local edits unsent", key);
            buffer.deferred = Some(content);
            return;
        }
        buffer.bytes = content;
    }
}
