//! Per-room replica store.
//!
//! A [`ReplicaStore`] is the single authority for every key of one room. All
//! operations take the room's state lock, so two operations on the same key
//! never interleave. Writes go to [`ReplicaStorage`] while the lock is held and
//! the in-memory map is only updated once the storage has accepted them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use super::storage::ReplicaStorage;
use crate::error::{ReplicaError, Result};
use crate::hash::{VersionTag, compute_content_hash};
use crate::replica::{ConditionalGet, Head, Replica, ReplicaRecord, validate_key};

/// Durable store for the replicas of one room.
pub struct ReplicaStore {
    room_id: String,
    records: Mutex<HashMap<String, ReplicaRecord>>,
    storage: Arc<dyn ReplicaStorage>,
}

impl std::fmt::Debug for ReplicaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaStore")
            .field("room_id", &self.room_id)
            .finish_non_exhaustive()
    }
}

impl ReplicaStore {
    /// Open the store for `room_id`, loading its persisted records.
    ///
    /// A room that was never written starts with every key absent.
    pub fn open(room_id: impl Into<String>, storage: Arc<dyn ReplicaStorage>) -> Result<Self> {
        let room_id = room_id.into();
        let records = storage.load_room(&room_id)?;
        log::debug!(
            "[ReplicaStore] Loaded room '{}' with {} record(s)",
            room_id,
            records.len()
        );
        Ok(Self {
            room_id,
            records: Mutex::new(records),
            storage,
        })
    }

    /// The room this store owns.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, ReplicaRecord>>> {
        self.records.lock().map_err(|_| ReplicaError::Poisoned)
    }

    /// Current content and tag, or `None` if never set or deleted.
    pub fn get(&self, key: &str) -> Result<Option<Replica>> {
        validate_key(key)?;
        let records = self.lock()?;
        Ok(records.get(key).and_then(ReplicaRecord::to_replica))
    }

    /// Current tag and modification time, without the content.
    pub fn head(&self, key: &str) -> Result<Head> {
        validate_key(key)?;
        let records = self.lock()?;
        Ok(match records.get(key) {
            Some(record) => Head {
                tag: record.tag().cloned(),
                last_modified: Some(record.last_modified()),
            },
            None => Head {
                tag: None,
                last_modified: None,
            },
        })
    }

    /// Read `key` unless the caller already holds the current tag.
    pub fn conditional_get(
        &self,
        key: &str,
        if_none_match: Option<&VersionTag>,
    ) -> Result<ConditionalGet> {
        validate_key(key)?;
        let records = self.lock()?;
        let Some(replica) = records.get(key).and_then(ReplicaRecord::to_replica) else {
            return Ok(ConditionalGet::Absent);
        };
        if if_none_match == Some(&replica.tag) {
            return Ok(ConditionalGet::NotModified { tag: replica.tag });
        }
        Ok(ConditionalGet::Modified(replica))
    }

    /// Store `bytes` under `key` and return the canonical tag.
    ///
    /// The record is persisted before this returns. Writing the bytes that are
    /// already stored is a no-op and keeps the existing `last_modified`.
    pub fn put(&self, key: &str, bytes: Vec<u8>) -> Result<VersionTag> {
        validate_key(key)?;
        let mut records = self.lock()?;

        let tag = compute_content_hash(&bytes);
        if records.get(key).and_then(ReplicaRecord::tag) == Some(&tag) {
            log::debug!(
                "[ReplicaStore] {}/{}: unchanged put, tag {}",
                self.room_id,
                key,
                tag
            );
            return Ok(tag);
        }

        let record = ReplicaRecord::stored(bytes, Utc::now());
        self.persist(key, &record)?;
        records.insert(key.to_string(), record);

        log::debug!("[ReplicaStore] {}/{}: stored tag {}", self.room_id, key, tag);
        Ok(tag)
    }

    /// Clear `key`. Deleting an absent key succeeds.
    pub fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let mut records = self.lock()?;

        let record = ReplicaRecord::cleared(Utc::now());
        self.persist(key, &record)?;
        records.insert(key.to_string(), record);

        log::debug!("[ReplicaStore] {}/{}: cleared", self.room_id, key);
        Ok(())
    }

    /// Keys that currently hold a value, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let records = self.lock()?;
        let mut keys: Vec<String> = records
            .iter()
            .filter(|(_, record)| record.content().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn persist(&self, key: &str, record: &ReplicaRecord) -> Result<()> {
        self.storage
            .save_record(&self.room_id, key, record)
            .map_err(|e| {
                log::error!(
                    "[ReplicaStore] {}/{}: write not acknowledged: {}",
                    self.room_id,
                    key,
                    e
                );
                ReplicaError::Persistence {
                    room: self.room_id.clone(),
                    key: key.to_string(),
                    message: e.to_string(),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStorage, StorageResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn store() -> ReplicaStore {
        ReplicaStore::open("r1", Arc::new(MemoryStorage::new())).unwrap()
    }

    /// Storage that can be switched into a failing state.
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        failing: AtomicBool,
    }

    impl ReplicaStorage for FlakyStorage {
        fn load_room(&self, room: &str) -> StorageResult<HashMap<String, ReplicaRecord>> {
            self.inner.load_room(room)
        }

        fn save_record(&self, room: &str, key: &str, record: &ReplicaRecord) -> StorageResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ReplicaError::Io(std::io::Error::other("disk full")));
            }
            self.inner.save_record(room, key, record)
        }
    }

    #[test]
    fn test_round_trip() {
        let store = store();
        let tag = store.put("left", vec![1, 2, 3]).unwrap();

        let replica = store.get("left").unwrap().unwrap();
        assert_eq!(replica.content, vec![1, 2, 3]);
        assert_eq!(replica.tag, tag);
        assert_eq!(tag, compute_content_hash(&[1, 2, 3]));
    }

    #[test]
    fn test_idempotent_put() {
        let store = store();
        let first = store.put("left", vec![1, 2, 3]).unwrap();
        let modified = store.head("left").unwrap().last_modified;

        let second = store.put("left", vec![1, 2, 3]).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.head("left").unwrap().last_modified, modified);
    }

    #[test]
    fn test_conditional_get_not_modified_after_put() {
        let store = store();
        let tag = store.put("left", vec![1, 2, 3]).unwrap();

        assert_eq!(
            store.conditional_get("left", Some(&tag)).unwrap(),
            ConditionalGet::NotModified { tag: tag.clone() }
        );

        let stale = compute_content_hash(b"older");
        match store.conditional_get("left", Some(&stale)).unwrap() {
            ConditionalGet::Modified(replica) => assert_eq!(replica.tag, tag),
            other => panic!("expected Modified, got {:?}", other),
        }
        assert!(matches!(
            store.conditional_get("left", None).unwrap(),
            ConditionalGet::Modified(_)
        ));
    }

    #[test]
    fn test_delete_clears() {
        let store = store();
        store.put("left", vec![1, 2, 3]).unwrap();

        store.delete("left").unwrap();

        assert!(store.get("left").unwrap().is_none());
        let head = store.head("left").unwrap();
        assert!(head.tag.is_none());
        assert!(head.last_modified.is_some());
        assert_eq!(
            store.conditional_get("left", None).unwrap(),
            ConditionalGet::Absent
        );
    }

    #[test]
    fn test_delete_absent_key_succeeds() {
        let store = store();
        store.delete("right").unwrap();
        assert!(store.get("right").unwrap().is_none());
    }

    #[test]
    fn test_keys_are_independent() {
        let store = store();
        let left = store.put("left", vec![1]).unwrap();
        let right = store.put("right", vec![2]).unwrap();
        store.delete("left").unwrap();

        assert!(store.get("left").unwrap().is_none());
        assert_eq!(store.get("right").unwrap().unwrap().tag, right);
        assert_ne!(left, right);
        assert_eq!(store.keys().unwrap(), vec!["right"]);
    }

    #[test]
    fn test_reload_from_storage() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let store = ReplicaStore::open("r1", storage.clone()).unwrap();
            store.put("left", vec![4, 5]).unwrap();
            store.put("right", vec![6]).unwrap();
            store.delete("right").unwrap();
        }

        let store = ReplicaStore::open("r1", storage).unwrap();
        assert_eq!(store.get("left").unwrap().unwrap().content, vec![4, 5]);
        assert!(store.get("right").unwrap().is_none());
    }

    #[test]
    fn test_failed_persist_is_not_acknowledged() {
        let storage = Arc::new(FlakyStorage::default());
        let store = ReplicaStore::open("r1", storage.clone()).unwrap();
        let tag = store.put("left", vec![1]).unwrap();

        storage.failing.store(true, Ordering::SeqCst);
        let err = store.put("left", vec![2]).unwrap_err();
        assert!(matches!(err, ReplicaError::Persistence { .. }));
        assert!(err.is_retryable());
        assert!(store.delete("left").is_err());

        // State still reflects the last acknowledged write
        assert_eq!(store.get("left").unwrap().unwrap().tag, tag);
    }

    #[test]
    fn test_invalid_key_rejected() {
        let store = store();
        let err = store.put("", vec![1]).unwrap_err();
        assert!(matches!(err, ReplicaError::InvalidKey(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_concurrent_puts_same_key_stay_consistent() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0u8..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.put("left", vec![i; 16]).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let replica = store.get("left").unwrap().unwrap();
        assert_eq!(replica.tag, compute_content_hash(&replica.content));
    }
}
