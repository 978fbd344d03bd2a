//! In-process transport over a [`ReplicaStore`].

use std::sync::Arc;

use super::SyncError;
use super::transport::{BoxFuture, RemoteHead, ReplicaTransport};
use crate::hash::VersionTag;
use crate::replica::ConditionalGet;
use crate::store::ReplicaStore;

/// Transport that calls a [`ReplicaStore`] in the same process.
///
/// Used when the editor and the store share a process (single-user desktop
/// builds) and in tests.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    store: Arc<ReplicaStore>,
}

impl LocalTransport {
    /// Create a transport bound to `store`'s room.
    pub fn new(store: Arc<ReplicaStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<ReplicaStore> {
        &self.store
    }
}

impl ReplicaTransport for LocalTransport {
    fn head<'a>(
        &'a self,
        key: &'a str,
        if_none_match: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, Result<RemoteHead, SyncError>> {
        Box::pin(async move {
            let head = self.store.head(key)?;
            Ok(match head.tag {
                None => RemoteHead::Absent,
                Some(tag) if if_none_match == Some(&tag) => RemoteHead::NotModified,
                Some(tag) => RemoteHead::Tag(tag),
            })
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
        if_none_match: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, Result<ConditionalGet, SyncError>> {
        Box::pin(async move { Ok(self.store.conditional_get(key, if_none_match)?) })
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, Result<VersionTag, SyncError>> {
        Box::pin(async move { Ok(self.store.put(key, bytes)?) })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(async move { Ok(self.store.delete(key)?) })
    }
}
