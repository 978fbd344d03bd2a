//! Transport abstraction between the sync client and a replica store.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::SyncError;
use crate::hash::VersionTag;
use crate::replica::ConditionalGet;

/// Boxed future returned by transport methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Answer to a conditional HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteHead {
    /// The caller's tag is current.
    NotModified,
    /// The key holds no value.
    Absent,
    /// The key holds a value with this tag.
    Tag(VersionTag),
}

/// Trait for reaching the store that owns a room.
///
/// A transport is bound to one room; keys are passed per call. Methods must
/// not retry internally: the client decides when to try again.
pub trait ReplicaTransport: Send + Sync {
    /// Fetch only the current tag, answering `NotModified` when it equals
    /// `if_none_match`.
    fn head<'a>(
        &'a self,
        key: &'a str,
        if_none_match: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, Result<RemoteHead, SyncError>>;

    /// Fetch content unless the caller already holds the current tag.
    fn get<'a>(
        &'a self,
        key: &'a str,
        if_none_match: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, Result<ConditionalGet, SyncError>>;

    /// Store content and return the store's canonical tag.
    fn put<'a>(
        &'a self,
        key: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, Result<VersionTag, SyncError>>;

    /// Clear the key.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), SyncError>>;
}

impl<T: ReplicaTransport + ?Sized> ReplicaTransport for Arc<T> {
    fn head<'a>(
        &'a self,
        key: &'a str,
        if_none_match: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, Result<RemoteHead, SyncError>> {
        (**self).head(key, if_none_match)
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
        if_none_match: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, Result<ConditionalGet, SyncError>> {
        (**self).get(key, if_none_match)
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, Result<VersionTag, SyncError>> {
        (**self).put(key, bytes)
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), SyncError>> {
        (**self).delete(key)
    }
}
