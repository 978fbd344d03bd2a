//! Debounced push / polling pull state machine.
//!
//! Each key is either idle or has one armed push timer. Local changes re-arm
//! the timer (cancel and restart), so a burst of edits produces a single push
//! carrying the bytes as of the last edit. Independently, one poll loop per
//! key asks the store for its tag and pulls content when it differs from the
//! cached one.
//!
//! All network calls for a key go through that key's async mutex, so a push
//! or pull in flight always finishes before the next one for the same key
//! starts. Different keys never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::source::ContentSource;
use super::transport::{RemoteHead, ReplicaTransport};
use super::{PollOutcome, PushOutcome, SyncConfig, SyncError};
use crate::hash::{VersionTag, compute_content_hash};
use crate::replica::ConditionalGet;

/// An armed debounce timer.
struct PendingPush {
    id: u64,
    handle: JoinHandle<()>,
}

/// Session-scoped cache entry for one key.
#[derive(Default)]
struct KeyState {
    last_known_tag: Option<VersionTag>,
    /// Bumped whenever `last_known_tag` changes; used to drop stale pulls.
    generation: u64,
    pending: Option<PendingPush>,
    next_timer_id: u64,
    io: Arc<tokio::sync::Mutex<()>>,
}

/// Snapshot of one key's sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    /// Replica key
    pub key: String,
    /// Most recent tag observed on the store
    pub last_known_tag: Option<VersionTag>,
    /// Whether a debounced push is armed
    pub push_pending: bool,
}

/// Keeps a [`ContentSource`] in sync with one room through a [`ReplicaTransport`].
///
/// Construct with [`SyncClient::new`], which returns an `Arc` because timers
/// and poll loops run as tokio tasks that refer back to the client. Methods
/// that spawn tasks must be called from within a tokio runtime.
pub struct SyncClient<T, S> {
    transport: T,
    source: S,
    config: SyncConfig,
    keys: Mutex<HashMap<String, KeyState>>,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T, S> SyncClient<T, S>
where
    T: ReplicaTransport + 'static,
    S: ContentSource + 'static,
{
    /// Create a client. The tag cache starts empty.
    pub fn new(transport: T, source: S, config: SyncConfig) -> Arc<Self> {
        Arc::new(Self {
            transport,
            source,
            config,
            keys: Mutex::new(HashMap::new()),
            pollers: Mutex::new(Vec::new()),
        })
    }

    /// The timing policy.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The content source.
    pub fn source(&self) -> &S {
        &self.source
    }

    fn keys(&self) -> MutexGuard<'_, HashMap<String, KeyState>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pollers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pollers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last tag this client observed for `key`.
    pub fn last_known_tag(&self, key: &str) -> Option<VersionTag> {
        self.keys().get(key).and_then(|s| s.last_known_tag.clone())
    }

    /// Whether a debounced push is armed for `key`.
    pub fn is_push_pending(&self, key: &str) -> bool {
        self.keys().get(key).is_some_and(|s| s.pending.is_some())
    }

    /// State of every key this client has touched, sorted by key.
    pub fn status(&self) -> Vec<KeyStatus> {
        let keys = self.keys();
        let mut status: Vec<KeyStatus> = keys
            .iter()
            .map(|(key, state)| KeyStatus {
                key: key.clone(),
                last_known_tag: state.last_known_tag.clone(),
                push_pending: state.pending.is_some(),
            })
            .collect();
        status.sort_by(|a, b| a.key.cmp(&b.key));
        status
    }

    /// Forget the cached tag of `key`, forcing a full pull on the next poll.
    ///
    /// Responses already in flight for the key are discarded as stale.
    pub fn invalidate(&self, key: &str) {
        self.observe(key, None);
    }

    fn io_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.keys().entry(key.to_string()).or_default().io.clone()
    }

    fn snapshot(&self, key: &str) -> (Option<VersionTag>, u64) {
        let mut keys = self.keys();
        let state = keys.entry(key.to_string()).or_default();
        (state.last_known_tag.clone(), state.generation)
    }

    fn observe(&self, key: &str, tag: Option<VersionTag>) {
        let mut keys = self.keys();
        let state = keys.entry(key.to_string()).or_default();
        state.last_known_tag = tag;
        state.generation += 1;
    }

    /// Record `tag` only if nothing was observed since `generation`.
    fn observe_if_current(&self, key: &str, generation: u64, tag: Option<VersionTag>) -> bool {
        let mut keys = self.keys();
        let state = keys.entry(key.to_string()).or_default();
        if state.generation != generation {
            return false;
        }
        state.last_known_tag = tag;
        state.generation += 1;
        true
    }

    /// Tell the client that the producer changed `key`.
    ///
    /// Does nothing unless the source reports the key dirty. Otherwise arms the
    /// debounce timer, cancelling any timer that has not fired yet.
    pub fn notify_local_change(self: &Arc<Self>, key: &str) {
        if !self.source.is_dirty(key) {
            return;
        }
        self.schedule_push(key, self.config.debounce);
    }

    fn schedule_push(self: &Arc<Self>, key: &str, delay: Duration) {
        let mut keys = self.keys();
        let state = keys.entry(key.to_string()).or_default();
        if let Some(previous) = state.pending.take() {
            previous.handle.abort();
        }
        state.next_timer_id += 1;
        let id = state.next_timer_id;

        let client = Arc::clone(self);
        let key_owned = key.to_string();
        // The keys lock is held until `pending` is set, so the task cannot
        // disarm itself before it is registered.
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !client.disarm(&key_owned, id) {
                return;
            }
            if let Err(e) = client.flush(&key_owned).await {
                log::debug!("[SyncClient] {}: scheduled push failed: {}", key_owned, e);
            }
        });
        state.pending = Some(PendingPush { id, handle });
    }

    /// Clear the pending timer if it is still timer `id`.
    ///
    /// Once cleared, the timer can no longer be cancelled, so a push that has
    /// started always runs to completion.
    fn disarm(&self, key: &str, id: u64) -> bool {
        let mut keys = self.keys();
        match keys.get_mut(key) {
            Some(state) if state.pending.as_ref().is_some_and(|p| p.id == id) => {
                state.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Push `key` now if it is dirty.
    ///
    /// Called by the debounce timer; can also be called directly to force a
    /// push. On failure the key stays dirty.
    pub async fn flush(self: &Arc<Self>, key: &str) -> Result<PushOutcome, SyncError> {
        let io = self.io_lock(key);
        let _in_flight = io.lock().await;

        if !self.source.is_dirty(key) {
            return Ok(PushOutcome::Clean);
        }

        let bytes = self.source.read_bytes(key);
        let local_tag = compute_content_hash(&bytes);
        if self.last_known_tag(key).as_ref() == Some(&local_tag) {
            log::debug!(
                "[SyncClient] {}: content matches {}, skipping push",
                key,
                local_tag
            );
            if !self.source.mark_clean(key, &local_tag) {
                log::debug!("[SyncClient] {}: edited while checking, rescheduling", key);
                self.schedule_push(key, self.config.debounce);
            }
            return Ok(PushOutcome::Unchanged);
        }

        let tag = match self.transport.put(key, bytes).await {
            Ok(tag) => tag,
            Err(e) => {
                log::warn!("[SyncClient] {}: push failed, key stays dirty: {}", key, e);
                if let Some(delay) = self.config.retry_failed_push
                    && e.is_transient()
                {
                    self.schedule_push(key, delay);
                }
                return Err(e);
            }
        };
        if tag != local_tag {
            log::warn!(
                "[SyncClient] {}: store tag {} differs from local hash {}",
                key,
                tag,
                local_tag
            );
        }
        self.observe(key, Some(tag.clone()));

        // Cleared only if the bytes still hash to what was sent
        if self.source.mark_clean(key, &local_tag) {
            log::debug!("[SyncClient] {}: pushed {}", key, tag);
            Ok(PushOutcome::Pushed { tag })
        } else {
            log::debug!("[SyncClient] {}: edited during push, rescheduling", key);
            self.schedule_push(key, self.config.debounce);
            Ok(PushOutcome::Superseded { tag })
        }
    }

    /// Check the store once for a change to `key` and pull it.
    ///
    /// Pulls are not suppressed by a pending push; the source decides whether
    /// to apply them over unsent edits.
    pub async fn poll_once(&self, key: &str) -> Result<PollOutcome, SyncError> {
        let io = self.io_lock(key);
        let _in_flight = io.lock().await;

        let (cached, generation) = self.snapshot(key);
        let remote = match self.transport.head(key, cached.as_ref()).await? {
            RemoteHead::NotModified => return Ok(PollOutcome::Unchanged),
            RemoteHead::Absent => return Ok(self.apply_cleared(key, cached.as_ref(), generation)),
            RemoteHead::Tag(tag) if cached.as_ref() == Some(&tag) => {
                return Ok(PollOutcome::Unchanged);
            }
            RemoteHead::Tag(tag) => tag,
        };
        log::debug!(
            "[SyncClient] {}: remote tag {} differs from {:?}, pulling",
            key,
            remote,
            cached
        );

        match self.transport.get(key, cached.as_ref()).await? {
            ConditionalGet::NotModified { .. } => Ok(PollOutcome::Unchanged),
            ConditionalGet::Absent => Ok(self.apply_cleared(key, cached.as_ref(), generation)),
            ConditionalGet::Modified(replica) => {
                if !self.observe_if_current(key, generation, Some(replica.tag.clone())) {
                    log::debug!("[SyncClient] {}: dropping stale pull {}", key, replica.tag);
                    return Ok(PollOutcome::Stale);
                }
                self.source.apply_remote(key, Some(replica.content));
                Ok(PollOutcome::Pulled { tag: replica.tag })
            }
        }
    }

    fn apply_cleared(
        &self,
        key: &str,
        cached: Option<&VersionTag>,
        generation: u64,
    ) -> PollOutcome {
        if cached.is_none() {
            return PollOutcome::Unchanged;
        }
        if !self.observe_if_current(key, generation, None) {
            return PollOutcome::Stale;
        }
        self.source.apply_remote(key, None);
        PollOutcome::Cleared
    }

    /// Delete `key` on the store.
    ///
    /// The cached tag is reset whether or not the delete succeeds; failed
    /// deletes are not retried.
    pub async fn clear_remote(&self, key: &str) -> Result<(), SyncError> {
        let io = self.io_lock(key);
        let _in_flight = io.lock().await;

        let result = self.transport.delete(key).await;
        self.observe(key, None);
        if let Err(e) = &result {
            log::warn!("[SyncClient] {}: remote clear failed: {}", key, e);
        }
        result
    }

    /// Start one poll loop per key.
    ///
    /// Loops hold only a weak reference and end when the client is dropped
    /// or [`shutdown`](Self::shutdown) is called.
    pub fn start<I, K>(self: &Arc<Self>, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let period = self.config.poll_interval;
        let mut pollers = self.pollers();
        for key in keys {
            let key: String = key.into();
            let client = Arc::downgrade(self);
            log::info!("[SyncClient] Polling '{}' every {:?}", key, period);
            pollers.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    let Some(client) = client.upgrade() else {
                        break;
                    };
                    match client.poll_once(&key).await {
                        Ok(PollOutcome::Unchanged) => {}
                        Ok(outcome) => log::debug!("[SyncClient] {}: poll {:?}", key, outcome),
                        Err(e) => log::debug!("[SyncClient] {}: poll failed: {}", key, e),
                    }
                }
            }));
        }
    }

    /// Stop all poll loops and cancel pending push timers.
    ///
    /// Pushes already in flight are not cancelled. Dirty keys stay dirty.
    pub fn shutdown(&self) {
        for poller in self.pollers().drain(..) {
            poller.abort();
        }
        for state in self.keys().values_mut() {
            if let Some(pending) = state.pending.take() {
                pending.handle.abort();
            }
        }
    }
}

impl<T, S> Drop for SyncClient<T, S> {
    fn drop(&mut self) {
        let pollers = self.pollers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for poller in pollers.drain(..) {
            poller.abort();
        }
    }
}
