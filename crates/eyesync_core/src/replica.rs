//! Replica data model.
//!
//! A [`ReplicaRecord`] is the persisted state of one key in one room. It is
//! only constructible through [`ReplicaRecord::stored`] and
//! [`ReplicaRecord::cleared`], so a record always carries a tag exactly when it
//! carries content, and that tag is always the hash of the content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReplicaError, Result};
use crate::hash::{VersionTag, compute_content_hash};

/// Path of the replica endpoint.
pub const REPLICA_PATH: &str = "/replica";

/// Response header carrying the canonical [`VersionTag`].
pub const VERSION_TAG_HEADER: &str = "version-tag";

/// Maximum length of a replica key in bytes.
pub const MAX_KEY_LEN: usize = 256;

/// Validate a replica key.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN || key.chars().any(char::is_control) {
        return Err(ReplicaError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Persisted state of a single key.
///
/// Deserialization goes through [`ReplicaRecord::restore`], so a record with a
/// tag that does not match its content is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRecord")]
pub struct ReplicaRecord {
    content: Option<Vec<u8>>,
    tag: Option<VersionTag>,
    last_modified: DateTime<Utc>,
}

/// Unchecked wire form of a [`ReplicaRecord`].
#[derive(Deserialize)]
struct RawRecord {
    content: Option<Vec<u8>>,
    tag: Option<VersionTag>,
    last_modified: DateTime<Utc>,
}

impl TryFrom<RawRecord> for ReplicaRecord {
    type Error = String;

    fn try_from(raw: RawRecord) -> std::result::Result<Self, Self::Error> {
        Self::restore(raw.content, raw.tag, raw.last_modified)
            .ok_or_else(|| "version tag does not match content".to_string())
    }
}

impl ReplicaRecord {
    /// A record holding `content`, tagged with its hash.
    pub fn stored(content: Vec<u8>, now: DateTime<Utc>) -> Self {
        let tag = compute_content_hash(&content);
        Self {
            content: Some(content),
            tag: Some(tag),
            last_modified: now,
        }
    }

    /// A record whose content was deleted at `now`.
    pub fn cleared(now: DateTime<Utc>) -> Self {
        Self {
            content: None,
            tag: None,
            last_modified: now,
        }
    }

    /// Rebuild a record read back from storage, verifying its tag.
    ///
    /// Returns `None` when the tag does not agree with the content.
    pub fn restore(
        content: Option<Vec<u8>>,
        tag: Option<VersionTag>,
        last_modified: DateTime<Utc>,
    ) -> Option<Self> {
        match (&content, &tag) {
            (None, None) => {}
            (Some(bytes), Some(tag)) if &compute_content_hash(bytes) == tag => {}
            _ => return None,
        }
        Some(Self {
            content,
            tag,
            last_modified,
        })
    }

    /// Stored bytes, if any.
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Version tag, present iff content is present.
    pub fn tag(&self) -> Option<&VersionTag> {
        self.tag.as_ref()
    }

    /// When the content last changed (including deletion).
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// The present-value view of this record.
    pub fn to_replica(&self) -> Option<Replica> {
        match (&self.content, &self.tag) {
            (Some(content), Some(tag)) => Some(Replica {
                content: content.clone(),
                tag: tag.clone(),
                last_modified: self.last_modified,
            }),
            _ => None,
        }
    }
}

/// A present replica value as returned by reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    /// Stored bytes
    pub content: Vec<u8>,
    /// Canonical tag of `content`
    pub tag: VersionTag,
    /// When the content last changed
    pub last_modified: DateTime<Utc>,
}

/// Metadata-only view used for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    /// Current tag, `None` when the key is absent
    pub tag: Option<VersionTag>,
    /// Last modification time, `None` when the key was never written
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of a conditional read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalGet {
    /// The caller's tag is current; no content transferred.
    NotModified {
        /// The current tag (equal to the caller's)
        tag: VersionTag,
    },
    /// The caller's tag is stale or missing.
    Modified(Replica),
    /// The key holds no value.
    Absent,
}
