//! Content hashing shared by the store and the sync client.
//!
//! The store computes the canonical [`VersionTag`] for every write, and the
//! client re-hashes its local bytes to decide whether a push is needed. Both
//! sides must go through [`compute_content_hash`] or clients will resend
//! unchanged content forever.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque version tag of a replica's content (lowercase hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(String);

impl VersionTag {
    /// Wrap a tag received from a peer (e.g. a `Version-Tag` header).
    ///
    /// Surrounding quotes and a weak `W/` prefix are stripped so tags copied
    /// out of `ETag` headers compare equal to bare ones.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
        let trimmed = trimmed.trim_matches('"');
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tag formatted as a strong HTTP entity tag (`"..."`).
    pub fn to_etag(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VersionTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the SHA-256 version tag of content.
pub fn compute_content_hash(content: &[u8]) -> VersionTag {
    let digest = Sha256::digest(content);
    VersionTag(format!("{:x}", digest))
}

/// Check an `If-None-Match` header value against the current tag.
///
/// Handles `*`, comma separated lists, quoted and weak tags.
pub fn tag_matches(if_none_match: &str, current: &VersionTag) -> bool {
    if_none_match.split(',').any(|candidate| {
        let candidate = candidate.trim();
        if candidate == "*" {
            return true;
        }
        VersionTag::parse(candidate).is_some_and(|tag| &tag == current)
    })
}
