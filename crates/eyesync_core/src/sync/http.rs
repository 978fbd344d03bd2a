//! HTTP transport speaking the `/replica` protocol.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use url::Url;

use super::SyncError;
use super::transport::{BoxFuture, RemoteHead, ReplicaTransport};
use crate::hash::VersionTag;
use crate::replica::{ConditionalGet, REPLICA_PATH, Replica, VERSION_TAG_HEADER};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport that talks to an eyesync server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    room: String,
}

impl HttpTransport {
    /// Create a transport for `room` on the server at `server_url`
    /// (e.g. `http://localhost:3040`).
    pub fn new(server_url: &str, room: impl Into<String>) -> Result<Self, SyncError> {
        Self::with_timeout(server_url, room, DEFAULT_TIMEOUT)
    }

    /// Like [`new`](Self::new) with an explicit per-request timeout.
    pub fn with_timeout(
        server_url: &str,
        room: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let endpoint = Url::parse(server_url)?.join(REPLICA_PATH)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            room: room.into(),
        })
    }

    /// The room this transport addresses.
    pub fn room(&self) -> &str {
        &self.room
    }

    fn url(&self, key: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("room", &self.room)
            .append_pair("key", key);
        url
    }

    fn version_tag(headers: &HeaderMap) -> Result<VersionTag, SyncError> {
        headers
            .get(VERSION_TAG_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(VersionTag::parse)
            .ok_or_else(|| SyncError::Protocol(format!("missing {} header", VERSION_TAG_HEADER)))
    }

    fn last_modified(headers: &HeaderMap) -> DateTime<Utc> {
        headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now)
    }
}

impl ReplicaTransport for HttpTransport {
    fn head<'a>(
        &'a self,
        key: &'a str,
        if_none_match: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, Result<RemoteHead, SyncError>> {
        Box::pin(async move {
            let mut request = self.client.head(self.url(key));
            if let Some(tag) = if_none_match {
                request = request.header(IF_NONE_MATCH, tag.to_etag());
            }
            let response = request.send().await?;
            match response.status() {
                StatusCode::NOT_MODIFIED => Ok(RemoteHead::NotModified),
                StatusCode::NO_CONTENT => Ok(RemoteHead::Absent),
                StatusCode::OK => Ok(RemoteHead::Tag(Self::version_tag(response.headers())?)),
                status => Err(SyncError::Server(status.as_u16())),
            }
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
        if_none_match: Option<&'a VersionTag>,
    ) -> BoxFuture<'a, Result<ConditionalGet, SyncError>> {
        Box::pin(async move {
            let mut request = self.client.get(self.url(key));
            if let Some(tag) = if_none_match {
                request = request.header(IF_NONE_MATCH, tag.to_etag());
            }
            let response = request.send().await?;
            match response.status() {
                StatusCode::NOT_MODIFIED => {
                    let tag = Self::version_tag(response.headers())
                        .ok()
                        .or_else(|| if_none_match.cloned())
                        .ok_or_else(|| SyncError::Protocol("304 without a tag".to_string()))?;
                    Ok(ConditionalGet::NotModified { tag })
                }
                StatusCode::NO_CONTENT => Ok(ConditionalGet::Absent),
                StatusCode::OK => {
                    let tag = Self::version_tag(response.headers())?;
                    let last_modified = Self::last_modified(response.headers());
                    let content = response.bytes().await?.to_vec();
                    Ok(ConditionalGet::Modified(Replica {
                        content,
                        tag,
                        last_modified,
                    }))
                }
                status => Err(SyncError::Server(status.as_u16())),
            }
        })
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, Result<VersionTag, SyncError>> {
        Box::pin(async move {
            let response = self.client.put(self.url(key)).body(bytes).send().await?;
            match response.status() {
                StatusCode::NO_CONTENT | StatusCode::OK => Self::version_tag(response.headers()),
                status => Err(SyncError::Server(status.as_u16())),
            }
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(async move {
            let response = self.client.delete(self.url(key)).send().await?;
            match response.status() {
                StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
                status => Err(SyncError::Server(status.as_u16())),
            }
        })
    }
}
