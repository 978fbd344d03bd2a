//! `/replica` handlers.
//!
//! `room` and `key` come from the query string and fall back to the
//! configured defaults. Every response for a present value carries
//! `Version-Tag`, `ETag` and `Last-Modified`.

use crate::handlers::error::{ApiError, ApiResult};
use crate::rooms::RoomRouter;
use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_TYPE, ETAG, IF_NONE_MATCH, LAST_MODIFIED},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use eyesync_core::hash::tag_matches;
use eyesync_core::replica::{REPLICA_PATH, VERSION_TAG_HEADER};
use eyesync_core::{ReplicaStore, VersionTag};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Shared state for replica handlers
#[derive(Clone)]
pub struct ReplicaState {
    pub rooms: Arc<RoomRouter>,
    pub default_room: String,
    pub default_key: String,
}

/// Query parameters addressing one replica
#[derive(Debug, Deserialize)]
pub struct ReplicaQuery {
    pub room: Option<String>,
    pub key: Option<String>,
}

impl ReplicaState {
    async fn resolve(&self, query: ReplicaQuery) -> ApiResult<(Arc<ReplicaStore>, String)> {
        let room = query.room.unwrap_or_else(|| self.default_room.clone());
        let key = query.key.unwrap_or_else(|| self.default_key.clone());
        let store = self.rooms.resolve(&room).await?;
        Ok((store, key))
    }
}

/// Create replica routes. Bodies above `max_body_bytes` are rejected with 413.
pub fn replica_routes(state: ReplicaState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(
            REPLICA_PATH,
            get(get_replica)
                .head(head_replica)
                .put(put_replica)
                .delete(delete_replica),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Format a timestamp as an HTTP date (IMF-fixdate).
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn header_value(value: String) -> ApiResult<HeaderValue> {
    HeaderValue::try_from(value).map_err(ApiError::internal)
}

fn version_headers(tag: &VersionTag, last_modified: Option<DateTime<Utc>>) -> ApiResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(VERSION_TAG_HEADER, header_value(tag.to_string())?);
    headers.insert(ETAG, header_value(tag.to_etag())?);
    if let Some(time) = last_modified {
        headers.insert(LAST_MODIFIED, header_value(http_date(time))?);
    }
    Ok(headers)
}

fn not_modified(request: &HeaderMap, tag: &VersionTag) -> bool {
    request
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| tag_matches(v, tag))
}

/// GET /replica - Current bytes, 304 if unchanged, 204 if absent
async fn get_replica(
    State(state): State<ReplicaState>,
    Query(query): Query<ReplicaQuery>,
    request: HeaderMap,
) -> ApiResult<Response> {
    let (store, key) = state.resolve(query).await?;

    let Some(replica) = store.get(&key)? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let headers = version_headers(&replica.tag, Some(replica.last_modified))?;
    if not_modified(&request, &replica.tag) {
        return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
    }

    Ok((
        StatusCode::OK,
        headers,
        [(CONTENT_TYPE, "application/octet-stream")],
        replica.content,
    )
        .into_response())
}

/// HEAD /replica - Tag headers only, 304 if unchanged, 204 if absent
async fn head_replica(
    State(state): State<ReplicaState>,
    Query(query): Query<ReplicaQuery>,
    request: HeaderMap,
) -> ApiResult<Response> {
    let (store, key) = state.resolve(query).await?;
    let head = store.head(&key)?;

    let Some(tag) = head.tag else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let headers = version_headers(&tag, head.last_modified)?;
    if not_modified(&request, &tag) {
        return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
    }
    Ok((StatusCode::OK, headers).into_response())
}

/// PUT /replica - Store the body, 204 with the new tag once durable
async fn put_replica(
    State(state): State<ReplicaState>,
    Query(query): Query<ReplicaQuery>,
    body: Bytes,
) -> ApiResult<Response> {
    let (store, key) = state.resolve(query).await?;
    let len = body.len();

    let tag = {
        let key = key.clone();
        tokio::task::spawn_blocking(move || store.put(&key, body.to_vec())).await??
    };

    debug!("PUT {} ({} bytes) -> {}", key, len, tag);
    let headers = version_headers(&tag, None)?;
    Ok((StatusCode::NO_CONTENT, headers).into_response())
}

/// DELETE /replica - Clear the key, 204 even if it was absent
async fn delete_replica(
    State(state): State<ReplicaState>,
    Query(query): Query<ReplicaQuery>,
) -> ApiResult<StatusCode> {
    let (store, key) = state.resolve(query).await?;

    {
        let key = key.clone();
        tokio::task::spawn_blocking(move || store.delete(&key)).await??;
    }

    debug!("DELETE {}", key);
    Ok(StatusCode::NO_CONTENT)
}
