use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode},
};
use eyesync_core::store::StorageResult;
use eyesync_core::{ReplicaError, ReplicaRecord, ReplicaStorage, compute_content_hash};
use eyesync_server::{Config, RoomRouter, app};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::util::ServiceExt;

fn setup() -> (Router, Arc<RoomRouter>) {
    let config = Config {
        max_body_bytes: 1024,
        ..Config::default()
    };
    let rooms = Arc::new(RoomRouter::in_memory());
    (app(&config, rooms.clone()), rooms)
}

fn request(method: &str, uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body))
        .expect("request")
}

fn conditional(method: &str, uri: &str, if_none_match: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("if-none-match", if_none_match)
        .body(Body::empty())
        .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("response")
}

fn version_tag(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("version-tag")
        .map(|v| v.to_str().expect("ascii tag").to_string())
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec()
}

#[tokio::test]
async fn put_head_delete_scenario() {
    let (app, _rooms) = setup();
    let uri = "/replica?room=r1&key=left";
    let t1 = compute_content_hash(&[1, 2, 3]).to_string();

    let response = send(&app, request("PUT", uri, vec![1, 2, 3])).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(version_tag(&response).as_deref(), Some(t1.as_str()));

    let response = send(&app, conditional("HEAD", uri, &t1)).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    let response = send(&app, request("PUT", uri, vec![1, 2, 3])).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(version_tag(&response).as_deref(), Some(t1.as_str()));

    let response = send(&app, request("DELETE", uri, vec![])).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, request("GET", uri, vec![])).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(response).await.is_empty());

    let response = send(&app, request("PUT", uri, vec![9, 9])).await;
    let t2 = version_tag(&response).expect("tag");
    assert_eq!(t2, compute_content_hash(&[9, 9]).to_string());
    assert_ne!(t2, t1);
}

#[tokio::test]
async fn get_returns_bytes_and_headers() {
    let (app, _rooms) = setup();
    let uri = "/replica?room=r1&key=left";
    send(&app, request("PUT", uri, vec![4, 5, 6])).await;

    let response = send(&app, request("GET", uri, vec![])).await;
    assert_eq!(response.status(), StatusCode::OK);

    let tag = compute_content_hash(&[4, 5, 6]);
    assert_eq!(version_tag(&response), Some(tag.to_string()));
    assert_eq!(
        response.headers().get("etag").and_then(|v| v.to_str().ok()),
        Some(tag.to_etag().as_str())
    );
    let last_modified = response
        .headers()
        .get("last-modified")
        .and_then(|v| v.to_str().ok())
        .expect("last-modified");
    assert!(last_modified.ends_with(" GMT"));

    assert_eq!(body_bytes(response).await, vec![4, 5, 6]);
}

#[tokio::test]
async fn get_with_current_etag_is_not_modified() {
    let (app, _rooms) = setup();
    let uri = "/replica?room=r1&key=left";
    send(&app, request("PUT", uri, vec![1])).await;
    let tag = compute_content_hash(&[1]);

    let response = send(&app, conditional("GET", uri, &tag.to_etag())).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body_bytes(response).await.is_empty());

    let response = send(&app, conditional("GET", uri, "\"stale\"")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn head_reports_tag_without_body() {
    let (app, _rooms) = setup();
    let uri = "/replica?room=r1&key=right";

    let response = send(&app, request("HEAD", uri, vec![])).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(version_tag(&response).is_none());

    send(&app, request("PUT", uri, vec![2, 2])).await;
    let response = send(&app, request("HEAD", uri, vec![])).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        version_tag(&response),
        Some(compute_content_hash(&[2, 2]).to_string())
    );
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn rooms_and_keys_are_isolated() {
    let (app, rooms) = setup();
    send(&app, request("PUT", "/replica?room=r1&key=left", vec![1])).await;

    for uri in ["/replica?room=r2&key=left", "/replica?room=r1&key=right"] {
        let response = send(&app, request("GET", uri, vec![])).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT, "{}", uri);
    }
    assert_eq!(rooms.stats().await.active_rooms, 2);
}

#[tokio::test]
async fn missing_room_and_key_use_defaults() {
    let (app, rooms) = setup();
    let response = send(&app, request("PUT", "/replica", vec![3])).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let store = rooms.get("default").await.expect("default room");
    assert_eq!(store.get("left").unwrap().unwrap().content, vec![3]);
}

#[tokio::test]
async fn delete_of_absent_key_succeeds() {
    let (app, _rooms) = setup();
    let response = send(&app, request("DELETE", "/replica?room=r1&key=never", vec![])).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unsupported_method_is_rejected() {
    let (app, _rooms) = setup();
    let response = send(&app, request("POST", "/replica?room=r1&key=left", vec![1])).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn invalid_room_is_bad_request() {
    let (app, rooms) = setup();
    let response = send(&app, request("GET", "/replica?room=..%2Fetc&key=left", vec![])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = serde_json::from_slice(&body_bytes(response).await).expect("json");
    assert_eq!(body["kind"], "InvalidRoom");
    assert_eq!(rooms.stats().await.active_rooms, 0);
}

#[tokio::test]
async fn empty_key_is_bad_request() {
    let (app, _rooms) = setup();
    let response = send(&app, request("PUT", "/replica?room=r1&key=", vec![1])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(version_tag(&response).is_none());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (app, rooms) = setup();
    let response = send(&app, request("PUT", "/replica?room=r1&key=left", vec![0; 2048])).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let store = rooms.resolve("r1").await.unwrap();
    assert!(store.get("left").unwrap().is_none());
}

#[tokio::test]
async fn status_reports_active_rooms() {
    let (app, _rooms) = setup();
    send(&app, request("PUT", "/replica?room=r1&key=left", vec![1])).await;

    let response = send(&app, request("GET", "/api/status", vec![])).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_slice(&body_bytes(response).await).expect("json");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_rooms"], 1);
}

#[tokio::test]
async fn health_check() {
    let (app, _rooms) = setup();
    let response = send(&app, request("GET", "/health", vec![])).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"OK".to_vec());
}

/// Storage that loads empty rooms and refuses every write.
struct ReadOnlyStorage;

impl ReplicaStorage for ReadOnlyStorage {
    fn load_room(&self, _room: &str) -> StorageResult<HashMap<String, ReplicaRecord>> {
        Ok(HashMap::new())
    }

    fn save_record(&self, _room: &str, _key: &str, _record: &ReplicaRecord) -> StorageResult<()> {
        Err(ReplicaError::Io(std::io::Error::other("read-only")))
    }
}

#[tokio::test]
async fn unpersisted_write_is_unavailable() {
    let rooms = Arc::new(RoomRouter::with_storage(Arc::new(ReadOnlyStorage)));
    let app = app(&Config::default(), rooms.clone());
    let uri = "/replica?room=r1&key=left";

    let response = send(&app, request("PUT", uri, vec![1, 2, 3])).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(version_tag(&response).is_none());

    let response = send(&app, request("DELETE", uri, vec![])).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Nothing acknowledged, nothing visible
    let response = send(&app, request("GET", uri, vec![])).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
