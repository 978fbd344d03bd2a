//! Sync clients talking to a live server over HTTP.

use eyesync_core::compute_content_hash;
use eyesync_core::sync::{
    ContentSource, HttpTransport, MemorySource, PollOutcome, PushOutcome, SyncClient, SyncConfig,
};
use eyesync_server::{Config, RoomRouter, app};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

type Client = Arc<SyncClient<HttpTransport, Arc<MemorySource>>>;

async fn spawn_server(dir: &TempDir) -> String {
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    let rooms = Arc::new(RoomRouter::from_config(&config));
    let app = app(&config, rooms);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}", addr)
}

fn client(url: &str, room: &str) -> (Client, Arc<MemorySource>) {
    let source = Arc::new(MemorySource::new());
    let transport = HttpTransport::new(url, room).expect("transport");
    let config = SyncConfig {
        debounce: Duration::from_millis(50),
        poll_interval: Duration::from_millis(50),
        retry_failed_push: None,
    };
    (SyncClient::new(transport, source.clone(), config), source)
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met within 5s");
}

#[tokio::test]
async fn push_then_pull_between_clients() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_server(&dir).await;
    let (writer, writer_source) = client(&url, "r1");
    let (reader, reader_source) = client(&url, "r1");

    writer_source.edit("left", vec![1, 2, 3]);
    let outcome = writer.flush("left").await.unwrap();
    let t1 = compute_content_hash(&[1, 2, 3]);
    assert_eq!(outcome, PushOutcome::Pushed { tag: t1.clone() });
    assert!(!writer_source.is_dirty("left"));

    let outcome = reader.poll_once("left").await.unwrap();
    assert_eq!(outcome, PollOutcome::Pulled { tag: t1.clone() });
    assert_eq!(reader_source.local("left"), Some(vec![1, 2, 3]));

    // Conditional HEAD answers 304
    assert_eq!(reader.poll_once("left").await.unwrap(), PollOutcome::Unchanged);

    writer.clear_remote("left").await.unwrap();
    assert_eq!(reader.poll_once("left").await.unwrap(), PollOutcome::Cleared);
    assert_eq!(reader_source.local("left"), None);
    assert_eq!(reader.last_known_tag("left"), None);
}

#[tokio::test]
async fn debounced_push_reaches_polling_reader() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_server(&dir).await;
    let (writer, writer_source) = client(&url, "r1");
    let (reader, reader_source) = client(&url, "r1");
    reader.start(["right"]);

    for bytes in [vec![1], vec![1, 2], vec![9, 9]] {
        writer_source.edit("right", bytes);
        writer.notify_local_change("right");
    }

    wait_for(|| reader_source.local("right") == Some(vec![9, 9])).await;
    assert!(!writer_source.is_dirty("right"));
    assert_eq!(
        reader.last_known_tag("right"),
        Some(compute_content_hash(&[9, 9]))
    );

    reader.shutdown();
}

#[tokio::test]
async fn rooms_do_not_leak_between_clients() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_server(&dir).await;
    let (writer, writer_source) = client(&url, "r1");
    let (other, other_source) = client(&url, "r2");

    writer_source.edit("left", vec![5]);
    writer.flush("left").await.unwrap();

    assert_eq!(other.poll_once("left").await.unwrap(), PollOutcome::Unchanged);
    assert_eq!(other_source.local("left"), None);
}

#[tokio::test]
async fn push_to_unreachable_server_keeps_key_dirty() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let (writer, source) = client(&url, "r1");
    source.edit("left", vec![1]);

    let err = writer.flush("left").await.unwrap_err();
    assert!(err.is_transient());
    assert!(source.is_dirty("left"));
    assert!(writer.poll_once("left").await.is_err());
}
