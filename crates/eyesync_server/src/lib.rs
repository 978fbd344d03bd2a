#![doc = include_str!("../README.md")]

//! Eyesync Server
//!
//! Serves per-room replica stores over HTTP.
//!
//! ## Features
//!
//! - **Conditional requests**: `If-None-Match` answered with `304` by content tag
//! - **Durable writes**: a `PUT` is acknowledged only after it is persisted
//! - **Room isolation**: one store (and one SQLite file) per room
//!
//! ## Environment Variables
//!
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 3040)
//! - `DATA_DIR`: Directory for room databases (default: ./eyesync_data)
//! - `STORAGE`: `sqlite` or `memory` (default: sqlite)
//! - `DEFAULT_ROOM`: Room used when a request names none (default: default)
//! - `DEFAULT_KEY`: Key used when a request names none (default: left)
//! - `MAX_BODY_BYTES`: Largest accepted PUT body (default: 16 MiB)
//! - `CORS_ORIGINS`: Comma-separated list of allowed origins

pub mod config;
pub mod handlers;
pub mod rooms;

pub use config::Config;
pub use rooms::RoomRouter;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    routing::get,
};
use eyesync_core::replica::VERSION_TAG_HEADER;
use handlers::{api::ApiState, api_routes, replica::ReplicaState, replica_routes};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Build the CORS layer for the configured origins
pub fn cors_layer(config: &Config) -> CorsLayer {
    let version_tag = HeaderName::from_static(VERSION_TAG_HEADER);
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::IF_NONE_MATCH])
        .expose_headers([header::ETAG, header::LAST_MODIFIED, version_tag]);

    if config.cors_origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Build the application router
pub fn app(config: &Config, rooms: Arc<RoomRouter>) -> Router {
    let replica_state = ReplicaState {
        rooms: rooms.clone(),
        default_room: config.default_room.clone(),
        default_key: config.default_key.clone(),
    };
    let api_state = ApiState { rooms };

    Router::new()
        // Health check
        .route("/", get(|| async { "Eyesync Server" }))
        .route("/health", get(|| async { "OK" }))
        // Replica endpoint
        .merge(replica_routes(replica_state, config.max_body_bytes))
        // API routes
        .nest("/api", api_routes(api_state))
        // Add layers
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}
