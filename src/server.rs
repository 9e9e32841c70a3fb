//! HTTP surface: MJPEG stream, settings and status
//!
//! | Path | Description |
//! |------|-------------|
//! | `GET /stream.mjpg` | Live multipart JPEG stream, one broadcaster per request |
//! | `GET /settings` | Current settings record |
//! | `POST /update_settings` | Merge a partial settings object |
//! | `GET /system_info` | Liveness and stream statistics |

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Error, Result};
use crate::settings::{SettingsController, SettingsRecord};
use crate::stream::{mjpeg, StreamHub};

/// Bytes buffered between a viewer loop and its HTTP response
const STREAM_BUFFER: usize = 64 * 1024;

/// Shared state passed to all request handlers
pub struct AppState {
    pub controller: Arc<SettingsController>,
    pub hub: Arc<StreamHub>,
    pub started: Instant,
}

impl AppState {
    pub fn new(controller: Arc<SettingsController>, hub: Arc<StreamHub>) -> Self {
        Self {
            controller,
            hub,
            started: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/stream.mjpg", get(stream))
        .route("/settings", get(settings))
        .route("/update_settings", post(update_settings))
        .route("/system_info", get(system_info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `cancel` fires, then finish in-flight responses
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| Error::hardware(format!("listener has no address: {}", e)))?;
    info!("Server started on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::hardware(format!("server error: {}", e)))
}

/// GET /stream.mjpg
async fn stream(State(state): State<Arc<AppState>>) -> Response {
    let (writer, reader) = tokio::io::duplex(STREAM_BUFFER);
    // Dropping the body on disconnect closes the pipe and ends the viewer loop
    state.hub.spawn_viewer(writer);

    (
        [
            (header::AGE, "0"),
            (header::CACHE_CONTROL, "no-cache, private"),
            (header::PRAGMA, "no-cache"),
            (header::CONTENT_TYPE, mjpeg::CONTENT_TYPE),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response()
}

/// GET /settings
async fn settings(State(state): State<Arc<AppState>>) -> Json<SettingsRecord> {
    Json(SettingsRecord::clone(&state.controller.snapshot()))
}

/// POST /update_settings
async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<Map<String, Value>>,
) -> (StatusCode, Json<Value>) {
    let outcome = state.controller.apply(&update).await;

    let (code, status) = if !outcome.faults.is_empty() {
        (StatusCode::INTERNAL_SERVER_ERROR, "error")
    } else if !outcome.rejected.is_empty() {
        (StatusCode::BAD_REQUEST, "rejected")
    } else {
        (StatusCode::OK, "success")
    };

    let mut body = serde_json::to_value(&outcome).unwrap_or_else(|_| json!({}));
    body["status"] = json!(status);
    (code, Json(body))
}

/// GET /system_info
async fn system_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let lighting = state.controller.lighting_config();
    let pipeline = state.controller.pipeline();
    let slot = state.hub.slot();

    Json(json!({
        "schedule_status": if lighting.schedule_enabled { "Active" } else { "Inactive" },
        "led_on": lighting.enabled,
        "pipeline": pipeline.state(),
        "sequence": slot.sequence(),
        "frames_published": slot.frames_published(),
        "viewers": state.hub.viewers(),
        "uptime_secs": state.started.elapsed().as_secs(),
        // Host load is not sampled; the keys stay for existing clients
        "cpu_load": Value::Null,
        "ram_usage": Value::Null,
    }))
}
