use crate::frame::FrameData;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::server::ServerState;

#[derive(Debug, Deserialize)]
pub struct SendParams {
    cmd: Option<String>,
}

pub async fn index_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Html(state.index_html.to_string())
}

/// Multipart MJPEG of the annotated frames. Starts with the current frame,
/// then pushes each new one as it is published.
pub async fn mjpeg_stream_handler(State(state): State<ServerState>) -> Response {
    info!("New MJPEG stream client connected");

    let mut subscriber = state.annotated.subscribe();
    let shutdown = state.shutdown.clone();

    let stream = async_stream::stream! {
        let mut frames_streamed = 0u64;

        if let Some(frame) = subscriber.current() {
            for chunk in frame_parts(&frame) {
                yield Ok::<_, axum::Error>(chunk);
            }
            frames_streamed += 1;
        }

        loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = subscriber.wait_for_next() => frame,
            };
            let Some(frame) = frame else { break };

            for chunk in frame_parts(&frame) {
                yield Ok(chunk);
            }
            frames_streamed += 1;
        }

        debug!("MJPEG stream ended after {} frames", frames_streamed);
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=FRAME",
        )
        .header(header::CACHE_CONTROL, "no-cache, private")
        .header(header::PRAGMA, "no-cache")
        .header("Access-Control-Allow-Origin", "*")
        .body(axum::body::Body::from_stream(stream))
        .unwrap_or_else(|e| {
            error!("Failed to build MJPEG response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

fn frame_parts(frame: &FrameData) -> [Bytes; 3] {
    let header = format!(
        "--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nX-Frame-ID: {}\r\nX-Timestamp: {}\r\n\r\n",
        frame.data.len(),
        frame.id,
        frame.timestamp_millis()
    );
    [
        Bytes::from(header),
        Bytes::copy_from_slice(&frame.data),
        Bytes::from_static(b"\r\n"),
    ]
}

/// Forward a manual command to the controller, newline terminated
pub async fn serial_send_handler(
    State(state): State<ServerState>,
    Query(params): Query<SendParams>,
) -> impl IntoResponse {
    let Some(cmd) = params.cmd.filter(|cmd| !cmd.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Error: command not sent".to_string());
    };

    let line = format!("{}\n", cmd).into_bytes();
    match state.link.clone().send_async(line).await {
        Ok(()) => {
            info!("Sent manual command {:?}", cmd);
            (StatusCode::OK, format!("Sent: {}", cmd))
        }
        Err(e) => {
            warn!("Manual command {:?} not sent: {}", cmd, e);
            (StatusCode::BAD_REQUEST, "Error: command not sent".to_string())
        }
    }
}

pub async fn serial_log_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(serde_json::json!({ "messages": state.shared.log_messages() }))
}

pub async fn classification_buffer_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let counts: serde_json::Map<String, serde_json::Value> = state
        .shared
        .vote_counts()
        .into_iter()
        .map(|(label, count)| (label, count.into()))
        .collect();
    Json(serde_json::json!({ "counts": counts }))
}

pub async fn classification_result_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let recognized = state
        .shared
        .last_recognized()
        .unwrap_or_else(|| "-".to_string());
    Json(serde_json::json!({ "recognized": recognized }))
}

pub async fn collection_status_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(serde_json::json!({ "active": state.shared.is_active() }))
}

pub async fn favicon_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let latest = state.annotated.latest();

    let health_info = serde_json::json!({
        "status": "healthy",
        "link": {
            "state": state.link.state(),
            "port": state.link.connected_port(),
            "stats": state.link.stats(),
        },
        "frames": {
            "captured": state.frames.frames_published(),
            "annotated": state.annotated.frames_published(),
            "latest_annotated_id": latest.map(|f| f.id),
            "stream_clients": state.annotated.subscriber_count(),
        },
        "collection": {
            "active": state.shared.is_active(),
            "votes": state.shared.vote_len(),
        },
        "event_subscribers": state.event_bus.subscriber_count(),
    });

    (StatusCode::OK, Json(health_info))
}

pub async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}
