use super::server::{load_index_page, router, ServerState, StreamServerBuilder};
use crate::{
    config::{SortcamConfig, StreamConfig},
    device::{DeviceLink, MockDevice, MockResetter},
    events::EventBus,
    frame::FrameBuffer,
    shared::SharedState,
};
use axum::{
    body::{to_bytes, Body, BodyDataStream},
    http::{header, Request, StatusCode},
};
use bytes::Bytes;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tower::ServiceExt;

struct TestServer {
    state: ServerState,
    device: MockDevice,
}

fn create_test_server() -> TestServer {
    let config = SortcamConfig::default();
    let device = MockDevice::new();
    let shared = Arc::new(SharedState::new(4, 10));
    let event_bus = Arc::new(EventBus::new(32));
    let link = Arc::new(DeviceLink::new(
        config.serial.clone(),
        &config.decision,
        Arc::new(device.clone()),
        Arc::new(MockResetter::new()),
        Arc::clone(&shared),
        Arc::clone(&event_bus),
    ));

    let server = StreamServerBuilder::new()
        .config(config.stream)
        .frames(Arc::new(FrameBuffer::new()))
        .annotated(Arc::new(FrameBuffer::new()))
        .shared(shared)
        .link(link)
        .event_bus(event_bus)
        .build()
        .unwrap();

    TestServer {
        state: server.state().clone(),
        device,
    }
}

async fn get(state: &ServerState, uri: &str) -> (StatusCode, String) {
    let response = router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&body).into_owned())
}

async fn get_json(state: &ServerState, uri: &str) -> serde_json::Value {
    let (status, body) = get(state, uri).await;
    assert_eq!(status, StatusCode::OK, "{} returned {}", uri, body);
    serde_json::from_str(&body).unwrap()
}

async fn next_chunk(body: &mut BodyDataStream) -> Bytes {
    timeout(Duration::from_secs(1), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap()
}

#[test]
fn test_builder_validation() {
    let result = StreamServerBuilder::new()
        .frames(Arc::new(FrameBuffer::new()))
        .annotated(Arc::new(FrameBuffer::new()))
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_index_routes_serve_builtin_page() {
    let server = create_test_server();
    for uri in ["/", "/index.html"] {
        let (status, body) = get(&server.state, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/stream.mjpg"));
    }
}

#[test]
fn test_index_page_from_file_and_fallback() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "<h1>custom</h1>").unwrap();

    let config = StreamConfig {
        index_path: Some(file.path().to_string_lossy().into_owned()),
        ..SortcamConfig::default().stream
    };
    assert_eq!(&*load_index_page(&config), "<h1>custom</h1>");

    let missing = StreamConfig {
        index_path: Some("/nonexistent/index.html".to_string()),
        ..SortcamConfig::default().stream
    };
    assert!(load_index_page(&missing).contains("Index page unavailable"));
}

#[tokio::test]
async fn test_unknown_path_is_404_and_favicon_204() {
    let server = create_test_server();
    assert_eq!(get(&server.state, "/nope").await.0, StatusCode::NOT_FOUND);
    assert_eq!(
        get(&server.state, "/favicon.ico").await.0,
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn test_serial_send() {
    let server = create_test_server();

    let (status, body) = get(&server.state, "/serial/send?cmd=HOME").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Error: command not sent");

    assert!(server.state.link.try_connect());

    let (status, body) = get(&server.state, "/serial/send").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Error: command not sent");

    let (status, body) = get(&server.state, "/serial/send?cmd=HOME").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Sent: HOME");
    assert_eq!(server.device.written(), vec!["HOME\n".to_string()]);

    server.device.set_fail_writes(true);
    let (status, _) = get(&server.state, "/serial/send?cmd=HOME").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_endpoints() {
    let server = create_test_server();
    let shared = &server.state.shared;

    assert_eq!(
        get_json(&server.state, "/collection/status").await,
        serde_json::json!({ "active": false })
    );
    assert_eq!(
        get_json(&server.state, "/classification/result").await,
        serde_json::json!({ "recognized": "-" })
    );

    shared.push_log("Starting motors");
    shared.activate();
    shared.record_vote("good");
    shared.record_vote("bad");
    shared.record_vote("good");

    assert_eq!(
        get_json(&server.state, "/serial/log").await,
        serde_json::json!({ "messages": ["Starting motors"] })
    );
    assert_eq!(
        get_json(&server.state, "/classification/buffer").await,
        serde_json::json!({ "counts": { "good": 2, "bad": 1 } })
    );
    assert_eq!(
        get_json(&server.state, "/collection/status").await,
        serde_json::json!({ "active": true })
    );
}

#[tokio::test]
async fn test_health_reports_link_and_frames() {
    let server = create_test_server();
    server.state.frames.publish(vec![1, 2, 3], 4, 4);

    let health = get_json(&server.state, "/health").await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["link"]["state"], "disconnected");
    assert_eq!(health["frames"]["captured"], 1);
    assert_eq!(health["frames"]["annotated"], 0);
}

#[tokio::test]
async fn test_mjpeg_stream_sends_current_then_new_frames() {
    let server = create_test_server();
    server.state.annotated.publish(vec![0xFF, 0xD8, 0xFF, 0xD9], 2, 2);

    let response = router(server.state.clone())
        .oneshot(
            Request::builder()
                .uri("/stream.mjpg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=FRAME"
    );

    let mut body = response.into_body().into_data_stream();

    let header_part = next_chunk(&mut body).await;
    let header_text = String::from_utf8_lossy(&header_part);
    assert!(header_text.starts_with("--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n"));
    assert!(header_text.contains("X-Frame-ID: 1\r\n"));
    assert_eq!(&next_chunk(&mut body).await[..], &[0xFF, 0xD8, 0xFF, 0xD9]);
    assert_eq!(&next_chunk(&mut body).await[..], b"\r\n");

    server.state.annotated.publish(vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9], 2, 2);
    let header_part = next_chunk(&mut body).await;
    assert!(String::from_utf8_lossy(&header_part).contains("X-Frame-ID: 2\r\n"));

    server.state.shutdown.cancel();
    let _ = next_chunk(&mut body).await;
    let _ = next_chunk(&mut body).await;
    let end = timeout(Duration::from_secs(1), body.next()).await.unwrap();
    assert!(end.is_none());
}
