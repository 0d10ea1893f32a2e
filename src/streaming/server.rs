use crate::{
    config::StreamConfig,
    device::DeviceLink,
    error::{Result, SortcamError, StreamError},
    events::EventBus,
    frame::FrameBuffer,
    shared::SharedState,
};
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::handlers::{
    classification_buffer_handler, classification_result_handler, collection_status_handler,
    favicon_handler, health_handler, index_handler, mjpeg_stream_handler, not_found_handler,
    serial_log_handler, serial_send_handler,
};
use super::page::{missing_page, DEFAULT_INDEX};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) frames: Arc<FrameBuffer>,
    pub(crate) annotated: Arc<FrameBuffer>,
    pub(crate) shared: Arc<SharedState>,
    pub(crate) link: Arc<DeviceLink>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) index_html: Arc<str>,
    /// Ends open MJPEG streams so graceful shutdown can complete
    pub(crate) shutdown: CancellationToken,
}

/// All routes with request tracing
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/stream.mjpg", get(mjpeg_stream_handler))
        .route("/serial/send", get(serial_send_handler))
        .route("/serial/log", get(serial_log_handler))
        .route("/classification/buffer", get(classification_buffer_handler))
        .route("/classification/result", get(classification_result_handler))
        .route("/collection/status", get(collection_status_handler))
        .route("/favicon.ico", get(favicon_handler))
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load the configured index page, falling back to the built-in one
pub fn load_index_page(config: &StreamConfig) -> Arc<str> {
    match &config.index_path {
        None => Arc::from(DEFAULT_INDEX),
        Some(path) => match std::fs::read_to_string(path) {
            Ok(html) => Arc::from(html),
            Err(e) => {
                warn!("Failed to read index page {}: {}", path, e);
                Arc::from(missing_page(path))
            }
        },
    }
}

/// HTTP server for the live view and the control endpoints
pub struct StreamServer {
    pub(crate) config: StreamConfig,
    state: ServerState,
}

impl StreamServer {
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Serve until `cancel` fires, then shut down gracefully
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let mut state = self.state.clone();
        state.shutdown = cancel.clone();
        let app = router(state);

        let addr = format!("{}:{}", self.config.ip, self.config.port);
        info!("Starting HTTP server on {}", addr);

        let listener =
            tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| StreamError::BindFailed {
                    address: addr.clone(),
                    source: e,
                })?;

        info!("HTTP server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| StreamError::StartupFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Stream server builder for configuration
pub struct StreamServerBuilder {
    config: Option<StreamConfig>,
    frames: Option<Arc<FrameBuffer>>,
    annotated: Option<Arc<FrameBuffer>>,
    shared: Option<Arc<SharedState>>,
    link: Option<Arc<DeviceLink>>,
    event_bus: Option<Arc<EventBus>>,
}

impl StreamServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            frames: None,
            annotated: None,
            shared: None,
            link: None,
            event_bus: None,
        }
    }

    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Raw camera frames, reported by `/health`
    pub fn frames(mut self, frames: Arc<FrameBuffer>) -> Self {
        self.frames = Some(frames);
        self
    }

    /// Annotated frames served on `/stream.mjpg`
    pub fn annotated(mut self, annotated: Arc<FrameBuffer>) -> Self {
        self.annotated = Some(annotated);
        self
    }

    pub fn shared(mut self, shared: Arc<SharedState>) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn link(mut self, link: Arc<DeviceLink>) -> Self {
        self.link = Some(link);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> Result<StreamServer> {
        let config = self.config.ok_or_else(|| missing("Stream configuration"))?;
        let frames = self.frames.ok_or_else(|| missing("Frame buffer"))?;
        let annotated = self.annotated.ok_or_else(|| missing("Annotated frame buffer"))?;
        let shared = self.shared.ok_or_else(|| missing("Shared state"))?;
        let link = self.link.ok_or_else(|| missing("Device link"))?;
        let event_bus = self.event_bus.ok_or_else(|| missing("Event bus"))?;

        let state = ServerState {
            frames,
            annotated,
            shared,
            link,
            event_bus,
            index_html: load_index_page(&config),
            shutdown: CancellationToken::new(),
        };

        Ok(StreamServer { config, state })
    }
}

impl Default for StreamServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(what: &str) -> SortcamError {
    SortcamError::Stream(StreamError::StartupFailed {
        details: format!("{} is required", what),
    })
}
