use super::simulation::run_simulated_controller;
use super::{ComponentState, ShutdownReason, SortcamOrchestrator};
use crate::error::Result;
use crate::events::SortcamEvent;
use crate::frame::FrameBuffer;
use crate::worker::Worker;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub(super) const CAMERA: &str = "camera";
pub(super) const DEVICE_LINK: &str = "device_link";
pub(super) const COLLECTOR: &str = "collector";
pub(super) const SIMULATOR: &str = "simulator";
pub(super) const HTTP: &str = "http";

impl SortcamOrchestrator {
    /// Register every component as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing Sortcam system components");

        let mut states = self.component_states.lock().await;
        states.insert(CAMERA.to_string(), ComponentState::Stopped);
        states.insert(DEVICE_LINK.to_string(), ComponentState::Stopped);
        states.insert(COLLECTOR.to_string(), ComponentState::Stopped);
        if self.components.simulated_device.is_some() {
            states.insert(SIMULATOR.to_string(), ComponentState::Stopped);
        }
        states.insert(HTTP.to_string(), ComponentState::Stopped);
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start all components in dependency order: camera, device link,
    /// collector, then the HTTP server
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting Sortcam system");

        self.set_component_state(CAMERA, ComponentState::Starting)
            .await;
        let camera = Arc::clone(&self.components.camera);
        self.spawn_worker(CAMERA, move |cancel| camera.run(cancel));
        if !wait_for_frames(&self.components.frames, Duration::from_secs(5)).await {
            warn!("Camera has not produced a frame yet; continuing");
        }
        self.set_component_state(CAMERA, ComponentState::Running)
            .await;

        self.set_component_state(DEVICE_LINK, ComponentState::Starting)
            .await;
        let link = Arc::clone(&self.components.link);
        self.spawn_worker(DEVICE_LINK, move |cancel| link.run(cancel));
        self.set_component_state(DEVICE_LINK, ComponentState::Running)
            .await;

        self.set_component_state(COLLECTOR, ComponentState::Starting)
            .await;
        let collector = Arc::clone(&self.components.collector);
        let frames = collector.subscribe();
        self.spawn_worker(COLLECTOR, move |cancel| collector.run(frames, cancel));
        self.set_component_state(COLLECTOR, ComponentState::Running)
            .await;

        if let Some(device) = self.components.simulated_device.clone() {
            self.set_component_state(SIMULATOR, ComponentState::Starting)
                .await;
            let trigger = self.config.decision.trigger_token.clone();
            let interval = Duration::from_millis(self.config.serial.simulate_trigger_interval_ms);
            self.spawn_worker(SIMULATOR, move |cancel| {
                run_simulated_controller(device, trigger, interval, cancel)
            });
            self.set_component_state(SIMULATOR, ComponentState::Running)
                .await;
        }

        self.set_component_state(HTTP, ComponentState::Starting)
            .await;
        let server = Arc::clone(&self.stream_server);
        let event_bus = Arc::clone(&self.event_bus);
        let shutdown = self.shutdown_sender.clone();
        self.spawn_worker(HTTP, move |cancel| async move {
            if let Err(e) = server.start(cancel).await {
                error!("HTTP server error: {}", e);
                event_bus.publish(SortcamEvent::SystemError {
                    component: HTTP.to_string(),
                    error: e.to_string(),
                });
                if !e.is_recoverable() {
                    let _ = shutdown.send(ShutdownReason::Error(format!("{}: {}", HTTP, e)));
                }
            }
        });
        self.set_component_state(HTTP, ComponentState::Running)
            .await;
        info!(
            "HTTP server starting on {}:{}",
            self.config.stream.ip, self.config.stream.port
        );

        info!("Sortcam system started successfully");
        Ok(())
    }

    fn spawn_worker<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(tokio_util::sync::CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let worker = Worker::spawn(name, &self.cancellation_token, task);
        self.workers.insert(name, worker);
    }
}

async fn wait_for_frames(frames: &FrameBuffer, timeout: Duration) -> bool {
    let mut subscriber = frames.subscribe();
    matches!(
        tokio::time::timeout(timeout, subscriber.wait_for_next()).await,
        Ok(Some(_))
    )
}
