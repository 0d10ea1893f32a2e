use super::types::{ComponentState, ShutdownReason};
use crate::camera::CameraInterface;
use crate::classifier::Classifier;
use crate::collector::FrameCollector;
use crate::config::SortcamConfig;
use crate::device::{
    CommandUsbResetter, DeviceLink, MockDevice, MockResetter, PortOpener, SerialPortOpener,
    UsbResetter,
};
use crate::error::Result;
use crate::events::EventBus;
use crate::frame::FrameBuffer;
use crate::shared::SharedState;
use crate::streaming::{StreamServer, StreamServerBuilder};
use crate::worker::Worker;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

const EVENT_BUS_CAPACITY: usize = 256;

/// The long-running pieces of the system and the buffers between them
pub struct Components {
    pub frames: Arc<FrameBuffer>,
    pub annotated: Arc<FrameBuffer>,
    pub camera: Arc<CameraInterface>,
    pub link: Arc<DeviceLink>,
    pub collector: Arc<FrameCollector>,
    /// In-process controller used instead of serial hardware
    pub simulated_device: Option<MockDevice>,
}

impl Components {
    /// Build every component from configuration: the camera source, the
    /// model, and either the serial hardware or the simulated controller.
    pub fn build(
        config: &SortcamConfig,
        shared: &Arc<SharedState>,
        event_bus: &Arc<EventBus>,
    ) -> Result<Self> {
        let frames = Arc::new(FrameBuffer::new());
        let annotated = Arc::new(FrameBuffer::new());

        let camera = Arc::new(CameraInterface::new(
            config.camera.clone(),
            config.collector.jpeg_quality,
            Arc::clone(&frames),
        )?);

        let classifier = Arc::new(Classifier::from_config(&config.model)?);
        info!(
            "Loaded model {} with {} labels",
            config.model.path,
            classifier.labels().len()
        );

        let (opener, resetter, simulated_device): (
            Arc<dyn PortOpener>,
            Arc<dyn UsbResetter>,
            Option<MockDevice>,
        ) = if config.serial.simulate {
            info!("Serial simulation enabled; using an in-process controller");
            let device = MockDevice::new();
            (
                Arc::new(device.clone()),
                Arc::new(MockResetter::reviving(device.clone())),
                Some(device),
            )
        } else {
            (
                Arc::new(SerialPortOpener::new(config.serial.port_patterns.clone())),
                Arc::new(CommandUsbResetter::new(
                    config.serial.usb_device_match.clone(),
                    config.serial.usb_reset_command.clone(),
                )),
                None,
            )
        };

        let link = Arc::new(DeviceLink::new(
            config.serial.clone(),
            &config.decision,
            opener,
            resetter,
            Arc::clone(shared),
            Arc::clone(event_bus),
        ));

        let collector = Arc::new(FrameCollector::new(
            config.collector.clone(),
            config.model.top_k,
            classifier,
            Arc::clone(shared),
            Arc::clone(&frames),
            Arc::clone(&annotated),
            Arc::clone(event_bus),
        ));

        Ok(Self {
            frames,
            annotated,
            camera,
            link,
            collector,
            simulated_device,
        })
    }
}

/// Main application coordinator that manages all system components
pub struct SortcamOrchestrator {
    pub(super) config: SortcamConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) shared: Arc<SharedState>,
    pub(super) components: Components,
    pub(super) stream_server: Arc<StreamServer>,

    // Lifecycle management
    pub(super) workers: HashMap<&'static str, Worker>,
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: mpsc::UnboundedSender<ShutdownReason>,
    pub(super) shutdown_receiver: Option<mpsc::UnboundedReceiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl SortcamOrchestrator {
    /// Create an orchestrator with components built from `config`
    pub fn new(config: SortcamConfig) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
        let shared = Arc::new(SharedState::new(
            config.decision.window_size,
            config.serial.log_capacity,
        ));
        let components = Components::build(&config, &shared, &event_bus)?;
        Self::with_components(config, shared, event_bus, components)
    }

    /// Create an orchestrator around already-built components
    pub fn with_components(
        config: SortcamConfig,
        shared: Arc<SharedState>,
        event_bus: Arc<EventBus>,
        components: Components,
    ) -> Result<Self> {
        let stream_server = Arc::new(
            StreamServerBuilder::new()
                .config(config.stream.clone())
                .frames(Arc::clone(&components.frames))
                .annotated(Arc::clone(&components.annotated))
                .shared(Arc::clone(&shared))
                .link(Arc::clone(&components.link))
                .event_bus(Arc::clone(&event_bus))
                .build()?,
        );
        let (shutdown_sender, shutdown_receiver) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            event_bus,
            shared,
            components,
            stream_server,
            workers: HashMap::new(),
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender,
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &SortcamConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn shared(&self) -> Arc<SharedState> {
        Arc::clone(&self.shared)
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    /// Sender that triggers the same graceful shutdown as a signal.
    /// The first reason received by [`SortcamOrchestrator::run`] wins.
    pub fn shutdown_sender(&self) -> mpsc::UnboundedSender<ShutdownReason> {
        self.shutdown_sender.clone()
    }
}
