use super::*;
use crate::camera::CameraInterface;
use crate::classifier::{Classifier, InferenceBackend, ModelOutput};
use crate::collector::FrameCollector;
use crate::config::SortcamConfig;
use crate::device::{DeviceLink, DeviceLinkState, MockDevice, MockResetter};
use crate::error::ModelError;
use crate::events::{EventBus, SortcamEvent};
use crate::frame::FrameBuffer;
use crate::shared::SharedState;
use ndarray::Array4;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

struct AlwaysBad;

impl InferenceBackend for AlwaysBad {
    fn infer(&mut self, _input: Array4<f32>) -> Result<ModelOutput, ModelError> {
        Ok(ModelOutput::Float(vec![0.1, 0.9]))
    }
}

fn create_test_config() -> SortcamConfig {
    let mut config = SortcamConfig::default();
    config.camera.synthetic = true;
    config.camera.resolution = (64, 48);
    config.camera.fps = 50;
    config.collector.crop_size = 40;
    config.collector.crop_offset_y = 0;
    config.collector.pace_ms = 0;
    config.decision.window_size = 3;
    config.serial.simulate = true;
    config.serial.poll_interval_ms = 1;
    config.serial.simulate_trigger_interval_ms = 200;
    config.stream.ip = "127.0.0.1".to_string();
    config.stream.port = 0;
    config
}

fn create_test_orchestrator(config: SortcamConfig) -> SortcamOrchestrator {
    let event_bus = Arc::new(EventBus::new(256));
    let shared = Arc::new(SharedState::new(
        config.decision.window_size,
        config.serial.log_capacity,
    ));

    let frames = Arc::new(FrameBuffer::new());
    let annotated = Arc::new(FrameBuffer::new());
    let camera = Arc::new(
        CameraInterface::new(config.camera.clone(), 80, Arc::clone(&frames)).unwrap(),
    );

    let device = MockDevice::new();
    let link = Arc::new(DeviceLink::new(
        config.serial.clone(),
        &config.decision,
        Arc::new(device.clone()),
        Arc::new(MockResetter::reviving(device.clone())),
        Arc::clone(&shared),
        Arc::clone(&event_bus),
    ));

    let classifier = Arc::new(Classifier::new(
        &config.model,
        Box::new(AlwaysBad),
        vec!["good".to_string(), "bad".to_string()],
    ));
    let collector = Arc::new(FrameCollector::new(
        config.collector.clone(),
        1,
        classifier,
        Arc::clone(&shared),
        Arc::clone(&frames),
        Arc::clone(&annotated),
        Arc::clone(&event_bus),
    ));

    let components = Components {
        frames,
        annotated,
        camera,
        link,
        collector,
        simulated_device: Some(device),
    };

    SortcamOrchestrator::with_components(config, shared, event_bus, components).unwrap()
}

#[tokio::test]
async fn test_initialize_registers_components() {
    let mut orchestrator = create_test_orchestrator(create_test_config());
    orchestrator.initialize().await.unwrap();

    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.len(), 5);
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
}

#[tokio::test]
async fn test_start_and_shutdown() {
    let mut orchestrator = create_test_orchestrator(create_test_config());
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    for component in ["camera", "device_link", "collector", "simulator", "http"] {
        assert_eq!(
            orchestrator.get_component_state(component).await,
            Some(ComponentState::Running),
            "{} not running",
            component
        );
    }

    let link = Arc::clone(&orchestrator.components().link);
    timeout(Duration::from_secs(5), async {
        while !link.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let exit_code = orchestrator.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);
    assert_eq!(link.state(), DeviceLinkState::Disconnected);

    let states = orchestrator.get_all_component_states().await;
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
}

#[tokio::test]
async fn test_simulated_controller_receives_decision() {
    let mut orchestrator = create_test_orchestrator(create_test_config());
    let mut decisions = orchestrator
        .event_bus()
        .subscribe_filtered(vec!["decision_emitted"], "test");

    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let event = timeout(Duration::from_secs(10), decisions.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        SortcamEvent::DecisionEmitted {
            code, delivered, ..
        } => {
            assert_eq!(code, "BAD");
            assert!(delivered);
        }
        other => panic!("unexpected event {:?}", other),
    }

    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
}

#[tokio::test]
async fn test_run_stops_on_shutdown_request() {
    let mut orchestrator = create_test_orchestrator(create_test_config());
    let mut shutdown_events = orchestrator
        .event_bus()
        .subscribe_filtered(vec!["shutdown_requested"], "test");

    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let sender = orchestrator.shutdown_sender();
    sender.send(ShutdownReason::UserRequest).unwrap();

    let exit_code = timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);

    let event = shutdown_events.recv().await.unwrap();
    assert!(matches!(event, SortcamEvent::ShutdownRequested { .. }));
}

#[tokio::test]
async fn test_http_bind_failure_shuts_down_with_error() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = create_test_config();
    config.stream.port = occupied.local_addr().unwrap().port();

    let mut orchestrator = create_test_orchestrator(config);
    let mut shutdown_events = orchestrator
        .event_bus()
        .subscribe_filtered(vec!["shutdown_requested"], "test");

    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let exit_code = timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 1);

    match shutdown_events.recv().await.unwrap() {
        SortcamEvent::ShutdownRequested { reason, .. } => {
            assert!(reason.starts_with("error: http"), "reason was {}", reason)
        }
        other => panic!("unexpected event {:?}", other),
    }
    drop(occupied);
}

#[tokio::test]
async fn test_shutdown_without_start_is_clean() {
    let mut orchestrator = create_test_orchestrator(create_test_config());
    orchestrator.initialize().await.unwrap();
    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
    assert_eq!(
        orchestrator.get_component_state("camera").await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_simulated_controller_drains_output() {
    let device = MockDevice::new();
    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(run_simulated_controller(
        device.clone(),
        "Starting motors".to_string(),
        Duration::from_millis(100),
        cancel.clone(),
    ));

    {
        use crate::device::{LinkPort, PortOpener};
        let mut port = device.open(device.path(), 9600).unwrap();
        port.write_all(b"GOOD").unwrap();
        timeout(Duration::from_secs(2), async {
            loop {
                if let Some(line) = port.poll_line().unwrap() {
                    assert_eq!(line, b"Starting motors");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    timeout(Duration::from_secs(2), async {
        while !device.written().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}
