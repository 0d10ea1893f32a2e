use super::*;
use crate::config::{CameraConfig, Flip, SortcamConfig};
use crate::frame::FrameBuffer;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn create_test_camera_config() -> CameraConfig {
    CameraConfig {
        resolution: (64, 48),
        fps: 50,
        synthetic: true,
        ..SortcamConfig::default().camera
    }
}

#[test]
fn test_default_pipeline_has_no_flip() {
    let description = pipeline_description(&SortcamConfig::default().camera, 85);
    assert!(description.starts_with("v4l2src device=/dev/video0"));
    assert!(description.contains("image/jpeg,width=640,height=480,framerate=30/1"));
    assert!(!description.contains("videoflip"));
    assert!(description.contains("appsink name=sink"));
}

#[test]
fn test_flip_inserts_videoflip() {
    let config = CameraConfig {
        flip: Flip::Hv,
        ..SortcamConfig::default().camera
    };
    let description = pipeline_description(&config, 70);
    assert!(description.contains("jpegdec ! videoflip method=rotate-180 ! jpegenc quality=70 !"));
}

#[test]
fn test_custom_pipeline_used_verbatim() {
    let config = CameraConfig {
        pipeline: Some("videotestsrc ! jpegenc ! appsink name=sink".to_string()),
        ..SortcamConfig::default().camera
    };
    assert_eq!(
        pipeline_description(&config, 85),
        "videotestsrc ! jpegenc ! appsink name=sink"
    );
}

#[test]
fn test_pattern_changes_between_frames() {
    let first = test_pattern(32, 16, 0);
    let second = test_pattern(32, 16, 1);
    assert_eq!(first.dimensions(), (32, 16));
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_synthetic_camera_publishes_jpegs() {
    let frames = Arc::new(FrameBuffer::new());
    let camera = Arc::new(
        CameraInterface::new(create_test_camera_config(), 80, Arc::clone(&frames)).unwrap(),
    );
    assert_eq!(camera.mode(), CameraMode::Synthetic);

    let mut subscriber = frames.subscribe();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&camera).run(cancel.clone()));

    let frame = timeout(Duration::from_secs(2), subscriber.wait_for_next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((frame.width, frame.height), (64, 48));
    assert_eq!(&frame.data[..2], &[0xFF, 0xD8]);

    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert!(camera.frame_count() >= 1);
}
