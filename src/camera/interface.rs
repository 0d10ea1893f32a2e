use crate::collector::encode_jpeg;
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::frame::FrameBuffer;
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

#[cfg(all(target_os = "linux", feature = "camera"))]
use gstreamer::prelude::*;
#[cfg(all(target_os = "linux", feature = "camera"))]
use gstreamer::Pipeline;
#[cfg(all(target_os = "linux", feature = "camera"))]
use gstreamer_app::AppSink;

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    Gstreamer,
    Synthetic,
}

/// Publishes JPEG camera frames into a [`FrameBuffer`]
pub struct CameraInterface {
    config: CameraConfig,
    jpeg_quality: u8,
    frames: Arc<FrameBuffer>,
    frame_counter: AtomicU64,
    mode: CameraMode,
    #[cfg(all(target_os = "linux", feature = "camera"))]
    pipeline: Option<Pipeline>,
}

impl CameraInterface {
    /// Prepare the capture source. The GStreamer pipeline is built here so
    /// configuration errors surface before the system starts.
    pub fn new(config: CameraConfig, jpeg_quality: u8, frames: Arc<FrameBuffer>) -> Result<Self> {
        info!(
            "Initializing camera interface for device {} ({}x{} @ {}fps)",
            config.index, config.resolution.0, config.resolution.1, config.fps
        );

        let mode = if config.synthetic || !cfg!(all(target_os = "linux", feature = "camera")) {
            CameraMode::Synthetic
        } else {
            CameraMode::Gstreamer
        };

        #[cfg_attr(not(all(target_os = "linux", feature = "camera")), allow(unused_mut))]
        let mut camera = Self {
            config,
            jpeg_quality,
            frames,
            frame_counter: AtomicU64::new(0),
            mode,
            #[cfg(all(target_os = "linux", feature = "camera"))]
            pipeline: None,
        };

        #[cfg(all(target_os = "linux", feature = "camera"))]
        if mode == CameraMode::Gstreamer {
            camera.initialize_pipeline()?;
        }

        if mode == CameraMode::Synthetic {
            info!("Using synthetic test-pattern frames");
        }

        Ok(camera)
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Frames published so far
    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    #[cfg(all(target_os = "linux", feature = "camera"))]
    fn initialize_pipeline(&mut self) -> Result<()> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let description = pipeline_description(&self.config, self.jpeg_quality);
        info!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Capture until `cancel` fires
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("Camera capture started ({:?})", self.mode);

        match self.mode {
            CameraMode::Synthetic => self.run_synthetic(&cancel).await,
            CameraMode::Gstreamer => {
                #[cfg(all(target_os = "linux", feature = "camera"))]
                if let Some(pipeline) = self.pipeline.clone() {
                    self.run_gstreamer(pipeline, &cancel).await;
                }
            }
        }

        info!("Camera capture stopped after {} frames", self.frame_count());
    }

    #[cfg(all(target_os = "linux", feature = "camera"))]
    async fn run_gstreamer(&self, pipeline: Pipeline, cancel: &CancellationToken) {
        let appsink = match pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
        {
            Some(appsink) => appsink,
            None => {
                error!("Pipeline has no appsink named 'sink'");
                return;
            }
        };

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    let _ = tx.send(sample);
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            error!("Failed to start GStreamer pipeline: {}", e);
            return;
        }
        info!("GStreamer pipeline started");

        let mut last_sample_time = tokio::time::Instant::now();
        let mut watchdog_interval = tokio::time::interval(Duration::from_secs(1));
        let watchdog_timeout = Duration::from_secs(5);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                sample = rx.recv() => {
                    let Some(sample) = sample else {
                        warn!("GStreamer sample channel closed");
                        break;
                    };
                    if let Err(e) = self.process_sample(sample) {
                        error!("Error processing GStreamer sample: {}", e);
                    }
                    last_sample_time = tokio::time::Instant::now();
                }
                _ = watchdog_interval.tick() => {
                    if last_sample_time.elapsed() >= watchdog_timeout {
                        warn!(
                            "No camera frames received for {:?}; restarting pipeline",
                            watchdog_timeout
                        );
                        let _ = pipeline.set_state(gstreamer::State::Null);
                        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
                            error!("Failed to restart GStreamer pipeline: {}", e);
                        } else {
                            last_sample_time = tokio::time::Instant::now();
                        }
                    }
                }
            }
        }

        let _ = pipeline.set_state(gstreamer::State::Null);
    }

    #[cfg(all(target_os = "linux", feature = "camera"))]
    fn process_sample(&self, sample: gstreamer::Sample) -> std::result::Result<(), CameraError> {
        let buffer = sample.buffer().ok_or_else(|| CameraError::CaptureStream {
            details: "No buffer in sample".to_string(),
        })?;

        let (width, height) = sample
            .caps()
            .and_then(|caps| caps.structure(0))
            .map(|s| {
                (
                    s.get::<i32>("width").unwrap_or(0).max(0) as u32,
                    s.get::<i32>("height").unwrap_or(0).max(0) as u32,
                )
            })
            .unwrap_or((0, 0));

        let map = buffer
            .map_readable()
            .map_err(|e| CameraError::CaptureStream {
                details: format!("Failed to map buffer: {}", e),
            })?;

        let id = self.frames.publish(map.as_slice().to_vec(), width, height);
        self.frame_counter.fetch_add(1, Ordering::Relaxed);
        trace!(
            "Captured frame {} ({}x{}, {} bytes)",
            id,
            width,
            height,
            map.len()
        );

        Ok(())
    }

    async fn run_synthetic(&self, cancel: &CancellationToken) {
        let (width, height) = self.config.resolution;
        let quality = self.jpeg_quality;
        let frame_interval = Duration::from_millis(1000 / self.config.fps.max(1) as u64);
        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let sequence = self.frame_count();
            let encoded = tokio::task::spawn_blocking(move || {
                encode_jpeg(&test_pattern(width, height, sequence), quality)
            })
            .await;

            match encoded {
                Ok(Ok(jpeg)) => {
                    let id = self.frames.publish(jpeg, width, height);
                    self.frame_counter.fetch_add(1, Ordering::Relaxed);
                    trace!("Generated synthetic frame {}", id);
                }
                Ok(Err(e)) => warn!("Failed to encode synthetic frame: {}", e),
                Err(e) => {
                    error!("Synthetic frame task failed: {}", e);
                    break;
                }
            }
        }
        debug!("Synthetic capture loop exited");
    }
}

/// GStreamer pipeline for MJPEG capture into an appsink named `sink`.
///
/// A configured pipeline is used verbatim. A flip decodes, flips and
/// re-encodes the stream.
pub fn pipeline_description(config: &CameraConfig, jpeg_quality: u8) -> String {
    if let Some(custom) = &config.pipeline {
        return custom.clone();
    }

    let (width, height) = config.resolution;
    let flip = match config.flip.videoflip_method() {
        Some(method) => format!(
            "jpegdec ! videoflip method={} ! jpegenc quality={} ! ",
            method, jpeg_quality
        ),
        None => String::new(),
    };

    format!(
        "v4l2src device=/dev/video{} io-mode=mmap do-timestamp=true ! \
         image/jpeg,width={},height={},framerate={}/1 ! \
         {}queue max-size-buffers=4 leaky=downstream ! \
         appsink name=sink sync=false max-buffers=10 drop=false qos=false enable-last-sample=false emit-signals=false",
        config.index, width, height, config.fps, flip
    )
}

/// Moving gradient with a sweeping bar, so consecutive frames differ
pub fn test_pattern(width: u32, height: u32, sequence: u64) -> RgbImage {
    let shift = (sequence * 4) as u32;
    let bar_x = if width > 0 { (shift * 2) % width } else { 0 };

    RgbImage::from_fn(width, height, |x, y| {
        if x.abs_diff(bar_x) < 8 {
            return Rgb([255, 255, 255]);
        }
        Rgb([
            ((x + shift) % 256) as u8,
            ((y * 255) / height.max(1)) as u8,
            (((x + y) / 2 + shift) % 256) as u8,
        ])
    })
}
