use super::crop::CropRegion;
use super::encode::encode_jpeg;
use super::overlay::Annotator;
use crate::classifier::Classifier;
use crate::config::CollectorConfig;
use crate::error::Result;
use crate::events::{EventBus, SortcamEvent};
use crate::frame::{FrameBuffer, FrameData, FrameSubscriber};
use crate::shared::SharedState;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct CollectorCounters {
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
    frames_classified: AtomicU64,
    classification_failures: AtomicU64,
}

/// Point-in-time collector counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorStats {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub frames_classified: u64,
    pub classification_failures: u64,
}

/// Result of processing one camera frame
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedFrame {
    pub source_id: u64,
    pub annotated_id: u64,
    /// Top label recorded as a vote, if the frame was classified
    pub vote: Option<String>,
}

/// Pipeline driver between the camera and the vote window.
///
/// Every new camera frame is cropped and republished as the annotated frame;
/// while collection is active it is also classified and its top label
/// recorded as a vote.
pub struct FrameCollector {
    config: CollectorConfig,
    top_k: usize,
    classifier: Arc<Classifier>,
    shared: Arc<SharedState>,
    frames: Arc<FrameBuffer>,
    annotated: Arc<FrameBuffer>,
    annotator: Annotator,
    event_bus: Arc<EventBus>,
    counters: CollectorCounters,
}

impl FrameCollector {
    pub fn new(
        config: CollectorConfig,
        top_k: usize,
        classifier: Arc<Classifier>,
        shared: Arc<SharedState>,
        frames: Arc<FrameBuffer>,
        annotated: Arc<FrameBuffer>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let annotator = Annotator::new(&config);
        Self {
            config,
            top_k: top_k.max(1),
            classifier,
            shared,
            frames,
            annotated,
            annotator,
            event_bus,
            counters: CollectorCounters::default(),
        }
    }

    /// Subscription to the camera buffer for [`FrameCollector::run`].
    ///
    /// Take it before spawning the loop; frames published before this call
    /// are not delivered.
    pub fn subscribe(&self) -> FrameSubscriber {
        self.frames.subscribe()
    }

    pub fn annotated_frames(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.annotated)
    }

    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            frames_processed: self.counters.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
            frames_classified: self.counters.frames_classified.load(Ordering::Relaxed),
            classification_failures: self
                .counters
                .classification_failures
                .load(Ordering::Relaxed),
        }
    }

    /// Decode, crop, optionally classify, annotate and publish one frame.
    ///
    /// CPU-bound; call from a blocking context.
    pub fn process_frame(&self, frame: &FrameData) -> Result<CollectedFrame> {
        let image = image::load_from_memory(&frame.data)?;

        let region = CropRegion::centered(
            image.width(),
            image.height(),
            self.config.crop_size,
            self.config.crop_offset_x,
            self.config.crop_offset_y,
        );
        let crop = region.apply(&image);
        let mut canvas = crop.to_rgb8();

        let mut vote = None;
        if self.shared.is_active() {
            match self.classifier.classify(&crop, self.top_k) {
                Ok(predictions) => {
                    self.counters.frames_classified.fetch_add(1, Ordering::Relaxed);
                    if let Some(top) = predictions.first() {
                        if self.shared.record_vote(&top.label) {
                            debug!(
                                "Frame {} voted '{}' ({:.2})",
                                frame.id, top.label, top.confidence
                            );
                            vote = Some(top.label.clone());
                        }
                    }
                    self.annotator.annotate(&mut canvas, &predictions);
                }
                Err(e) => {
                    self.counters
                        .classification_failures
                        .fetch_add(1, Ordering::Relaxed);
                    warn!("Classification failed for frame {}: {}", frame.id, e);
                }
            }
        }

        let jpeg = encode_jpeg(&canvas, self.config.jpeg_quality)?;
        let annotated_id = self
            .annotated
            .publish(jpeg, canvas.width(), canvas.height());
        self.counters.frames_processed.fetch_add(1, Ordering::Relaxed);

        Ok(CollectedFrame {
            source_id: frame.id,
            annotated_id,
            vote,
        })
    }

    /// Process frames until `cancel` fires or the camera buffer goes away
    pub async fn run(self: Arc<Self>, mut frames: FrameSubscriber, cancel: CancellationToken) {
        info!("Frame collector started");
        let pace = std::time::Duration::from_millis(self.config.pace_ms);

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = frames.wait_for_next() => match frame {
                    Some(frame) => frame,
                    None => {
                        warn!("Frame source closed");
                        break;
                    }
                },
            };

            let frame_id = frame.id;
            let collector = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || collector.process_frame(&frame)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("Dropping frame {}: {}", frame_id, e);
                    self.event_bus.publish(SortcamEvent::FrameDropped {
                        frame_id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    error!("Frame processing task failed: {}", e);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pace) => {}
            }
        }

        info!("Frame collector stopped");
    }
}
