use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::trace;

/// Encoded JPEG frame plus capture metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Frame identifier, strictly increasing per buffer
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// JPEG bytes (shared ownership so readers clone cheaply)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels (0 if unknown)
    pub width: u32,
    /// Frame height in pixels (0 if unknown)
    pub height: u32,
}

impl FrameData {
    pub fn new(id: u64, timestamp: SystemTime, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Milliseconds since the Unix epoch at capture time
    pub fn timestamp_millis(&self) -> u128 {
        self.timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
    }
}

/// Single-slot, latest-value-wins frame holder.
///
/// Publishing overwrites the slot and wakes every subscriber; it never waits
/// on readers. Subscribers track the id of the last frame they saw, so a slow
/// consumer skips intermediate frames instead of queueing them.
pub struct FrameBuffer {
    sender: watch::Sender<Option<FrameData>>,
    frame_counter: AtomicU64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender,
            frame_counter: AtomicU64::new(0),
        }
    }

    /// Store encoded bytes as the newest frame, returning the assigned id
    pub fn publish(&self, data: Vec<u8>, width: u32, height: u32) -> u64 {
        let id = self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = FrameData::new(id, SystemTime::now(), data, width, height);
        trace!("Publishing frame {} ({} bytes)", id, frame.data.len());
        self.sender.send_replace(Some(frame));
        id
    }

    /// The current frame, if any, without waiting
    pub fn latest(&self) -> Option<FrameData> {
        self.sender.borrow().clone()
    }

    /// Subscribe for frames published after this call
    pub fn subscribe(&self) -> FrameSubscriber {
        let receiver = self.sender.subscribe();
        let last_seen = receiver.borrow().as_ref().map(|f| f.id).unwrap_or(0);
        FrameSubscriber {
            receiver,
            last_seen,
        }
    }

    /// Total number of frames published so far
    pub fn frames_published(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of a [`FrameBuffer`]
pub struct FrameSubscriber {
    receiver: watch::Receiver<Option<FrameData>>,
    last_seen: u64,
}

impl FrameSubscriber {
    /// Wait until a frame newer than the last one observed is available.
    ///
    /// Returns `None` once the buffer has been dropped.
    pub async fn wait_for_next(&mut self) -> Option<FrameData> {
        loop {
            {
                let current = self.receiver.borrow_and_update();
                if let Some(frame) = current.as_ref() {
                    if frame.id > self.last_seen {
                        self.last_seen = frame.id;
                        return Some(frame.clone());
                    }
                }
            }

            if self.receiver.changed().await.is_err() {
                return None;
            }
        }
    }

    /// The current frame regardless of whether it was already observed
    pub fn current(&mut self) -> Option<FrameData> {
        let current = self.receiver.borrow_and_update();
        let frame = current.as_ref().cloned();
        if let Some(frame) = &frame {
            self.last_seen = self.last_seen.max(frame.id);
        }
        frame
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}
