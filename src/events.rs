use crate::decision::Decision;
use crate::device::DeviceLinkState;
use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the sorter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SortcamEvent {
    /// The device link moved between connection states
    LinkStateChanged {
        from: DeviceLinkState,
        to: DeviceLinkState,
        port: Option<String>,
    },
    /// The controller sent the trigger token and vote collection opened
    TriggerReceived { timestamp: SystemTime },
    /// A majority decision was written to the controller
    DecisionEmitted {
        decision: Decision,
        majority: Option<String>,
        code: String,
        delivered: bool,
    },
    /// A frame could not be decoded or processed
    FrameDropped { frame_id: u64, reason: String },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl SortcamEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SortcamEvent::LinkStateChanged { from, to, port } => match port {
                Some(port) => format!("Device link {} -> {} ({})", from, to, port),
                None => format!("Device link {} -> {}", from, to),
            },
            SortcamEvent::TriggerReceived { .. } => "Vote collection triggered".to_string(),
            SortcamEvent::DecisionEmitted {
                decision,
                majority,
                code,
                delivered,
            } => format!(
                "Decision {:?} (majority: {}, code: {}, delivered: {})",
                decision,
                majority.as_deref().unwrap_or("-"),
                code,
                delivered
            ),
            SortcamEvent::FrameDropped { frame_id, reason } => {
                format!("Frame {} dropped: {}", frame_id, reason)
            }
            SortcamEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            SortcamEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SortcamEvent::LinkStateChanged { .. } => "link_state_changed",
            SortcamEvent::TriggerReceived { .. } => "trigger_received",
            SortcamEvent::DecisionEmitted { .. } => "decision_emitted",
            SortcamEvent::FrameDropped { .. } => "frame_dropped",
            SortcamEvent::SystemError { .. } => "system_error",
            SortcamEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SortcamEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SortcamEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to events of the given types only
    pub fn subscribe_filtered(&self, event_types: Vec<&'static str>, name: &str) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            event_types,
            name: name.to_string(),
        }
    }

    /// Publish an event to all subscribers, returning how many received it.
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: SortcamEvent) -> usize {
        match &event {
            SortcamEvent::LinkStateChanged { to, .. } => match to {
                DeviceLinkState::Connected => info!("{}", event.description()),
                DeviceLinkState::Recovering => warn!("{}", event.description()),
                _ => debug!("{}", event.description()),
            },
            SortcamEvent::DecisionEmitted { delivered, .. } => {
                if *delivered {
                    info!("{}", event.description());
                } else {
                    warn!("{}", event.description());
                }
            }
            SortcamEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            SortcamEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => debug!("{}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event receiver that only yields the requested event types
pub struct EventReceiver {
    receiver: broadcast::Receiver<SortcamEvent>,
    event_types: Vec<&'static str>,
    name: String,
}

impl EventReceiver {
    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<SortcamEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.event_types.contains(&event.event_type()) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
