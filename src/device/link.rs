use super::port::{LinkPort, PortOpener};
use super::reset::UsbResetter;
use super::state::DeviceLinkState;
use crate::config::{DecisionConfig, SerialConfig};
use crate::decision::{DecisionCoordinator, DecisionOutcome};
use crate::error::SerialError;
use crate::events::{EventBus, SortcamEvent};
use crate::shared::SharedState;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lines drained per poll before the decision check runs
const MAX_LINES_PER_POLL: usize = 32;

struct ActivePort {
    path: String,
    port: Box<dyn LinkPort>,
}

#[derive(Debug, Default)]
struct LinkCounters {
    lines_received: AtomicU64,
    decisions_sent: AtomicU64,
    decisions_lost: AtomicU64,
    connections: AtomicU64,
    resets: AtomicU64,
}

/// Point-in-time link counters
#[derive(Debug, Clone, Serialize)]
pub struct LinkStats {
    pub lines_received: u64,
    pub decisions_sent: u64,
    pub decisions_lost: u64,
    pub connections: u64,
    pub resets: u64,
}

/// Serial connection to the actuator controller.
///
/// Owns the connection state machine: discovery over the configured device
/// paths, the line read loop, decision output and recovery via USB reset.
/// The state is only mutated from [`DeviceLink::run`]; `send` may be called
/// from anywhere.
pub struct DeviceLink {
    config: SerialConfig,
    trigger_token: String,
    opener: Arc<dyn PortOpener>,
    resetter: Arc<dyn UsbResetter>,
    shared: Arc<SharedState>,
    coordinator: DecisionCoordinator,
    event_bus: Arc<EventBus>,
    port: Mutex<Option<ActivePort>>,
    state: RwLock<DeviceLinkState>,
    counters: LinkCounters,
}

impl DeviceLink {
    pub fn new(
        config: SerialConfig,
        decision: &DecisionConfig,
        opener: Arc<dyn PortOpener>,
        resetter: Arc<dyn UsbResetter>,
        shared: Arc<SharedState>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            trigger_token: decision.trigger_token.clone(),
            opener,
            resetter,
            coordinator: DecisionCoordinator::new(Arc::clone(&shared), decision),
            shared,
            event_bus,
            port: Mutex::new(None),
            state: RwLock::new(DeviceLinkState::Disconnected),
            counters: LinkCounters::default(),
        }
    }

    pub fn state(&self) -> DeviceLinkState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.port.lock().is_some()
    }

    /// Path of the open device, if any
    pub fn connected_port(&self) -> Option<String> {
        self.port.lock().as_ref().map(|active| active.path.clone())
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            lines_received: self.counters.lines_received.load(Ordering::Relaxed),
            decisions_sent: self.counters.decisions_sent.load(Ordering::Relaxed),
            decisions_lost: self.counters.decisions_lost.load(Ordering::Relaxed),
            connections: self.counters.connections.load(Ordering::Relaxed),
            resets: self.counters.resets.load(Ordering::Relaxed),
        }
    }

    /// Write bytes to the open device. Fails immediately when no device is
    /// open; nothing is queued or retried.
    pub fn send(&self, bytes: &[u8]) -> Result<(), SerialError> {
        let mut guard = self.port.lock();
        let active = guard.as_mut().ok_or(SerialError::NotConnected)?;
        active
            .port
            .write_all(bytes)
            .map_err(|source| SerialError::Write {
                path: active.path.clone(),
                source,
            })
    }

    /// [`DeviceLink::send`] on the blocking pool, for callers running on the
    /// async runtime
    pub async fn send_async(self: Arc<Self>, bytes: Vec<u8>) -> Result<(), SerialError> {
        tokio::task::spawn_blocking(move || self.send(&bytes))
            .await
            .map_err(|e| SerialError::Task {
                details: e.to_string(),
            })?
    }

    /// Probe every candidate once, keeping the first that opens
    pub fn try_connect(&self) -> bool {
        self.close_port();

        for path in self.opener.candidates() {
            match self.opener.open(&path, self.config.baud_rate) {
                Ok(port) => {
                    *self.port.lock() = Some(ActivePort {
                        path: path.clone(),
                        port,
                    });
                    self.counters.connections.fetch_add(1, Ordering::Relaxed);
                    info!("Connected to controller on {}", path);
                    self.set_state(DeviceLinkState::Connected, Some(path));
                    return true;
                }
                Err(e) => debug!("Cannot open {}: {}", path, e),
            }
        }

        false
    }

    /// Drive the link until `cancel` fires. The port is closed on exit.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("Device link started");

        while !cancel.is_cancelled() {
            if !self.is_connected() {
                if !self.discover(&cancel).await {
                    break;
                }
                continue;
            }

            if let Err(e) = self.service() {
                self.handle_link_loss(e, &cancel).await;
                continue;
            }

            if !pause(self.config.poll_interval(), &cancel).await {
                break;
            }
        }

        self.close_port();
        self.set_state(DeviceLinkState::Disconnected, None);
        info!("Device link stopped");
    }

    /// One read-and-decide pass over an open link
    fn service(&self) -> Result<(), SerialError> {
        for _ in 0..MAX_LINES_PER_POLL {
            let line = {
                let mut guard = self.port.lock();
                let active = guard.as_mut().ok_or(SerialError::NotConnected)?;
                active
                    .port
                    .poll_line()
                    .map_err(|source| SerialError::Read {
                        path: active.path.clone(),
                        source,
                    })?
            };

            match line {
                Some(raw) => self.handle_line(raw),
                None => break,
            }
        }

        if let Some(outcome) = self.coordinator.poll() {
            self.emit(outcome)?;
        }

        Ok(())
    }

    fn handle_line(&self, raw: Vec<u8>) {
        self.counters.lines_received.fetch_add(1, Ordering::Relaxed);

        let text = match String::from_utf8(raw) {
            Ok(text) => text,
            Err(e) => {
                warn!("Controller sent invalid UTF-8; replacing undecodable bytes");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        let message = text.trim();
        if message.is_empty() {
            return;
        }

        info!("Controller message: {}", message);
        self.shared.push_log(message);

        if message == self.trigger_token {
            if self.shared.activate() {
                info!("Frame collection started");
            }
            self.event_bus.publish(SortcamEvent::TriggerReceived {
                timestamp: SystemTime::now(),
            });
        }
    }

    fn emit(&self, outcome: DecisionOutcome) -> Result<(), SerialError> {
        let result = self.send(outcome.code.as_bytes());
        let delivered = result.is_ok();

        if delivered {
            self.counters.decisions_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.decisions_lost.fetch_add(1, Ordering::Relaxed);
        }

        self.event_bus.publish(SortcamEvent::DecisionEmitted {
            decision: outcome.decision,
            majority: outcome.majority,
            code: outcome.code,
            delivered,
        });
        info!("Frame collection stopped and vote window cleared");

        result
    }

    /// Discovery passes, then a USB reset once the retries are exhausted.
    /// Returns false if cancelled.
    async fn discover(&self, cancel: &CancellationToken) -> bool {
        let retries = self.config.discovery_retries;
        let backoff = self.config.retry_backoff();

        self.set_state(DeviceLinkState::Discovering, None);

        for attempt in 1..=retries {
            if self.try_connect() {
                return true;
            }
            warn!(
                "Controller not found. Retrying in {:?} ({}/{})",
                backoff, attempt, retries
            );
            if !pause(backoff, cancel).await {
                return false;
            }
        }

        error!(
            "Failed to connect to controller after {} attempts; trying USB reset",
            retries
        );
        self.set_state(DeviceLinkState::Recovering, None);
        self.counters.resets.fetch_add(1, Ordering::Relaxed);

        let reset = tokio::select! {
            _ = cancel.cancelled() => return false,
            result = self.resetter.reset() => result,
        };

        match reset {
            Ok(()) => {
                info!("USB reset completed; retrying connection");
                pause(self.config.reset_settle(), cancel).await
            }
            Err(e) => {
                error!("USB reset failed: {}", e);
                self.event_bus.publish(SortcamEvent::SystemError {
                    component: "device_link".to_string(),
                    error: e.to_string(),
                });
                self.set_state(DeviceLinkState::Disconnected, None);
                pause(backoff, cancel).await
            }
        }
    }

    async fn handle_link_loss(&self, err: SerialError, cancel: &CancellationToken) {
        error!("Serial error: {}. Closing port and reconnecting", err);
        self.close_port();
        self.set_state(DeviceLinkState::Discovering, None);
        pause(self.config.reconnect_delay(), cancel).await;
    }

    fn close_port(&self) {
        if let Some(active) = self.port.lock().take() {
            debug!("Closing {}", active.path);
        }
    }

    fn set_state(&self, next: DeviceLinkState, port: Option<String>) {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, next)
        };

        if previous != next {
            self.event_bus.publish(SortcamEvent::LinkStateChanged {
                from: previous,
                to: next,
                port,
            });
        }
    }
}

/// Sleep unless cancelled first; returns false on cancellation
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
