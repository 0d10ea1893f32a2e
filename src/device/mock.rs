use super::port::{LinkPort, PortOpener};
use super::reset::UsbResetter;
use crate::error::SerialError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
enum MockInput {
    Line(Vec<u8>),
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct MockState {
    present: bool,
    incoming: VecDeque<MockInput>,
    written: Vec<Vec<u8>>,
    open_handles: usize,
    open_count: usize,
    fail_writes: bool,
    write_delay: Duration,
}

/// In-process stand-in for the serial controller.
///
/// Behaves like an exclusive device: only one handle may be open at a time,
/// and reopening requires the previous handle to have been dropped.
#[derive(Debug, Clone)]
pub struct MockDevice {
    path: String,
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    /// A connected device at `/dev/ttyMOCK0`
    pub fn new() -> Self {
        let device = Self::absent();
        device.set_present(true);
        device
    }

    /// A device that is not plugged in yet
    pub fn absent() -> Self {
        Self {
            path: "/dev/ttyMOCK0".to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_present(&self, present: bool) {
        self.state.lock().present = present;
    }

    /// Queue a line the device will send, terminator excluded
    pub fn push_line(&self, line: &str) {
        self.push_raw(line.as_bytes().to_vec());
    }

    pub fn push_raw(&self, bytes: Vec<u8>) {
        self.state.lock().incoming.push_back(MockInput::Line(bytes));
    }

    /// Make the next read fail, as an unplugged adapter would
    pub fn push_error(&self, kind: io::ErrorKind) {
        self.state.lock().incoming.push_back(MockInput::Error(kind));
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Make every write block the calling thread for `delay`, like a slow UART
    pub fn set_write_delay(&self, delay: Duration) {
        self.state.lock().write_delay = delay;
    }

    /// Everything written to the device so far, decoded lossily
    pub fn written(&self) -> Vec<String> {
        self.state
            .lock()
            .written
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    pub fn take_written(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().written)
            .into_iter()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .collect()
    }

    /// Handles currently open
    pub fn open_handles(&self) -> usize {
        self.state.lock().open_handles
    }

    /// Successful opens since creation
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl PortOpener for MockDevice {
    fn candidates(&self) -> Vec<String> {
        if self.state.lock().present {
            vec![self.path.clone()]
        } else {
            Vec::new()
        }
    }

    fn open(&self, path: &str, _baud_rate: u32) -> io::Result<Box<dyn LinkPort>> {
        let mut state = self.state.lock();
        if !state.present || path != self.path {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such device"));
        }
        if state.open_handles > 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "device busy"));
        }
        state.open_handles += 1;
        state.open_count += 1;

        Ok(Box::new(MockPort {
            state: Arc::clone(&self.state),
        }))
    }
}

/// Open handle onto a [`MockDevice`]
pub struct MockPort {
    state: Arc<Mutex<MockState>>,
}

impl LinkPort for MockPort {
    fn poll_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.state.lock().incoming.pop_front() {
            Some(MockInput::Line(line)) => Ok(Some(line)),
            Some(MockInput::Error(kind)) => Err(io::Error::new(kind, "mock read failure")),
            None => Ok(None),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let delay = self.state.lock().write_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        state.written.push(bytes.to_vec());
        Ok(())
    }
}

impl Drop for MockPort {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.open_handles = state.open_handles.saturating_sub(1);
    }
}

/// Resetter that counts invocations and can plug a [`MockDevice`] back in
#[derive(Debug, Default)]
pub struct MockResetter {
    resets: AtomicUsize,
    revives: Option<MockDevice>,
    fail: bool,
}

impl MockResetter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `device` present when a reset happens
    pub fn reviving(device: MockDevice) -> Self {
        Self {
            revives: Some(device),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsbResetter for MockResetter {
    async fn reset(&self) -> Result<(), SerialError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SerialError::Reset {
                details: "mock reset failure".to_string(),
            });
        }
        if let Some(device) = &self.revives {
            device.set_present(true);
        }
        Ok(())
    }
}
