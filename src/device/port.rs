use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// An open, line-oriented connection to the controller
pub trait LinkPort: Send {
    /// Return the next complete line if one is available, without blocking.
    /// The line excludes its terminator.
    fn poll_line(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Write bytes to the device
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Enumerates and opens candidate devices
pub trait PortOpener: Send + Sync {
    /// Device paths to probe, in the order they should be tried
    fn candidates(&self) -> Vec<String>;

    fn open(&self, path: &str, baud_rate: u32) -> io::Result<Box<dyn LinkPort>>;
}

/// Longest unterminated run kept before it is handed out as a partial line
pub const MAX_LINE_LEN: usize = 1024;

/// Accumulates raw bytes and splits them into `\n`-terminated lines.
///
/// A run of [`MAX_LINE_LEN`] bytes without a terminator is returned as a
/// line of its own, so a device that never sends `\n` cannot grow the buffer.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_LEN)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line: max_line.max(1),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Pop the oldest complete line, dropping the `\n` and any trailing `\r`
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let Some(end) = self.pending.iter().position(|&b| b == b'\n') else {
            if self.pending.len() < self.max_line {
                return None;
            }
            warn!(
                "No line terminator in {} bytes; passing them on as a partial line",
                self.max_line
            );
            return Some(self.pending.drain(..self.max_line).collect());
        };
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Serial adapter discovery by device path prefix
pub struct SerialPortOpener {
    patterns: Vec<String>,
    read_timeout: Duration,
}

impl SerialPortOpener {
    /// `patterns` are path prefixes such as `/dev/ttyUSB`; a trailing `*` is ignored
    pub fn new(patterns: Vec<String>) -> Self {
        let patterns = patterns
            .into_iter()
            .map(|p| p.trim_end_matches('*').to_string())
            .collect();
        Self {
            patterns,
            read_timeout: Duration::from_millis(10),
        }
    }

    fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| path.starts_with(pattern))
    }
}

impl PortOpener for SerialPortOpener {
    fn candidates(&self) -> Vec<String> {
        let mut found = Vec::new();

        // Group by pattern so the configured order wins over lexical order
        for pattern in &self.patterns {
            let dir = Path::new(pattern)
                .parent()
                .unwrap_or_else(|| Path::new("/dev"));

            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Cannot scan {}: {}", dir.display(), e);
                    continue;
                }
            };

            let mut matched: Vec<String> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path().to_string_lossy().into_owned())
                .filter(|path| path.starts_with(pattern.as_str()) && self.matches(path))
                .filter(|path| !found.contains(path))
                .collect();
            matched.sort();
            found.extend(matched);
        }

        trace!("Serial candidates: {:?}", found);
        found
    }

    fn open(&self, path: &str, baud_rate: u32) -> io::Result<Box<dyn LinkPort>> {
        let port = serialport::new(path, baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(io::Error::from)?;

        Ok(Box::new(SerialLinkPort {
            port,
            lines: LineBuffer::new(),
        }))
    }
}

/// [`LinkPort`] over a real serial device
pub struct SerialLinkPort {
    port: Box<dyn serialport::SerialPort>,
    lines: LineBuffer,
}

impl LinkPort for SerialLinkPort {
    fn poll_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(line) = self.lines.next_line() {
            return Ok(Some(line));
        }

        // An unplugged adapter surfaces here as an error from the ioctl
        let available = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if available == 0 {
            return Ok(None);
        }

        let mut chunk = vec![0u8; available];
        let read = match self.port.read(&mut chunk) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "device reported data but read returned nothing",
                ))
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => 0,
            Err(e) => return Err(e),
        };
        self.lines.extend(&chunk[..read]);

        Ok(self.lines.next_line())
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}
