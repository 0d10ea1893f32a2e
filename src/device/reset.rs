use crate::error::SerialError;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Power-cycles the controller's USB connection
#[async_trait]
pub trait UsbResetter: Send + Sync {
    async fn reset(&self) -> Result<(), SerialError>;
}

/// Resets the device by looking up its `vendor:product` id with `lsusb` and
/// handing it to an external reset command, through `sudo -n` unless root.
pub struct CommandUsbResetter {
    device_match: String,
    reset_command: String,
}

impl CommandUsbResetter {
    pub fn new<S: Into<String>>(device_match: S, reset_command: S) -> Self {
        Self {
            device_match: device_match.into(),
            reset_command: reset_command.into(),
        }
    }

    async fn lookup_usb_id(&self) -> Result<String, SerialError> {
        let output = Command::new("lsusb")
            .output()
            .await
            .map_err(|e| SerialError::Reset {
                details: format!("failed to run lsusb: {}", e),
            })?;

        if !output.status.success() {
            return Err(SerialError::Reset {
                details: format!("lsusb exited with {}", output.status),
            });
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        find_usb_id(&listing, &self.device_match).ok_or_else(|| SerialError::Reset {
            details: format!("no USB device matching '{}'", self.device_match),
        })
    }
}

#[async_trait]
impl UsbResetter for CommandUsbResetter {
    async fn reset(&self) -> Result<(), SerialError> {
        let usb_id = self.lookup_usb_id().await?;
        info!("Resetting USB device {} ({})", usb_id, self.device_match);

        let is_root = unsafe { libc::geteuid() } == 0;
        let mut command = if is_root {
            Command::new(&self.reset_command)
        } else {
            let mut sudo = Command::new("sudo");
            sudo.arg("-n").arg(&self.reset_command);
            sudo
        };
        command.arg(&usb_id);

        let status = command.status().await.map_err(|e| SerialError::Reset {
            details: format!("failed to run {}: {}", self.reset_command, e),
        })?;

        if status.success() {
            debug!("USB reset command completed");
            Ok(())
        } else {
            warn!("USB reset command exited with {}", status);
            Err(SerialError::Reset {
                details: format!("{} exited with {}", self.reset_command, status),
            })
        }
    }
}

/// Extract the `vendor:product` id of the first `lsusb` line containing `needle`
pub fn find_usb_id(listing: &str, needle: &str) -> Option<String> {
    listing
        .lines()
        .find(|line| line.contains(needle))
        .and_then(|line| line.split_whitespace().nth(5))
        .filter(|id| id.contains(':'))
        .map(str::to_string)
}
