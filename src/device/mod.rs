mod link;
mod log;
pub mod mock;
mod port;
mod reset;
mod state;

pub use link::{DeviceLink, LinkStats};
pub use log::LogRing;
pub use mock::{MockDevice, MockResetter};
pub use port::{LineBuffer, LinkPort, PortOpener, SerialLinkPort, SerialPortOpener};
pub use reset::{find_usb_id, CommandUsbResetter, UsbResetter};
pub use state::DeviceLinkState;
