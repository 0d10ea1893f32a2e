use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of the controller link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceLinkState {
    Disconnected,
    Discovering,
    Connected,
    Recovering,
}

impl fmt::Display for DeviceLinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceLinkState::Disconnected => "disconnected",
            DeviceLinkState::Discovering => "discovering",
            DeviceLinkState::Connected => "connected",
            DeviceLinkState::Recovering => "recovering",
        };
        f.write_str(name)
    }
}
