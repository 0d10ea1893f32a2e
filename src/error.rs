use thiserror::Error;

#[derive(Error, Debug)]
pub enum SortcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Serial link error: {0}")]
    Serial(#[from] SerialError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl SortcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether the owning component can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            SortcamError::Config(_) | SortcamError::Serialization(_) => false,
            SortcamError::Model(ModelError::Load { .. })
            | SortcamError::Model(ModelError::Labels { .. })
            | SortcamError::Model(ModelError::Unavailable) => false,
            SortcamError::Stream(StreamError::BindFailed { .. }) => false,
            _ => true,
        }
    }
}

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Capture stream error: {details}")]
    CaptureStream { details: String },

    #[error("Frame encoding failed: {details}")]
    Encoding { details: String },
}

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("No serial device is connected")]
    NotConnected,

    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Read from {path} failed: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Write to {path} failed: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("USB reset failed: {details}")]
    Reset { details: String },

    #[error("Serial task failed: {details}")]
    Task { details: String },
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to load model {path}: {details}")]
    Load { path: String, details: String },

    #[error("Failed to load labels {path}: {details}")]
    Labels { path: String, details: String },

    #[error("Model invocation failed: {details}")]
    Invocation { details: String },

    #[error("Unexpected model output: {details}")]
    Output { details: String },

    #[error("Model runtime not available (built without the `onnx` feature)")]
    Unavailable,
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to receive event: {details}")]
    Lagged { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, SortcamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(SortcamError::Serial(SerialError::NotConnected).is_recoverable());
        assert!(SortcamError::Model(ModelError::Invocation {
            details: "boom".to_string()
        })
        .is_recoverable());
        assert!(!SortcamError::Model(ModelError::Unavailable).is_recoverable());
        assert!(!SortcamError::Config(config::ConfigError::Message("bad".to_string()))
            .is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = SortcamError::component("device_link", "port vanished");
        assert_eq!(
            err.to_string(),
            "Component error in device_link: port vanished"
        );

        let err = SerialError::Write {
            path: "/dev/ttyUSB0".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        };
        assert!(err.to_string().starts_with("Write to /dev/ttyUSB0 failed"));
    }
}
