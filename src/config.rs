use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SortcamConfig {
    pub camera: CameraConfig,
    pub model: ModelConfig,
    pub collector: CollectorConfig,
    pub decision: DecisionConfig,
    pub serial: SerialConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Camera resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Mirror the image horizontally, vertically or both
    #[serde(default)]
    pub flip: Flip,

    /// Generate test-pattern frames instead of opening a camera
    #[serde(default)]
    pub synthetic: bool,

    /// Full GStreamer pipeline description overriding the built-in one.
    /// Must end in an appsink named `sink` producing image/jpeg.
    #[serde(default)]
    pub pipeline: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    /// Path to the ONNX classification model
    #[serde(default = "default_model_path")]
    pub path: String,

    /// Path to the `index,label` file
    #[serde(default = "default_labels_path")]
    pub labels_path: String,

    /// Model input width in pixels
    #[serde(default = "default_model_input_size")]
    pub input_width: u32,

    /// Model input height in pixels
    #[serde(default = "default_model_input_size")]
    pub input_height: u32,

    /// Input tensor layout
    #[serde(default)]
    pub layout: TensorLayout,

    /// Number of ranked predictions returned per frame
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Predictions at or below this confidence are dropped
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Scale applied when the model emits quantized u8 scores
    #[serde(default = "default_output_scale")]
    pub output_scale: f32,

    /// Zero point applied when the model emits quantized u8 scores
    #[serde(default)]
    pub output_zero_point: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CollectorConfig {
    /// Side length of the square crop in pixels
    #[serde(default = "default_crop_size")]
    pub crop_size: u32,

    /// Horizontal offset of the crop centre from the image centre
    #[serde(default)]
    pub crop_offset_x: i32,

    /// Vertical offset of the crop centre from the image centre
    #[serde(default = "default_crop_offset_y")]
    pub crop_offset_y: i32,

    /// Pause between collector iterations
    #[serde(default = "default_collector_pace_ms")]
    pub pace_ms: u64,

    /// JPEG quality of the annotated frame
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Path to TrueType font file for prediction overlay
    #[serde(default = "default_font_path")]
    pub font_path: String,

    /// Font size for prediction overlay
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// Vertical distance between overlay lines
    #[serde(default = "default_text_stride")]
    pub text_stride: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DecisionConfig {
    /// Number of votes collected before a decision is taken
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Device message that opens a vote-collection window
    #[serde(default = "default_trigger_token")]
    pub trigger_token: String,

    /// Label that means the item passes
    #[serde(default = "default_positive_label")]
    pub positive_label: String,

    /// Label that means the item is rejected
    #[serde(default = "default_negative_label")]
    pub negative_label: String,

    #[serde(default = "default_positive_code")]
    pub positive_code: String,

    #[serde(default = "default_negative_code")]
    pub negative_code: String,

    #[serde(default = "default_skip_code")]
    pub skip_code: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SerialConfig {
    /// Device path prefixes probed during discovery
    #[serde(default = "default_port_patterns")]
    pub port_patterns: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Discovery passes before a USB reset is attempted
    #[serde(default = "default_discovery_retries")]
    pub discovery_retries: u32,

    /// Wait between discovery passes
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Wait after a link loss before rediscovering
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Wait after a successful USB reset
    #[serde(default = "default_reset_settle_ms")]
    pub reset_settle_ms: u64,

    /// Read loop polling period
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Number of device messages kept for the log endpoint
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Substring identifying the controller in `lsusb` output
    #[serde(default = "default_usb_device_match")]
    pub usb_device_match: String,

    /// Command invoked with the `vendor:product` id to reset the device
    #[serde(default = "default_usb_reset_command")]
    pub usb_reset_command: String,

    /// Replace the serial hardware with an in-process simulated controller
    #[serde(default)]
    pub simulate: bool,

    /// How often the simulated controller sends the trigger token
    #[serde(default = "default_simulate_trigger_interval_ms")]
    pub simulate_trigger_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    /// IP address to bind to
    #[serde(default = "default_stream_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_stream_port")]
    pub port: u16,

    /// HTML page served at `/`; a built-in page is used when unset or unreadable
    #[serde(default)]
    pub index_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Flip {
    #[default]
    None,
    H,
    V,
    Hv,
}

impl Flip {
    /// GStreamer `videoflip` method, if any flip is needed
    pub fn videoflip_method(&self) -> Option<&'static str> {
        match self {
            Flip::None => None,
            Flip::H => Some("horizontal-flip"),
            Flip::V => Some("vertical-flip"),
            Flip::Hv => Some("rotate-180"),
        }
    }
}

impl std::str::FromStr for Flip {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Flip::None),
            "h" => Ok(Flip::H),
            "v" => Ok(Flip::V),
            "hv" => Ok(Flip::Hv),
            other => Err(format!("unknown flip mode '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// [1, height, width, 3]
    #[default]
    Nhwc,
    /// [1, 3, height, width]
    Nchw,
}

impl SerialConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl SortcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("sortcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.flip", "none")?
            .set_default("camera.synthetic", false)?
            .set_default("model.path", default_model_path())?
            .set_default("model.labels_path", default_labels_path())?
            .set_default("model.input_width", default_model_input_size())?
            .set_default("model.input_height", default_model_input_size())?
            .set_default("model.layout", "nhwc")?
            .set_default("model.top_k", default_top_k() as i64)?
            .set_default("model.min_confidence", default_min_confidence() as f64)?
            .set_default("model.output_scale", default_output_scale() as f64)?
            .set_default("model.output_zero_point", 0i64)?
            .set_default("collector.crop_size", default_crop_size())?
            .set_default("collector.crop_offset_x", 0i64)?
            .set_default("collector.crop_offset_y", default_crop_offset_y() as i64)?
            .set_default("collector.pace_ms", default_collector_pace_ms() as i64)?
            .set_default("collector.jpeg_quality", default_jpeg_quality() as u32)?
            .set_default("collector.font_path", default_font_path())?
            .set_default("collector.font_size", default_font_size() as f64)?
            .set_default("collector.text_stride", default_text_stride())?
            .set_default("decision.window_size", default_window_size() as i64)?
            .set_default("decision.trigger_token", default_trigger_token())?
            .set_default("decision.positive_label", default_positive_label())?
            .set_default("decision.negative_label", default_negative_label())?
            .set_default("decision.positive_code", default_positive_code())?
            .set_default("decision.negative_code", default_negative_code())?
            .set_default("decision.skip_code", default_skip_code())?
            .set_default("serial.port_patterns", default_port_patterns())?
            .set_default("serial.baud_rate", default_baud_rate())?
            .set_default("serial.discovery_retries", default_discovery_retries())?
            .set_default("serial.retry_backoff_ms", default_retry_backoff_ms() as i64)?
            .set_default("serial.reconnect_delay_ms", default_reconnect_delay_ms() as i64)?
            .set_default("serial.reset_settle_ms", default_reset_settle_ms() as i64)?
            .set_default("serial.poll_interval_ms", default_poll_interval_ms() as i64)?
            .set_default("serial.log_capacity", default_log_capacity() as i64)?
            .set_default("serial.usb_device_match", default_usb_device_match())?
            .set_default("serial.usb_reset_command", default_usb_reset_command())?
            .set_default("serial.simulate", false)?
            .set_default(
                "serial.simulate_trigger_interval_ms",
                default_simulate_trigger_interval_ms() as i64,
            )?
            .set_default("stream.ip", default_stream_ip())?
            .set_default("stream.port", default_stream_port())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. SORTCAM_SERIAL__BAUD_RATE=115200
            .add_source(
                Environment::with_prefix("SORTCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: SortcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(ConfigError::Message(
                "Model input size must be greater than 0".to_string(),
            ));
        }

        if self.model.top_k == 0 {
            return Err(ConfigError::Message(
                "Model top_k must be greater than 0".to_string(),
            ));
        }

        if self.model.output_scale <= 0.0 {
            return Err(ConfigError::Message(
                "Model output_scale must be positive".to_string(),
            ));
        }

        if self.collector.crop_size == 0 {
            return Err(ConfigError::Message(
                "Collector crop_size must be greater than 0".to_string(),
            ));
        }

        if self.collector.jpeg_quality == 0 || self.collector.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Collector jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.decision.window_size == 0 || self.decision.window_size > 10_000 {
            return Err(ConfigError::Message(
                "Decision window_size must be between 1 and 10000".to_string(),
            ));
        }

        if self.decision.trigger_token.trim().is_empty() {
            return Err(ConfigError::Message(
                "Decision trigger_token must not be empty".to_string(),
            ));
        }

        if self.decision.positive_label == self.decision.negative_label {
            return Err(ConfigError::Message(
                "Decision positive_label and negative_label must differ".to_string(),
            ));
        }

        if self.serial.port_patterns.is_empty() && !self.serial.simulate {
            return Err(ConfigError::Message(
                "Serial port_patterns must not be empty".to_string(),
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Message(
                "Serial baud_rate must be greater than 0".to_string(),
            ));
        }

        if self.serial.discovery_retries == 0 {
            return Err(ConfigError::Message(
                "Serial discovery_retries must be greater than 0".to_string(),
            ));
        }

        if self.serial.log_capacity == 0 {
            return Err(ConfigError::Message(
                "Serial log_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SortcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                flip: Flip::None,
                synthetic: false,
                pipeline: None,
            },
            model: ModelConfig {
                path: default_model_path(),
                labels_path: default_labels_path(),
                input_width: default_model_input_size(),
                input_height: default_model_input_size(),
                layout: TensorLayout::Nhwc,
                top_k: default_top_k(),
                min_confidence: default_min_confidence(),
                output_scale: default_output_scale(),
                output_zero_point: 0,
            },
            collector: CollectorConfig {
                crop_size: default_crop_size(),
                crop_offset_x: 0,
                crop_offset_y: default_crop_offset_y(),
                pace_ms: default_collector_pace_ms(),
                jpeg_quality: default_jpeg_quality(),
                font_path: default_font_path(),
                font_size: default_font_size(),
                text_stride: default_text_stride(),
            },
            decision: DecisionConfig {
                window_size: default_window_size(),
                trigger_token: default_trigger_token(),
                positive_label: default_positive_label(),
                negative_label: default_negative_label(),
                positive_code: default_positive_code(),
                negative_code: default_negative_code(),
                skip_code: default_skip_code(),
            },
            serial: SerialConfig {
                port_patterns: default_port_patterns(),
                baud_rate: default_baud_rate(),
                discovery_retries: default_discovery_retries(),
                retry_backoff_ms: default_retry_backoff_ms(),
                reconnect_delay_ms: default_reconnect_delay_ms(),
                reset_settle_ms: default_reset_settle_ms(),
                poll_interval_ms: default_poll_interval_ms(),
                log_capacity: default_log_capacity(),
                usb_device_match: default_usb_device_match(),
                usb_reset_command: default_usb_reset_command(),
                simulate: false,
                simulate_trigger_interval_ms: default_simulate_trigger_interval_ms(),
            },
            stream: StreamConfig {
                ip: default_stream_ip(),
                port: default_stream_port(),
                index_path: None,
            },
        }
    }
}

// Default value functions
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}

fn default_model_path() -> String {
    "data/model.onnx".to_string()
}
fn default_labels_path() -> String {
    "data/labels.csv".to_string()
}
fn default_model_input_size() -> u32 {
    224
}
fn default_top_k() -> usize {
    1
}
fn default_min_confidence() -> f32 {
    0.01
}
fn default_output_scale() -> f32 {
    1.0 / 256.0
}

fn default_crop_size() -> u32 {
    400
}
fn default_crop_offset_y() -> i32 {
    -40
}
fn default_collector_pace_ms() -> u64 {
    100
}
fn default_jpeg_quality() -> u8 {
    85
}
fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_font_size() -> f32 {
    28.0
}
fn default_text_stride() -> u32 {
    30
}

fn default_window_size() -> usize {
    50
}
fn default_trigger_token() -> String {
    "Starting motors".to_string()
}
fn default_positive_label() -> String {
    "good".to_string()
}
fn default_negative_label() -> String {
    "bad".to_string()
}
fn default_positive_code() -> String {
    "GOOD".to_string()
}
fn default_negative_code() -> String {
    "BAD".to_string()
}
fn default_skip_code() -> String {
    "SKIP".to_string()
}

fn default_port_patterns() -> Vec<String> {
    vec!["/dev/ttyUSB".to_string(), "/dev/ttyACM".to_string()]
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_discovery_retries() -> u32 {
    10
}
fn default_retry_backoff_ms() -> u64 {
    5000
}
fn default_reconnect_delay_ms() -> u64 {
    2000
}
fn default_reset_settle_ms() -> u64 {
    3000
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_log_capacity() -> usize {
    20
}
fn default_usb_device_match() -> String {
    "Arduino".to_string()
}
fn default_usb_reset_command() -> String {
    "usbreset".to_string()
}
fn default_simulate_trigger_interval_ms() -> u64 {
    15_000
}

fn default_stream_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_stream_port() -> u16 {
    8000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SortcamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.decision.window_size, 50);
        assert_eq!(config.collector.crop_size, 400);
        assert_eq!(config.collector.crop_offset_y, -40);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.log_capacity, 20);
        assert_eq!(config.stream.port, 8000);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = SortcamConfig::load_from_file("/nonexistent/sortcam-test.toml").unwrap();
        assert_eq!(config.camera.resolution, (640, 480));
        assert_eq!(config.model.layout, TensorLayout::Nhwc);
        assert_eq!(config.camera.flip, Flip::None);
        assert_eq!(
            config.serial.port_patterns,
            vec!["/dev/ttyUSB".to_string(), "/dev/ttyACM".to_string()]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[camera]
flip = "hv"

[decision]
window_size = 10
positive_label = "ok"

[serial]
baud_rate = 115200
port_patterns = ["/dev/ttyS"]
"#
        )
        .unwrap();

        let config = SortcamConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.camera.flip, Flip::Hv);
        assert_eq!(config.decision.window_size, 10);
        assert_eq!(config.decision.positive_label, "ok");
        assert_eq!(config.decision.negative_label, "bad");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.port_patterns, vec!["/dev/ttyS".to_string()]);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SortcamConfig::default();
        config.decision.window_size = 0;
        assert!(config.validate().is_err());

        config.decision.window_size = 50;
        config.decision.negative_label = config.decision.positive_label.clone();
        assert!(config.validate().is_err());

        config.decision.negative_label = "bad".to_string();
        config.serial.discovery_retries = 0;
        assert!(config.validate().is_err());

        config.serial.discovery_retries = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flip_parsing() {
        assert_eq!("h".parse::<Flip>().unwrap(), Flip::H);
        assert_eq!("hv".parse::<Flip>().unwrap(), Flip::Hv);
        assert!("sideways".parse::<Flip>().is_err());
        assert_eq!(Flip::None.videoflip_method(), None);
        assert_eq!(Flip::V.videoflip_method(), Some("vertical-flip"));
    }

    #[test]
    fn test_default_config_serializes_to_toml() {
        let rendered = toml::to_string_pretty(&SortcamConfig::default()).unwrap();
        assert!(rendered.contains("[serial]"));
        assert!(rendered.contains("trigger_token = \"Starting motors\""));
    }
}
