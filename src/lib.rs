pub mod app;
pub mod camera;
pub mod classifier;
pub mod collector;
pub mod config;
pub mod decision;
pub mod device;
pub mod error;
pub mod events;
pub mod frame;
pub mod shared;
pub mod streaming;
pub mod votes;
pub mod worker;

pub use app::{ComponentState, ShutdownReason, SortcamOrchestrator};
pub use camera::CameraInterface;
pub use classifier::{Classifier, Prediction};
pub use collector::FrameCollector;
pub use config::SortcamConfig;
pub use decision::{Decision, DecisionCoordinator};
pub use device::{DeviceLink, DeviceLinkState};
pub use error::{Result, SortcamError};
pub use events::{EventBus, SortcamEvent};
pub use frame::{FrameBuffer, FrameData};
pub use shared::SharedState;
pub use streaming::{StreamServer, StreamServerBuilder};
pub use votes::VoteBuffer;
pub use worker::Worker;
