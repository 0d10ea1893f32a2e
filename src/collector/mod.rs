mod core;
mod crop;
mod encode;
mod overlay;

pub use self::core::{CollectedFrame, CollectorStats, FrameCollector};
pub use crop::CropRegion;
pub use encode::encode_jpeg;
pub use overlay::Annotator;
