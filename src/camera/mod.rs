mod interface;
#[cfg(test)]
mod tests;

pub use interface::{pipeline_description, test_pattern, CameraInterface, CameraMode};
