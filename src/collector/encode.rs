use crate::error::CameraError;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};

/// Encode an RGB image as baseline JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CameraError> {
    let mut output = Vec::with_capacity((image.width() * image.height() / 4) as usize);
    JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100))
        .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| CameraError::Encoding {
            details: e.to_string(),
        })?;
    Ok(output)
}
