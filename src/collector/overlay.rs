use crate::classifier::Prediction;
use crate::config::CollectorConfig;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use rusttype::{Font, Scale};
use tracing::{debug, warn};

const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MARGIN: u32 = 10;

/// Draws `label: confidence` lines onto frames
pub struct Annotator {
    font: Option<Font<'static>>,
    scale: Scale,
    stride: u32,
}

impl Annotator {
    /// Load the overlay font. A missing or invalid font disables text
    /// rendering rather than failing the collector.
    pub fn new(config: &CollectorConfig) -> Self {
        let font = match std::fs::read(&config.font_path) {
            Ok(data) => match Font::try_from_vec(data) {
                Some(font) => Some(font),
                None => {
                    warn!("Failed to parse font file '{}'", config.font_path);
                    None
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read font file '{}': {}; predictions will not be drawn",
                    config.font_path, e
                );
                None
            }
        };

        Self {
            font,
            scale: Scale::uniform(config.font_size),
            stride: config.text_stride,
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw one line per prediction, `stride` pixels apart
    pub fn annotate(&self, image: &mut RgbImage, predictions: &[Prediction]) {
        let Some(font) = &self.font else {
            return;
        };

        for (i, prediction) in predictions.iter().enumerate() {
            let text = format!("{}: {:.2}", prediction.label, prediction.confidence);
            let x = MARGIN;
            let y = MARGIN + i as u32 * self.stride;

            let (text_width, text_height) = text_size(self.scale, font, &text);
            darken(image, x, y, text_width.max(0) as u32, text_height.max(0) as u32);

            draw_text_mut(image, TEXT_COLOR, x as i32, y as i32, self.scale, font, &text);
            debug!("Annotated prediction '{}'", text);
        }
    }
}

/// Dim the area behind a text line so it stays legible on bright frames
fn darken(image: &mut RgbImage, x: u32, y: u32, width: u32, height: u32) {
    let x0 = x.saturating_sub(4);
    let y0 = y.saturating_sub(4);
    for py in y0..(y + height + 4).min(image.height()) {
        for px in x0..(x + width + 4).min(image.width()) {
            let pixel = image.get_pixel(px, py);
            let dimmed = Rgb([pixel[0] / 3, pixel[1] / 3, pixel[2] / 3]);
            image.put_pixel(px, py, dimmed);
        }
    }
}
