use image::DynamicImage;

/// Square region of interest within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl CropRegion {
    /// Centre a `size`-sided square on the image centre plus the offset.
    ///
    /// A square that would leave the image is shifted back inside rather than
    /// shrunk. Only an image smaller than the square limits it, to its shorter side.
    pub fn centered(width: u32, height: u32, size: u32, offset_x: i32, offset_y: i32) -> Self {
        let size = size.min(width).min(height);
        let x = place(width, size, offset_x);
        let y = place(height, size, offset_y);
        Self { x, y, size }
    }

    pub fn apply(&self, image: &DynamicImage) -> DynamicImage {
        image.crop_imm(self.x, self.y, self.size, self.size)
    }
}

/// Start coordinate along one axis, clamped to `[0, extent - size]`
fn place(extent: u32, size: u32, offset: i32) -> u32 {
    let center = (extent / 2) as i64 + offset as i64;
    let start = center - (size / 2) as i64;
    start.clamp(0, (extent - size) as i64) as u32
}
