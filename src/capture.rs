use image::{DynamicImage, RgbaImage};
use screenshots::Screen;

/// Source of the full-screen snapshot taken once per effect invocation.
pub trait ScreenSource: Send + Sync {
    fn capture(&self) -> anyhow::Result<RgbaImage>;
}

/// Captures the primary display.
pub struct PrimaryScreen;

impl ScreenSource for PrimaryScreen {
    fn capture(&self) -> anyhow::Result<RgbaImage> {
        let screen = Screen::from_point(0, 0)?;
        Ok(screen.capture()?)
    }
}

/// Returns a fixed image instead of touching the display. Used by tests and
/// headless runs.
pub struct StaticScreen {
    image: RgbaImage,
}

impl StaticScreen {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, image::Rgba(rgba)),
        }
    }
}

impl ScreenSource for StaticScreen {
    fn capture(&self) -> anyhow::Result<RgbaImage> {
        Ok(self.image.clone())
    }
}

/// Reduce the capture to luminance, then widen back to RGBA so the base
/// frame composites uniformly with the alpha-carrying overlay.
pub fn grayscale_base(capture: &RgbaImage) -> RgbaImage {
    let gray = image::imageops::grayscale(capture);
    DynamicImage::ImageLuma8(gray).to_rgba8()
}
