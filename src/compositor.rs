use anyhow::Context;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use rand::Rng;
use std::path::Path;

/// Scale factor that fits `overlay` within `max_ratio` of `screen` in both
/// dimensions. Clamped to 1 so overlays are never upscaled.
pub fn fit_scale(screen: (u32, u32), overlay: (u32, u32), max_ratio: f32) -> f32 {
    let max_w = screen.0 as f32 * max_ratio;
    let max_h = screen.1 as f32 * max_ratio;
    let scale_w = max_w / overlay.0 as f32;
    let scale_h = max_h / overlay.1 as f32;
    1.0_f32.min(scale_w).min(scale_h)
}

/// Apply the size-cap policy to a decoded overlay. Downscale only, aspect
/// ratio preserved, high-quality resampling.
pub fn scale_overlay(overlay: RgbaImage, screen: (u32, u32), max_ratio: f32) -> RgbaImage {
    let (ow, oh) = overlay.dimensions();
    let scale = fit_scale(screen, (ow, oh), max_ratio);
    if scale >= 1.0 {
        return overlay;
    }
    let new_w = ((ow as f32 * scale) as u32).max(1);
    let new_h = ((oh as f32 * scale) as u32).max(1);
    imageops::resize(&overlay, new_w, new_h, FilterType::Lanczos3)
}

/// Decode the chosen overlay image with its alpha channel preserved.
pub fn load_overlay(path: &Path) -> anyhow::Result<RgbaImage> {
    let img = image::open(path)
        .with_context(|| format!("failed to load overlay image {}", path.display()))?;
    Ok(img.to_rgba8())
}

/// Per-frame displacement, each component uniform in `[-amplitude, amplitude]`.
pub fn sample_jitter<R: Rng>(rng: &mut R, amplitude: i32) -> (i32, i32) {
    if amplitude == 0 {
        return (0, 0);
    }
    (
        rng.gen_range(-amplitude..=amplitude),
        rng.gen_range(-amplitude..=amplitude),
    )
}

/// Owns the base frame and overlay for one invocation and composes them
/// into a reusable frame buffer at a given jitter offset.
pub struct Compositor {
    base: RgbaImage,
    overlay: RgbaImage,
    frame: RgbaImage,
}

impl Compositor {
    /// `capture` is the already-desaturated base frame; `overlay` is decoded
    /// at its native size and capped here.
    pub fn new(capture: RgbaImage, overlay: RgbaImage, max_ratio: f32) -> Self {
        let dims = capture.dimensions();
        let overlay = scale_overlay(overlay, dims, max_ratio);
        let frame = RgbaImage::new(dims.0, dims.1);
        Self {
            base: capture,
            overlay,
            frame,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.base.dimensions()
    }

    pub fn overlay_dimensions(&self) -> (u32, u32) {
        self.overlay.dimensions()
    }

    /// Clear, draw the base at the jitter offset (running off-bounds at the
    /// edges), then the overlay centered plus the same offset.
    pub fn compose(&mut self, (dx, dy): (i32, i32)) -> &RgbaImage {
        self.frame.fill(0);
        imageops::overlay(&mut self.frame, &self.base, dx as i64, dy as i64);

        let (w, h) = self.base.dimensions();
        let (ow, oh) = self.overlay.dimensions();
        let left = w as i64 / 2 - ow as i64 / 2 + dx as i64;
        let top = h as i64 / 2 - oh as i64 / 2 + dy as i64;
        imageops::overlay(&mut self.frame, &self.overlay, left, top);
        &self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn fit_scale_is_one_when_overlay_already_fits() {
        assert_eq!(fit_scale((1000, 1000), (600, 600), 0.6), 1.0);
        assert_eq!(fit_scale((1000, 1000), (100, 50), 0.6), 1.0);
    }

    #[test]
    fn fitting_overlay_keeps_exact_dimensions() {
        let overlay = RgbaImage::new(600, 400);
        let scaled = scale_overlay(overlay, (1000, 1000), 0.6);
        assert_eq!(scaled.dimensions(), (600, 400));
    }

    #[test]
    fn oversized_overlay_is_bounded_and_aspect_preserved() {
        let overlay = RgbaImage::new(2000, 1000);
        let scaled = scale_overlay(overlay, (1000, 800), 0.6);
        let (w, h) = scaled.dimensions();
        assert!(w <= 600);
        assert!(h <= 480);
        // 2:1 within rounding
        let aspect = w as f32 / h as f32;
        assert!((aspect - 2.0).abs() < 0.02, "aspect was {aspect}");
    }

    #[test]
    fn jitter_components_stay_within_amplitude() {
        let mut rng = StdRng::seed_from_u64(3);
        for amplitude in [0, 1, 18, 100] {
            for _ in 0..500 {
                let (dx, dy) = sample_jitter(&mut rng, amplitude);
                assert!(dx >= -amplitude && dx <= amplitude);
                assert!(dy >= -amplitude && dy <= amplitude);
            }
        }
    }

    #[test]
    fn compose_centers_overlay_and_offsets_base() {
        let base = RgbaImage::from_pixel(8, 8, image::Rgba([100, 100, 100, 255]));
        let overlay = RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
        let mut compositor = Compositor::new(base, overlay, 0.6);

        let frame = compositor.compose((0, 0));
        // overlay occupies [3, 5) x [3, 5)
        assert_eq!(frame.get_pixel(3, 3).0, [255, 0, 0, 255]);
        assert_eq!(frame.get_pixel(4, 4).0, [255, 0, 0, 255]);
        assert_eq!(frame.get_pixel(2, 2).0, [100, 100, 100, 255]);

        let frame = compositor.compose((2, 0));
        // base shifted right: the first two columns are cleared
        assert_eq!(frame.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(frame.get_pixel(1, 7).0, [0, 0, 0, 0]);
        assert_eq!(frame.get_pixel(2, 0).0, [100, 100, 100, 255]);
        // overlay follows the same offset
        assert_eq!(frame.get_pixel(5, 3).0, [255, 0, 0, 255]);
    }

    #[test]
    fn translucent_overlay_blends_over_base() {
        let base = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]));
        let overlay = RgbaImage::from_pixel(2, 2, image::Rgba([255, 255, 255, 128]));
        let mut compositor = Compositor::new(base, overlay, 1.0);

        let frame = compositor.compose((0, 0));
        let [r, _, _, a] = frame.get_pixel(1, 1).0;
        assert!(r > 0 && r < 255, "expected a blend, got {r}");
        assert_eq!(a, 255);
    }
}
