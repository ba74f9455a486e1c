use image::{GrayImage, Luma, RgbImage};

use crate::settings::BackgroundMode;

/// Separates the imaged disk from the scan background.
///
/// Returns an alpha plane of the input's size: 0 for background, 255 for retained foreground.
/// Colour values are never altered, and applying the remover to its own output changes nothing.
pub trait BackgroundRemover: Send + Sync {
    fn name(&self) -> &'static str;

    fn alpha(&self, image: &RgbImage) -> GrayImage;
}

/// Everything below or at `threshold` gray is background.
#[derive(Clone, Copy, Debug)]
pub struct LumaKey {
    pub threshold: u8,
}

impl BackgroundRemover for LumaKey {
    fn name(&self) -> &'static str {
        "luma-key"
    }

    fn alpha(&self, image: &RgbImage) -> GrayImage {
        let gray = image::imageops::grayscale(image);
        GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let level = gray.get_pixel(x, y).0[0];
            Luma([if level > self.threshold { 255 } else { 0 }])
        })
    }
}

pub fn build_remover(mode: BackgroundMode, threshold: u8) -> Option<Box<dyn BackgroundRemover>> {
    match mode {
        BackgroundMode::None => None,
        BackgroundMode::LumaKey => Some(Box::new(LumaKey { threshold })),
    }
}

/// Attach `alpha` to `image`; pixels outside the alpha plane stay opaque.
pub fn with_alpha(image: &RgbImage, alpha: &GrayImage) -> image::RgbaImage {
    image::RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let a = alpha.get_pixel_checked(x, y).map_or(255, |pixel| pixel.0[0]);
        image::Rgba([r, g, b, a])
    })
}
