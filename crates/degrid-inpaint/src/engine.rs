use degrid_types::BinaryMask;
use image::{Rgb, RgbImage};

use crate::InpaintError;

/// Replaces masked pixels with a reconstruction; unmasked pixels are returned untouched.
pub trait InpaintEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn inpaint(&self, image: &RgbImage, mask: &BinaryMask) -> Result<RgbImage, InpaintError>;
}

const MARK: Rgb<u8> = Rgb([0, 255, 0]);

/// Paint masked pixels pure green to show the region about to be reconstructed.
pub fn mark_artifact(image: &RgbImage, mask: &BinaryMask) -> Result<RgbImage, InpaintError> {
    mask.ensure_size(image.width(), image.height())?;
    let mut marked = image.clone();
    for (x, y, pixel) in marked.enumerate_pixels_mut() {
        if mask.get(x, y) {
            *pixel = MARK;
        }
    }
    Ok(marked)
}
