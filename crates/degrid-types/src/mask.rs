use image::{GrayImage, Luma, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaskError {
    #[error("mask data length {data_len} does not match {width}x{height}")]
    LengthMismatch {
        data_len: usize,
        width: u32,
        height: u32,
    },
    #[error("mask is {mask_width}x{mask_height} but the image is {image_width}x{image_height}")]
    SizeMismatch {
        mask_width: u32,
        mask_height: u32,
        image_width: u32,
        image_height: u32,
    },
}

/// Single-bit raster stored one byte per pixel (0 or 1), row-major without padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    bits: Vec<u8>,
}

impl BinaryMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![0; width as usize * height as usize],
        }
    }

    /// Build from raw bytes; any non-zero byte counts as set.
    pub fn from_raw(width: u32, height: u32, mut bits: Vec<u8>) -> Result<Self, MaskError> {
        if bits.len() != width as usize * height as usize {
            return Err(MaskError::LengthMismatch {
                data_len: bits.len(),
                width,
                height,
            });
        }
        for bit in &mut bits {
            *bit = u8::from(*bit != 0);
        }
        Ok(Self {
            width,
            height,
            bits,
        })
    }

    /// Pixels strictly brighter than `threshold` are set.
    pub fn from_luma_threshold(gray: &GrayImage, threshold: u8) -> Self {
        let bits = gray
            .as_raw()
            .iter()
            .map(|&value| u8::from(value > threshold))
            .collect();
        Self {
            width: gray.width(),
            height: gray.height(),
            bits,
        }
    }

    /// Pixels with any opacity are set.
    pub fn from_alpha(rgba: &RgbaImage) -> Self {
        let bits = rgba.pixels().map(|px| u8::from(px.0[3] > 0)).collect();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            bits,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[y as usize * self.width as usize + x as usize] != 0
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.bits[y as usize * self.width as usize + x as usize] = u8::from(value);
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.width as usize;
        &self.bits[start..start + self.width as usize]
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.bits
    }

    pub fn count(&self) -> u64 {
        self.bits.iter().map(|&bit| u64::from(bit)).sum()
    }

    pub fn is_blank(&self) -> bool {
        self.bits.iter().all(|&bit| bit == 0)
    }

    /// Number of pixels set in both masks, ignoring rows above `from_row`.
    pub fn overlap(&self, other: &BinaryMask, from_row: u32) -> u64 {
        debug_assert_eq!(self.dimensions(), other.dimensions());
        let start = (from_row.min(self.height) as usize) * self.width as usize;
        self.bits[start..]
            .iter()
            .zip(&other.bits[start..])
            .map(|(&a, &b)| u64::from(a & b))
            .sum()
    }

    pub fn ensure_size(&self, width: u32, height: u32) -> Result<(), MaskError> {
        if self.width == width && self.height == height {
            return Ok(());
        }
        Err(MaskError::SizeMismatch {
            mask_width: self.width,
            mask_height: self.height,
            image_width: width,
            image_height: height,
        })
    }

    /// Render as a 0/255 grayscale image.
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn threshold_is_strict() {
        let gray = GrayImage::from_raw(3, 1, vec![179, 180, 181]).unwrap();
        let mask = BinaryMask::from_luma_threshold(&gray, 180);
        assert_eq!(mask.as_raw(), &[0, 0, 1]);
    }

    #[test]
    fn alpha_marks_any_opacity() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(1, 0, Rgba([0, 0, 0, 1]));
        let mask = BinaryMask::from_alpha(&rgba);
        assert!(!mask.get(0, 0));
        assert!(mask.get(1, 0));
    }

    #[test]
    fn overlap_skips_header_rows() {
        let a = BinaryMask::from_raw(2, 2, vec![1, 1, 1, 0]).unwrap();
        let b = BinaryMask::from_raw(2, 2, vec![1, 1, 1, 1]).unwrap();
        assert_eq!(a.overlap(&b, 0), 3);
        assert_eq!(a.overlap(&b, 1), 1);
        assert_eq!(a.overlap(&b, 5), 0);
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(matches!(
            BinaryMask::from_raw(2, 2, vec![0; 3]),
            Err(MaskError::LengthMismatch { .. })
        ));
    }
}
