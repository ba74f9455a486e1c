use std::fmt;

use image::{GrayImage, RgbImage};

/// Nominal capture instant as encoded in archive file names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaptureTime {
    pub year: u16,
    pub day_of_year: u16,
    pub seconds_of_day: u32,
}

impl CaptureTime {
    pub fn hhmmss(&self) -> String {
        let hours = self.seconds_of_day / 3600;
        let minutes = (self.seconds_of_day / 60) % 60;
        let seconds = self.seconds_of_day % 60;
        format!("{hours:02}{minutes:02}{seconds:02}")
    }
}

impl fmt::Display for CaptureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}.{}", self.year, self.day_of_year, self.hhmmss())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameMeta {
    pub satellite: String,
    pub capture: CaptureTime,
    pub band: String,
}

impl FrameMeta {
    /// Identifier shared by every artifact of this frame, e.g. `32A.1977.001.204500.vi`.
    ///
    /// Bands captured at the same instant are separate frames, so the band is part of it.
    pub fn frame_id(&self) -> String {
        format!("{}.{}.{}", self.satellite, self.capture, self.band)
    }
}

/// One scanned frame with its recognized text and optional background-removal alpha.
#[derive(Clone, Debug)]
pub struct SatelliteFrame {
    pub meta: FrameMeta,
    pub image: RgbImage,
    pub alpha: Option<GrayImage>,
    pub texts: Vec<String>,
}

impl SatelliteFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }
}
