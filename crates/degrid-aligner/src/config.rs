use crate::AlignError;

pub const DEFAULT_BRIGHT_THRESHOLD: u8 = 180;
pub const DEFAULT_MAX_ANGLE: f32 = 2.2;
pub const DEFAULT_ANGLE_STEP: f32 = 0.1;
pub const DEFAULT_MAX_SHIFT: f32 = 200.0;
pub const DEFAULT_HEADER_CROP_FRACTION: f32 = 1.0 / 12.0;
pub const DEFAULT_MIN_CONFIDENT_SCORE: u64 = 100;
pub const DEFAULT_DISK_THRESHOLD: u8 = 10;

#[derive(Clone, Debug, PartialEq)]
pub struct AlignerConfig {
    /// Gray level a pixel must exceed to count as a bright feature.
    pub bright_threshold: u8,
    /// Search bound in degrees; candidates span `[-max_angle, max_angle]`.
    pub max_angle: f32,
    pub angle_step: f32,
    /// Per-axis clamp on the correlation shift, in pixels.
    pub max_shift: f32,
    /// Fraction of rows at the top excluded from correlation and scoring.
    pub header_crop_fraction: f32,
    /// Best scores below this are reported as low confidence.
    pub min_confident_score: u64,
    pub recenter_disk: bool,
    /// Gray level separating the imaged disk from the dark background.
    pub disk_threshold: u8,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            bright_threshold: DEFAULT_BRIGHT_THRESHOLD,
            max_angle: DEFAULT_MAX_ANGLE,
            angle_step: DEFAULT_ANGLE_STEP,
            max_shift: DEFAULT_MAX_SHIFT,
            header_crop_fraction: DEFAULT_HEADER_CROP_FRACTION,
            min_confident_score: DEFAULT_MIN_CONFIDENT_SCORE,
            recenter_disk: false,
            disk_threshold: DEFAULT_DISK_THRESHOLD,
        }
    }
}

impl AlignerConfig {
    pub fn validate(&self) -> Result<(), AlignError> {
        if !self.max_angle.is_finite() || self.max_angle < 0.0 {
            return Err(AlignError::invalid("max_angle", self.max_angle));
        }
        if !self.angle_step.is_finite() || self.angle_step <= 0.0 {
            return Err(AlignError::invalid("angle_step", self.angle_step));
        }
        if !self.max_shift.is_finite() || self.max_shift < 0.0 {
            return Err(AlignError::invalid("max_shift", self.max_shift));
        }
        if !(0.0..1.0).contains(&self.header_crop_fraction) {
            return Err(AlignError::invalid(
                "header_crop_fraction",
                self.header_crop_fraction,
            ));
        }
        Ok(())
    }

    /// Rows excluded at the top of an image of the given height.
    pub fn header_rows(&self, height: u32) -> u32 {
        ((height as f32) * self.header_crop_fraction).floor() as u32
    }
}
