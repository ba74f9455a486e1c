use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    Normal,
    /// Score fell below the sanity threshold; zero when the frame had no bright features.
    Low,
}

/// Rigid transform that moves a grid template onto a scanned frame.
///
/// `angle` is in degrees (counter-clockwise about the image center), `dx`/`dy` in pixels.
/// `score` counts pixels set in both the transformed template and the frame's bright mask.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AlignmentResult {
    pub angle: f32,
    pub dx: f32,
    pub dy: f32,
    pub score: u64,
    pub confidence: Confidence,
}

impl AlignmentResult {
    pub fn identity(confidence: Confidence) -> Self {
        Self {
            angle: 0.0,
            dx: 0.0,
            dy: 0.0,
            score: 0,
            confidence,
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence == Confidence::Low
    }
}
