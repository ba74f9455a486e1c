//! Shared data model for the grid-removal crates.

mod alignment;
mod frame;
mod mask;
mod subpoint;

pub use alignment::{AlignmentResult, Confidence};
pub use frame::{CaptureTime, FrameMeta, SatelliteFrame};
pub use mask::{BinaryMask, MaskError};
pub use subpoint::{Subpoint, SubpointLabel};
