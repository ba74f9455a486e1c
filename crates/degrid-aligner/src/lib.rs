//! Rigid registration of a grid template against a scanned frame.

mod config;
mod error;
mod phase;
mod recenter;
mod search;
mod warp;

pub use config::AlignerConfig;
pub use error::AlignError;
pub use phase::PhaseCorrelator;
pub use recenter::{disk_center, recenter_offset};
pub use search::{FrameAligner, PreparedFrame, candidate_angles};
pub use warp::{
    RigidTransform, to_scan_frame, to_template_frame, warp_bilinear, warp_mask_nearest,
};
