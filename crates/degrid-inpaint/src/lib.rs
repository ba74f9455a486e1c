//! Removal of grid pixels and reconstruction of what lies beneath them.

mod backend;
mod backends;
mod dilate;
mod engine;
mod error;

pub use backend::{Backend, Configuration, DEFAULT_RADIUS};
pub use backends::neighbor::{FillReport, NeighborFillEngine, fill_neighbors};
#[cfg(feature = "engine-telea")]
pub use backends::telea::TeleaEngine;
pub use dilate::dilate;
pub use engine::{InpaintEngine, mark_artifact};
pub use error::InpaintError;
