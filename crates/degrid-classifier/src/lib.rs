//! Subpoint selection from noisy recognized text.

mod classifier;
mod pattern;
mod table;

pub use classifier::SubpointClassifier;
pub use pattern::{Matcher, PatternError};
pub use table::{Axis, ClassifierTable, LabelPatterns};
