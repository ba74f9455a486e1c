use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a sub-satellite reference position, e.g. `5N` or `0N75.0W`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubpointLabel(String);

impl SubpointLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubpointLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubpointLabel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Borrow<str> for SubpointLabel {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Outcome of classifying a frame's recognized text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subpoint {
    Known(SubpointLabel),
    Unknown,
}

impl Subpoint {
    pub fn label(&self) -> Option<&SubpointLabel> {
        match self {
            Subpoint::Known(label) => Some(label),
            Subpoint::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Subpoint::Unknown)
    }
}

impl fmt::Display for Subpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subpoint::Known(label) => label.fmt(f),
            Subpoint::Unknown => f.write_str("unknown"),
        }
    }
}
