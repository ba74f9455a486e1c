use degrid_types::SubpointLabel;
use serde::{Deserialize, Serialize};

use crate::Matcher;

/// One label and the OCR variants that select it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPatterns {
    pub label: SubpointLabel,
    pub patterns: Vec<Matcher>,
}

impl LabelPatterns {
    fn new(label: &str, patterns: Vec<Matcher>) -> Self {
        Self {
            label: SubpointLabel::new(label),
            patterns,
        }
    }
}

/// Labels for one coordinate, evaluated strictly in order; the first match wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub labels: Vec<LabelPatterns>,
}

/// Ordered axes; a frame's label is the concatenation of every axis' result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierTable {
    pub axes: Vec<Axis>,
}

impl Default for ClassifierTable {
    fn default() -> Self {
        Self {
            axes: vec![Self::latitude_axis()],
        }
    }
}

impl ClassifierTable {
    pub fn with_longitude() -> Self {
        Self {
            axes: vec![Self::latitude_axis(), Self::longitude_axis()],
        }
    }

    /// Latitude labels tuned to the recognition errors seen on the archive scans.
    pub fn latitude_axis() -> Axis {
        let lit = Matcher::literal;
        Axis {
            name: "latitude".into(),
            labels: vec![
                LabelPatterns::new(
                    "5N",
                    vec![
                        lit("SN").not_followed_by("OS"),
                        lit("5N").not_followed_by("O"),
                        lit("SM").not_followed_by("OS"),
                    ],
                ),
                LabelPatterns::new(
                    "0N",
                    vec![
                        lit("ON").not_preceded_by("M").not_followed_by("O0"),
                        lit("0N").not_followed_by("O"),
                        lit("OM").not_followed_by("O"),
                    ],
                ),
                LabelPatterns::new(
                    "5S",
                    vec![
                        lit("SS"),
                        lit("58"),
                        lit("38"),
                        lit("88"),
                        lit("55"),
                        lit("59"),
                        lit("5S").not_followed_by("E"),
                    ],
                ),
            ],
        }
    }

    pub fn longitude_axis() -> Axis {
        let lits = |tokens: &[&str]| tokens.iter().map(|t| Matcher::literal(*t)).collect();
        Axis {
            name: "longitude".into(),
            labels: vec![
                LabelPatterns::new("74.5W", lits(&["74.5W", "74.5M", "74.50", "74.54"])),
                LabelPatterns::new(
                    "75.0W",
                    lits(&[
                        "75.0W", "75.OW", "75.04", "75.OM", "75.0V", "75. OM", "75.00", "75.DW",
                        "75.ON", "75.OU", "75. OW", "75.OV",
                    ]),
                ),
                LabelPatterns::new("75.5W", lits(&["75.5W", "75.5M", "75.5V", "75.50"])),
            ],
        }
    }
}
