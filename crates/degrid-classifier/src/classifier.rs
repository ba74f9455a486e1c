use degrid_types::{Subpoint, SubpointLabel};

use crate::{Axis, ClassifierTable};

/// Maps a frame's recognized text snippets to a subpoint label.
///
/// Pure and total: the same snippets always give the same answer, and anything that no
/// pattern recognizes is [`Subpoint::Unknown`]. Earlier labels in an axis win over later
/// ones when several could match; that ordering is a heuristic, not a guarantee.
#[derive(Clone, Debug, Default)]
pub struct SubpointClassifier {
    table: ClassifierTable,
}

impl SubpointClassifier {
    pub fn new(table: ClassifierTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ClassifierTable {
        &self.table
    }

    pub fn classify<S: AsRef<str>>(&self, texts: &[S]) -> Subpoint {
        if self.table.axes.is_empty() {
            return Subpoint::Unknown;
        }
        let snippets: Vec<String> = texts.iter().map(|t| t.as_ref().to_uppercase()).collect();
        let mut label = String::new();
        for axis in &self.table.axes {
            match classify_axis(axis, &snippets) {
                Some(part) => label.push_str(part.as_str()),
                None => return Subpoint::Unknown,
            }
        }
        Subpoint::Known(SubpointLabel::new(label))
    }

    /// Every label this table can produce, in priority order.
    pub fn labels(&self) -> Vec<SubpointLabel> {
        let mut combos = vec![String::new()];
        for axis in &self.table.axes {
            combos = combos
                .iter()
                .flat_map(|prefix| {
                    axis.labels
                        .iter()
                        .map(move |entry| format!("{prefix}{}", entry.label))
                })
                .collect();
        }
        if self.table.axes.is_empty() {
            return Vec::new();
        }
        combos.into_iter().map(SubpointLabel::new).collect()
    }
}

fn classify_axis<'a>(axis: &'a Axis, snippets: &[String]) -> Option<&'a SubpointLabel> {
    axis.labels
        .iter()
        .find(|entry| {
            snippets.iter().any(|snippet| {
                entry
                    .patterns
                    .iter()
                    .any(|pattern| pattern.is_match(snippet))
            })
        })
        .map(|entry| &entry.label)
}
