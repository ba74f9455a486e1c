use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern '{0}' has an empty literal")]
    EmptyLiteral(String),
    #[error("pattern '{pattern}' has an unterminated group starting at byte {offset}")]
    Unterminated { pattern: String, offset: usize },
    #[error("pattern '{pattern}' ends with a dangling escape")]
    DanglingEscape { pattern: String },
    #[error("pattern '{pattern}' has unsupported syntax at byte {offset}")]
    Unsupported { pattern: String, offset: usize },
}

/// Literal token guarded by optional negative look-behind and look-ahead character sets.
///
/// Written as `(?<!M)ON(?![O0])`: the token `ON` matches unless it is preceded by `M` or
/// followed by `O` or `0`. Sets are a single character or a bracketed list. Inside the
/// literal, `\` escapes the next character.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Matcher {
    token: String,
    reject_prev: Vec<char>,
    reject_next: Vec<char>,
}

impl Matcher {
    pub fn literal(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            reject_prev: Vec::new(),
            reject_next: Vec::new(),
        }
    }

    pub fn not_preceded_by(mut self, chars: &str) -> Self {
        self.reject_prev = chars.chars().collect();
        self
    }

    pub fn not_followed_by(mut self, chars: &str) -> Self {
        self.reject_next = chars.chars().collect();
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// True when any occurrence of the token in `snippet` passes both guards.
    pub fn is_match(&self, snippet: &str) -> bool {
        if self.token.is_empty() {
            return false;
        }
        let mut start = 0;
        while let Some(found) = snippet[start..].find(&self.token) {
            let index = start + found;
            let prev = snippet[..index].chars().next_back();
            let next = snippet[index + self.token.len()..].chars().next();
            let prev_ok = prev.is_none_or(|c| !self.reject_prev.contains(&c));
            let next_ok = next.is_none_or(|c| !self.reject_next.contains(&c));
            if prev_ok && next_ok {
                return true;
            }
            // Overlapping occurrences: step one character past this one.
            let step = snippet[index..].chars().next().map_or(1, char::len_utf8);
            start = index + step;
        }
        false
    }
}

impl FromStr for Matcher {
    type Err = PatternError;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        let mut rest = pattern;
        let mut offset = 0;

        let mut reject_prev = Vec::new();
        if let Some(after) = rest.strip_prefix("(?<!") {
            let (set, consumed) = parse_group(after, pattern, offset)?;
            reject_prev = set;
            let used = 4 + consumed;
            rest = &rest[used..];
            offset += used;
        }

        let mut token = String::new();
        let mut chars = rest.char_indices();
        let mut tail_start = rest.len();
        while let Some((idx, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => token.push(escaped),
                    None => {
                        return Err(PatternError::DanglingEscape {
                            pattern: pattern.to_string(),
                        });
                    }
                },
                '(' => {
                    tail_start = idx;
                    break;
                }
                '[' | ']' | ')' | '?' | '*' | '+' | '|' => {
                    return Err(PatternError::Unsupported {
                        pattern: pattern.to_string(),
                        offset: offset + idx,
                    });
                }
                other => token.push(other),
            }
        }
        if token.is_empty() {
            return Err(PatternError::EmptyLiteral(pattern.to_string()));
        }
        offset += tail_start;
        rest = &rest[tail_start..];

        let mut reject_next = Vec::new();
        if !rest.is_empty() {
            let Some(after) = rest.strip_prefix("(?!") else {
                return Err(PatternError::Unsupported {
                    pattern: pattern.to_string(),
                    offset,
                });
            };
            let (set, consumed) = parse_group(after, pattern, offset)?;
            if 3 + consumed != rest.len() {
                return Err(PatternError::Unsupported {
                    pattern: pattern.to_string(),
                    offset: offset + 3 + consumed,
                });
            }
            reject_next = set;
        }

        Ok(Self {
            token,
            reject_prev,
            reject_next,
        })
    }
}

/// Parse `X)` or `[XYZ])`, returning the set and the number of bytes consumed.
fn parse_group(
    input: &str,
    pattern: &str,
    offset: usize,
) -> Result<(Vec<char>, usize), PatternError> {
    let unterminated = || PatternError::Unterminated {
        pattern: pattern.to_string(),
        offset,
    };
    if let Some(inner) = input.strip_prefix('[') {
        let close = inner.find(']').ok_or_else(unterminated)?;
        let set: Vec<char> = inner[..close].chars().collect();
        let after = &inner[close + 1..];
        if !after.starts_with(')') || set.is_empty() {
            return Err(unterminated());
        }
        return Ok((set, 1 + close + 1 + 1));
    }
    let mut chars = input.chars();
    let first = chars.next().ok_or_else(unterminated)?;
    let first = if first == '\\' {
        chars.next().ok_or_else(unterminated)?
    } else {
        first
    };
    let head = input.len() - chars.as_str().len();
    if !chars.as_str().starts_with(')') {
        return Err(unterminated());
    }
    Ok((vec![first], head + 1))
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.reject_prev.is_empty() {
            write!(f, "(?<!{})", render_set(&self.reject_prev))?;
        }
        for c in self.token.chars() {
            if matches!(c, '\\' | '(' | ')' | '[' | ']' | '.' | '?' | '*' | '+' | '|') {
                f.write_str("\\")?;
            }
            write!(f, "{c}")?;
        }
        if !self.reject_next.is_empty() {
            write!(f, "(?!{})", render_set(&self.reject_next))?;
        }
        Ok(())
    }
}

fn render_set(set: &[char]) -> String {
    if set.len() == 1 {
        set[0].to_string()
    } else {
        format!("[{}]", set.iter().collect::<String>())
    }
}

impl TryFrom<String> for Matcher {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Matcher> for String {
    fn from(value: Matcher) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lookaround_forms() {
        let m: Matcher = "(?<!M)ON(?![O0])".parse().unwrap();
        assert_eq!(m, Matcher::literal("ON").not_preceded_by("M").not_followed_by("O0"));

        let m: Matcher = "5S(?!E)".parse().unwrap();
        assert_eq!(m, Matcher::literal("5S").not_followed_by("E"));

        let m: Matcher = r"75\. OM".parse().unwrap();
        assert_eq!(m, Matcher::literal("75. OM"));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for pattern in ["(?<!M)ON(?![O0])", "SN(?![OS])", r"74\.5W", "58"] {
            let m: Matcher = pattern.parse().unwrap();
            assert_eq!(m.to_string(), pattern);
        }
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(matches!(
            "(?!O)".parse::<Matcher>(),
            Err(PatternError::Unsupported { .. }) | Err(PatternError::EmptyLiteral(_))
        ));
        assert!(matches!(
            "ON(?![O0)".parse::<Matcher>(),
            Err(PatternError::Unterminated { .. })
        ));
        assert!(matches!(
            "5N\\".parse::<Matcher>(),
            Err(PatternError::DanglingEscape { .. })
        ));
        assert!("5N(?!O)X".parse::<Matcher>().is_err());
        assert!("5N*".parse::<Matcher>().is_err());
    }

    #[test]
    fn guards_apply_per_occurrence() {
        let m = Matcher::literal("5N").not_followed_by("O");
        assert!(!m.is_match("5NO"));
        assert!(m.is_match("5NO 5N"));
        assert!(m.is_match("5N"));

        let m = Matcher::literal("ON").not_preceded_by("M");
        assert!(!m.is_match("MON"));
        assert!(m.is_match("ON."));
    }

    #[test]
    fn overlapping_occurrences_are_checked() {
        let m = Matcher::literal("55").not_followed_by("5");
        assert!(m.is_match("555"));
        assert!(m.is_match("5555X"));

        let fenced = Matcher::literal("55").not_preceded_by("5").not_followed_by("5");
        assert!(!fenced.is_match("555"));
        assert!(fenced.is_match("X55"));
    }
}
