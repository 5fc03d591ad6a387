//! Hierarchical step codes ("2", "1.3", "4.8", "auto").

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A step code as it appears in the registry and on sessions.
///
/// Codes compare segment by segment: numeric segments numerically, anything
/// else lexically, and numeric segments sort before non-numeric ones. A code
/// that is a prefix of another sorts first ("1" < "1.1"). Codes that tie
/// numerically ("01" and "1") fall back to their raw text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepCode(String);

impl StepCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading segment as a part number, for multi-part modes.
    pub fn part(&self) -> Option<u32> {
        self.0.split('.').next().and_then(|s| s.parse().ok())
    }

    fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        self.0.split('.').map(Segment::parse)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment<'a> {
    Number(u64),
    Text(&'a str),
}

impl<'a> Segment<'a> {
    fn parse(raw: &'a str) -> Self {
        raw.parse().map_or(Segment::Text(raw), Segment::Number)
    }
}

impl Ord for StepCode {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut left = self.segments();
        let mut right = other.segments();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return self.0.cmp(&other.0),
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(a), Some(b)) => match a.cmp(&b) {
                    Ordering::Equal => continue,
                    unequal => return unequal,
                },
            }
        }
    }
}

impl PartialOrd for StepCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for StepCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl PartialEq<str> for StepCode {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StepCode {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> StepCode {
        StepCode::from(s)
    }

    #[test]
    fn test_numeric_tie_consistent_with_eq() {
        assert_ne!(code("01"), code("1"));
        assert_ne!(code("01").cmp(&code("1")), Ordering::Equal);
        assert_eq!(code("1.2").cmp(&code("1.2")), Ordering::Equal);
        assert!(code("01") < code("2"));
    }

    #[test]
    fn test_numeric_across_parts() {
        assert!(code("2.1") > code("1.7"));
        assert!(code("10") > code("9"));
        assert!(code("1.10") > code("1.9"));
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert!(code("1") < code("1.1"));
    }

    #[test]
    fn test_text_fallback() {
        assert_eq!(code("auto").cmp(&code("auto")), Ordering::Equal);
        assert!(code("7") < code("auto"));
    }

    #[test]
    fn test_sorting_full_catalog_order() {
        let mut codes = vec![code("4.8"), code("1.1"), code("3.6"), code("1.7"), code("2.1")];
        codes.sort();
        let sorted: Vec<&str> = codes.iter().map(StepCode::as_str).collect();
        assert_eq!(sorted, vec!["1.1", "1.7", "2.1", "3.6", "4.8"]);
    }

    #[test]
    fn test_part() {
        assert_eq!(code("3.4").part(), Some(3));
        assert_eq!(code("5").part(), Some(5));
        assert_eq!(code("auto").part(), None);
    }
}
