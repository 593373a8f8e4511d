//! Exponent patterns and the boxes that enumerate them.
//!
//! A [`Pattern`] is the ordered list of 2-adic valuations `(a₁, …, aₘ)` that a
//! hypothetical odd-step cycle would have to follow.  A [`PatternBox`]
//! describes every pattern of a fixed length whose exponents lie in an
//! inclusive range, and enumerates them in lexicographic order.  That order is
//! the canonical atlas order: certificates and the batch digest are always
//! laid out in it.

use crate::error::{CollatzError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered, non-empty sequence of positive exponents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct Pattern {
    exponents: Vec<u32>,
}

impl Pattern {
    /// Builds a pattern, rejecting empty input and zero exponents.
    pub fn new(exponents: Vec<u32>) -> Result<Self> {
        if exponents.is_empty() {
            return Err(CollatzError::InvalidPattern("pattern is empty".into()));
        }
        if let Some(pos) = exponents.iter().position(|&a| a == 0) {
            return Err(CollatzError::InvalidPattern(format!(
                "exponent at position {} is zero",
                pos + 1
            )));
        }
        Ok(Self { exponents })
    }

    /// Parses a comma-separated list such as `2,1,3,1`.
    pub fn parse(input: &str) -> Result<Self> {
        let exponents = input
            .split(',')
            .map(str::trim)
            .filter(|tok| !tok.is_empty())
            .map(|tok| {
                tok.parse::<u32>()
                    .map_err(|_| CollatzError::InvalidPattern(format!("invalid exponent '{tok}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(exponents)
    }

    /// Exponents in step order.
    pub fn exponents(&self) -> &[u32] {
        &self.exponents
    }

    /// Number of odd steps `M`.
    pub fn len(&self) -> usize {
        self.exponents.len()
    }

    /// Always `false`; patterns are non-empty by construction.
    pub fn is_empty(&self) -> bool {
        self.exponents.is_empty()
    }

    /// Total shift `E = a₁ + … + aₘ`.
    pub fn exponent_sum(&self) -> u64 {
        self.exponents.iter().map(|&a| u64::from(a)).sum()
    }

    /// `true` for the pattern of the known cycle through 1.
    pub fn is_all_twos(&self) -> bool {
        self.exponents.iter().all(|&a| a == 2)
    }
}

impl TryFrom<Vec<u32>> for Pattern {
    type Error = CollatzError;

    fn try_from(value: Vec<u32>) -> Result<Self> {
        Pattern::new(value)
    }
}

impl From<Pattern> for Vec<u32> {
    fn from(pattern: Pattern) -> Self {
        pattern.exponents
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, a) in self.exponents.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{a}")?;
        }
        Ok(())
    }
}

/// All patterns of length `m` with exponents in `amin..=amax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternBox {
    /// Pattern length.
    #[serde(rename = "M")]
    pub m: usize,
    /// Smallest admissible exponent.
    pub amin: u32,
    /// Largest admissible exponent.
    pub amax: u32,
}

impl PatternBox {
    /// Creates a validated box.
    pub fn new(m: usize, amin: u32, amax: u32) -> Result<Self> {
        let bx = Self { m, amin, amax };
        bx.validate()?;
        Ok(bx)
    }

    /// Checks `m ≥ 1` and `1 ≤ amin ≤ amax`.
    pub fn validate(&self) -> Result<()> {
        if self.m == 0 {
            return Err(CollatzError::InvalidBox("M must be at least 1".into()));
        }
        if self.amin == 0 {
            return Err(CollatzError::InvalidBox("amin must be at least 1".into()));
        }
        if self.amin > self.amax {
            return Err(CollatzError::InvalidBox(format!(
                "amin {} exceeds amax {}",
                self.amin, self.amax
            )));
        }
        Ok(())
    }

    /// Number of patterns in the box.
    ///
    /// `None` for a box that fails [`PatternBox::validate`] or whose size does
    /// not fit in `usize`.
    pub fn count(&self) -> Option<usize> {
        self.validate().ok()?;
        let width = usize::try_from(self.amax - self.amin).ok()?.checked_add(1)?;
        let exp = u32::try_from(self.m).ok()?;
        width.checked_pow(exp)
    }

    /// Whether `pattern` has this box's length and exponent range.
    pub fn contains(&self, pattern: &Pattern) -> bool {
        pattern.len() == self.m
            && pattern
                .exponents()
                .iter()
                .all(|&a| (self.amin..=self.amax).contains(&a))
    }

    /// Lexicographic enumeration, first exponent most significant.
    pub fn iter(&self) -> PatternIter {
        PatternIter {
            current: Some(vec![self.amin; self.m]),
            amin: self.amin,
            amax: self.amax,
        }
    }
}

/// Odometer iterator over a [`PatternBox`].
#[derive(Debug, Clone)]
pub struct PatternIter {
    current: Option<Vec<u32>>,
    amin: u32,
    amax: u32,
}

impl Iterator for PatternIter {
    type Item = Pattern;

    fn next(&mut self) -> Option<Pattern> {
        let digits = self.current.take()?;
        let mut succ = digits.clone();
        let mut pos = succ.len();
        while pos > 0 {
            pos -= 1;
            if succ[pos] < self.amax {
                succ[pos] += 1;
                self.current = Some(succ);
                break;
            }
            succ[pos] = self.amin;
        }
        // An empty or zero-exponent box never reaches here: `validate` guards the callers.
        Pattern::new(digits).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let pattern = Pattern::parse("2, 1,3,1").unwrap();
        assert_eq!(pattern.exponents(), &[2, 1, 3, 1]);
        assert_eq!(pattern.to_string(), "2,1,3,1");
        assert_eq!(pattern.exponent_sum(), 7);
        assert!(!pattern.is_all_twos());
    }

    #[test]
    fn test_rejects_bad_patterns() {
        assert!(matches!(
            Pattern::parse(""),
            Err(CollatzError::InvalidPattern(_))
        ));
        assert!(matches!(
            Pattern::new(vec![2, 0, 1]),
            Err(CollatzError::InvalidPattern(_))
        ));
        assert!(Pattern::parse("2,x").is_err());
    }

    #[test]
    fn test_serde_uses_plain_list() {
        let pattern = Pattern::parse("2,2").unwrap();
        assert_eq!(serde_json::to_string(&pattern).unwrap(), "[2,2]");
        let back: Pattern = serde_json::from_str("[3,1]").unwrap();
        assert_eq!(back.exponents(), &[3, 1]);
        assert!(serde_json::from_str::<Pattern>("[]").is_err());
    }

    #[test]
    fn test_box_enumeration_order() {
        let bx = PatternBox::new(2, 1, 3).unwrap();
        let all: Vec<String> = bx.iter().map(|p| p.to_string()).collect();
        assert_eq!(
            all,
            vec!["1,1", "1,2", "1,3", "2,1", "2,2", "2,3", "3,1", "3,2", "3,3"]
        );
        assert_eq!(bx.count(), Some(9));
        let sorted = {
            let mut v: Vec<Pattern> = bx.iter().collect();
            v.sort();
            v
        };
        assert_eq!(sorted, bx.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_count_of_unchecked_boxes() {
        assert_eq!(PatternBox::new(3, 1, 3).unwrap().count(), Some(27));
        let inverted = PatternBox { m: 2, amin: 5, amax: 2 };
        assert_eq!(inverted.count(), None);
        let zero_floor = PatternBox { m: 2, amin: 0, amax: u32::MAX };
        assert_eq!(zero_floor.count(), None);
        let empty = PatternBox { m: 0, amin: 1, amax: 2 };
        assert_eq!(empty.count(), None);
        let huge = PatternBox { m: 64, amin: 1, amax: 1_000 };
        assert_eq!(huge.count(), None);
    }

    #[test]
    fn test_box_validation_and_membership() {
        assert!(PatternBox::new(0, 1, 2).is_err());
        assert!(PatternBox::new(2, 0, 2).is_err());
        assert!(PatternBox::new(2, 3, 2).is_err());
        let bx = PatternBox::new(3, 1, 2).unwrap();
        assert!(bx.contains(&Pattern::parse("2,1,2").unwrap()));
        assert!(!bx.contains(&Pattern::parse("2,1").unwrap()));
        assert!(!bx.contains(&Pattern::parse("3,1,1").unwrap()));
        assert_eq!(PatternBox::new(1, 2, 2).unwrap().iter().count(), 1);
    }
}
