//! Type A exclusion: the exact rational fixed point of a composed map.
//!
//! A cycle following a pattern must start at a fixed point of its composed
//! map, `x₀ = B / (2^E − 3^M)`.  If that rational is not an integer, or is
//! not positive, no positive odd integer can follow the pattern around a
//! cycle and the pattern is excluded outright.

use crate::affine::{compose, power_of_three, AffineMap};
use crate::error::{CollatzError, Result};
use crate::pattern::Pattern;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, Zero};
use std::fmt;
use std::str::FromStr;

/// Classification of the rational fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedPointClass {
    /// `D = 0`; impossible for a valid pattern.
    Degenerate,
    /// `D` does not divide `B`.
    NonInteger,
    /// `B / D` is an integer `≤ 0`.
    NonPositive,
    /// `B / D` is a positive integer; Type A cannot exclude the pattern.
    IntegerPositive,
}

impl FixedPointClass {
    /// Canonical reason string stored in certificates.
    pub fn as_str(&self) -> &'static str {
        match self {
            FixedPointClass::Degenerate => "degenerate",
            FixedPointClass::NonInteger => "non-integer fixed point",
            FixedPointClass::NonPositive => "non-positive fixed point",
            FixedPointClass::IntegerPositive => "integer-positive fixed point",
        }
    }

    /// Whether this class rules the pattern out.
    pub fn is_exclusion(&self) -> bool {
        matches!(
            self,
            FixedPointClass::NonInteger | FixedPointClass::NonPositive
        )
    }
}

impl fmt::Display for FixedPointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FixedPointClass {
    type Err = CollatzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "degenerate" => Ok(FixedPointClass::Degenerate),
            "non-integer fixed point" => Ok(FixedPointClass::NonInteger),
            "non-positive fixed point" => Ok(FixedPointClass::NonPositive),
            "integer-positive fixed point" => Ok(FixedPointClass::IntegerPositive),
            other => Err(CollatzError::Malformed(format!(
                "unknown Type A reason '{other}'"
            ))),
        }
    }
}

/// Outcome of the Type A check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPointResult {
    /// Numerator `B` of the composed map.
    pub b: BigInt,
    /// Denominator `D = 2^E − 3^M`.
    pub d: BigInt,
    /// Classification of `B / D`.
    pub class: FixedPointClass,
    /// `B / D` whenever it is an integer.
    pub x0: Option<BigInt>,
}

impl FixedPointResult {
    /// `true` when Type A alone excludes the pattern.
    pub fn is_excluded(&self) -> bool {
        self.class.is_exclusion()
    }
}

/// Classifies the fixed point of a fully composed map of `m` steps.
///
/// Fails with [`CollatzError::ArithmeticInvariantViolation`] when the map
/// does not carry `A = 3^m`, or when `D = 0`.
pub fn classify(map: &AffineMap, m: usize) -> Result<FixedPointResult> {
    if map.steps() != m || map.a() != &power_of_three(m) {
        return Err(CollatzError::ArithmeticInvariantViolation(format!(
            "composed map has A = {} after {} steps, expected 3^{m}",
            map.a(),
            map.steps()
        )));
    }
    let d = map.denominator();
    let b = BigInt::from(map.b().clone());
    if d.is_zero() {
        return Err(CollatzError::ArithmeticInvariantViolation(format!(
            "degenerate denominator D = 0 with E = {} and M = {m}",
            map.e()
        )));
    }
    let (quotient, remainder) = b.div_rem(&d);
    let (class, x0) = if !remainder.is_zero() {
        (FixedPointClass::NonInteger, None)
    } else if !quotient.is_positive() {
        (FixedPointClass::NonPositive, Some(quotient))
    } else {
        (FixedPointClass::IntegerPositive, Some(quotient))
    };
    Ok(FixedPointResult { b, d, class, x0 })
}

/// Composes `pattern` and classifies its fixed point.
pub fn check_pattern(pattern: &Pattern) -> Result<FixedPointResult> {
    classify(&compose(pattern), pattern.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_integer_example() {
        let result = check_pattern(&Pattern::parse("2,1,3,1").unwrap()).unwrap();
        assert_eq!(result.d, BigInt::from(47));
        assert_eq!(result.b, BigInt::from(151));
        assert_eq!(result.class, FixedPointClass::NonInteger);
        assert!(result.is_excluded());
        assert!(result.x0.is_none());
    }

    #[test]
    fn test_non_positive_example() {
        // [1,2]: B = 5, D = 8 - 9 = -1, x0 = -5.
        let result = check_pattern(&Pattern::parse("1,2").unwrap()).unwrap();
        assert_eq!(result.class, FixedPointClass::NonPositive);
        assert_eq!(result.x0, Some(BigInt::from(-5)));
    }

    #[test]
    fn test_trivial_cycle_is_not_excluded() {
        for len in 1..8 {
            let result = check_pattern(&Pattern::new(vec![2; len]).unwrap()).unwrap();
            assert_eq!(result.class, FixedPointClass::IntegerPositive);
            assert_eq!(result.x0, Some(BigInt::from(1)));
            assert!(!result.is_excluded());
        }
    }

    #[test]
    fn test_degenerate_map_is_invariant_violation() {
        let err = classify(&AffineMap::identity(), 0).unwrap_err();
        assert!(matches!(err, CollatzError::ArithmeticInvariantViolation(_)));
    }

    #[test]
    fn test_step_count_mismatch_is_invariant_violation() {
        let map = compose(&Pattern::parse("2,2").unwrap());
        assert!(matches!(
            classify(&map, 3),
            Err(CollatzError::ArithmeticInvariantViolation(_))
        ));
    }

    #[test]
    fn test_reason_strings_roundtrip() {
        for class in [
            FixedPointClass::Degenerate,
            FixedPointClass::NonInteger,
            FixedPointClass::NonPositive,
            FixedPointClass::IntegerPositive,
        ] {
            assert_eq!(class.as_str().parse::<FixedPointClass>().unwrap(), class);
        }
        assert!("excluded".parse::<FixedPointClass>().is_err());
    }
}
