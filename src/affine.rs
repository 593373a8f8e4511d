//! Exact affine maps over the rationals.
//!
//! Each odd step `T_a(x) = (3x + 1) / 2^a` is an affine map.  Folding the
//! steps of a pattern left to right yields one map `x ↦ (A·x + B) / 2^E`
//! with `A = 3^M` and `E = a₁ + … + aₘ`.  All coefficients are unbounded
//! integers; nothing here ever rounds.

use crate::pattern::Pattern;
use num_bigint::{BigInt, BigUint};
use num_traits::{One, Zero};

/// The map `x ↦ (A·x + B) / 2^E`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffineMap {
    a: BigUint,
    b: BigUint,
    e: u64,
    steps: usize,
}

impl AffineMap {
    /// The identity map `(1, 0, 0)`.
    pub fn identity() -> Self {
        Self {
            a: BigUint::one(),
            b: BigUint::zero(),
            e: 0,
            steps: 0,
        }
    }

    /// Numerator coefficient `A`.
    pub fn a(&self) -> &BigUint {
        &self.a
    }

    /// Additive term `B`.
    pub fn b(&self) -> &BigUint {
        &self.b
    }

    /// Total shift `E`.
    pub fn e(&self) -> u64 {
        self.e
    }

    /// Number of steps folded into this map.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Applies one more step after the ones already composed:
    /// `(A, B, E) ↦ (3A, 3B + 2^E, E + a)`.
    pub fn then_step(&self, a: u32) -> Self {
        let three = BigUint::from(3u32);
        Self {
            a: &self.a * &three,
            b: &self.b * &three + (BigUint::one() << self.e),
            e: self.e + u64::from(a),
            steps: self.steps + 1,
        }
    }

    /// Fixed-point denominator `D = 2^E − A`.
    pub fn denominator(&self) -> BigInt {
        BigInt::from(BigUint::one() << self.e) - BigInt::from(self.a.clone())
    }
}

/// Folds every step of `pattern` into a single map, first step innermost.
pub fn compose(pattern: &Pattern) -> AffineMap {
    pattern
        .exponents()
        .iter()
        .fold(AffineMap::identity(), |map, &a| map.then_step(a))
}

/// `3^m` as an unbounded integer.
pub fn power_of_three(m: usize) -> BigUint {
    let mut acc = BigUint::one();
    let three = BigUint::from(3u32);
    for _ in 0..m {
        acc *= &three;
    }
    acc
}
