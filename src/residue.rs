//! Residue arithmetic modulo powers of two.
//!
//! Every quantity the Type B search touches is an integer known only modulo
//! `2^bits`.  Values are unbounded [`BigUint`]s reduced by masking, so the
//! target precision has no fixed-width ceiling.

use num_bigint::BigUint;
use num_traits::One;

/// Reduces `x` modulo `2^bits`.
#[inline]
pub fn mask(x: &BigUint, bits: u64) -> BigUint {
    x % (BigUint::one() << bits)
}

/// Returns `2^bits`.
#[inline]
pub fn pow2(bits: u64) -> BigUint {
    BigUint::one() << bits
}

/// Multiplicative inverse of 3 modulo `2^bits`.
///
/// Uses the closed form `(2^bits + 1) / 3` for odd `bits` and
/// `(2^(bits+1) + 1) / 3` for even `bits`; both are exact divisions.
pub fn inverse_of_three(bits: u64) -> BigUint {
    if bits == 0 {
        return BigUint::default();
    }
    let lifted = if bits % 2 == 1 {
        pow2(bits)
    } else {
        pow2(bits + 1)
    };
    (lifted + 1u32) / 3u32
}

/// 2-adic valuation of a non-zero integer; `None` for zero.
pub fn valuation(n: &BigUint) -> Option<u64> {
    n.trailing_zeros()
}

/// A congruence `x ≡ residue (mod 2^bits)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidueConstraint {
    residue: BigUint,
    bits: u64,
}

impl ResidueConstraint {
    /// Congruence equivalent to the exact valuation `v₂(3x + 1) = a`:
    /// `x ≡ (2^a − 1)·3⁻¹ (mod 2^(a+1))`.
    pub fn for_exponent(a: u32) -> Self {
        let bits = u64::from(a) + 1;
        let residue = mask(&((pow2(u64::from(a)) - 1u32) * inverse_of_three(bits)), bits);
        Self { residue, bits }
    }

    /// Required residue.
    pub fn residue(&self) -> &BigUint {
        &self.residue
    }

    /// Precision of the congruence.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// `true` when `known_bits` low bits of `x` suffice to settle the congruence.
    pub fn is_decided(&self, known_bits: u64) -> bool {
        known_bits >= self.bits
    }

    /// Checks the congruence using only the low `known_bits` bits of `x`.
    ///
    /// A `false` result is a definite contradiction.  A `true` result with
    /// `known_bits < self.bits()` only means no contradiction is visible yet.
    pub fn agrees_with(&self, x: &BigUint, known_bits: u64) -> bool {
        let bits = known_bits.min(self.bits);
        mask(x, bits) == mask(&self.residue, bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_of_three() {
        for bits in 1..80u64 {
            let inv = inverse_of_three(bits);
            assert!(inv < pow2(bits));
            assert_eq!(mask(&(inv * 3u32), bits), BigUint::one(), "bits={bits}");
        }
    }

    #[test]
    fn test_exponent_constraints() {
        // v2(3x+1) = 1  <=>  x ≡ 3 (mod 4)
        let c1 = ResidueConstraint::for_exponent(1);
        assert_eq!(c1.residue(), &BigUint::from(3u32));
        assert_eq!(c1.bits(), 2);
        // v2(3x+1) = 2  <=>  x ≡ 1 (mod 8)
        let c2 = ResidueConstraint::for_exponent(2);
        assert_eq!(c2.residue(), &BigUint::from(1u32));
        // v2(3x+1) = 3  <=>  x ≡ 13 (mod 16)
        let c3 = ResidueConstraint::for_exponent(3);
        assert_eq!(c3.residue(), &BigUint::from(13u32));
    }

    #[test]
    fn test_constraint_matches_valuation() {
        for a in 1..10u32 {
            let c = ResidueConstraint::for_exponent(a);
            for x in (1u32..2048).step_by(2) {
                let x = BigUint::from(x);
                let v = valuation(&(&x * 3u32 + 1u32)).unwrap();
                assert_eq!(c.agrees_with(&x, c.bits()), v == u64::from(a));
            }
        }
    }

    #[test]
    fn test_partial_knowledge() {
        let c = ResidueConstraint::for_exponent(3);
        // 13 = 0b1101; with two known bits only 0b01 is checked.
        assert!(c.agrees_with(&BigUint::from(1u32), 2));
        assert!(!c.agrees_with(&BigUint::from(3u32), 2));
        assert!(!c.is_decided(2));
        assert!(c.is_decided(4));
        assert_eq!(valuation(&BigUint::default()), None);
    }
}
