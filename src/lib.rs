#![deny(missing_docs)]

//! # collatz_ghost
//!
//! **collatz_ghost** builds and checks certificates ruling out hypothetical
//! cycles of the odd-step Collatz map.  A cycle is described by its exponent
//! pattern `(a₁, …, aₘ)`: the 2-adic valuation of `3x + 1` at each odd step.
//! Every pattern either gets a certificate explaining why no positive odd
//! integer can follow it around a cycle, or a residue class modulo `2^k`
//! (a "ghost") that no local constraint rules out.
//!
//! ## Features
//!
//! * **Affine composition**: the [`affine`](affine/index.html) module folds a
//!   pattern into one exact map `x ↦ (A·x + B) / 2^E` over big integers.
//! * **Type A exclusion**: [`exclusion`](exclusion/index.html) classifies the
//!   rational fixed point `B / (2^E − 3^M)`; a non-integer or non-positive
//!   fixed point excludes the pattern.
//! * **Type B search**: [`solver`](solver/index.html) runs a bounded,
//!   deterministic branch-and-bound over the bits of `x₀` with an explicit
//!   node cap, and reports UNSAT, SAT with a witness, or exhaustion.
//! * **Certificates and atlases**: [`certificate`](certificate/index.html)
//!   renders canonical, BLAKE2b-hashed records and
//!   [`atlas`](atlas/index.html) proves whole boxes of patterns in parallel
//!   and seals them under a Merkle batch digest.
//! * **Independent verification**: [`verifier`](verifier/index.html)
//!   recomputes every claim from the serialized records alone and singles
//!   out any confirmed non-trivial SAT verdict.
//!
//! ## Usage
//!
//! ```rust
//! use collatz_ghost::{certify, Certificate, Pattern, ProverConfig};
//!
//! // [2,1,3,1]: D = 2^7 − 3^4 = 47 does not divide B = 151.
//! let pattern = Pattern::parse("2,1,3,1").unwrap();
//! let cert = certify(&pattern, &ProverConfig::default()).unwrap();
//! assert!(matches!(cert, Certificate::TypeA(_)));
//! assert_eq!(cert.to_json_value()["D"], "47");
//!
//! // The all-twos pattern is the known cycle through 1.
//! let trivial = certify(&Pattern::parse("2,2").unwrap(), &ProverConfig::default()).unwrap();
//! assert!(!trivial.is_nontrivial_sat());
//! ```

pub mod affine;
pub mod atlas;
pub mod certificate;
pub mod error;
pub mod exclusion;
pub mod merkle;
pub mod pattern;
pub mod prover;
pub mod residue;
pub mod solver;
pub mod verifier;

pub use affine::{compose, AffineMap};
pub use atlas::{
    build_atlas, parse_atlas, Atlas, AtlasOptions, AtlasRun, BatchRecord, BoxDescriptor,
    ParsedAtlas,
};
pub use certificate::{certify, Certificate, GhostWitness, Verdict};
pub use error::{CollatzError, Result};
pub use exclusion::{check_pattern, FixedPointClass, FixedPointResult};
pub use merkle::Digest32;
pub use pattern::{Pattern, PatternBox};
pub use prover::{prove_pattern, ProofResult, ProverConfig};
pub use solver::{enumerate_ghosts, search, SearchOutcome, SearchStats, SearchVerdict};
pub use verifier::{
    integer_cycle, verify_atlas, verify_certificate, verify_file, CertificateStatus,
    VerificationSummary, VerifierConfig, EXIT_FAILURE, EXIT_OK, EXIT_SIGNIFICANT,
};
