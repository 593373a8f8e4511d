//! Error kinds shared by the prover, the certificate layer and the verifier.

use thiserror::Error;

/// Errors raised while composing, searching, certifying or verifying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollatzError {
    #[error("arithmetic invariant violated: {0}")]
    /// An internal arithmetic identity failed; the certificate must be abandoned.
    ArithmeticInvariantViolation(String),
    #[error("node cap exhausted ({nodes} nodes created, cap {max_nodes})")]
    /// The Type B search hit its node cap before reaching a verdict.
    ResourceExhausted {
        /// Nodes created when the cap was hit.
        nodes: u64,
        /// Configured node cap.
        max_nodes: u64,
    },
    #[error("parameter mismatch: {0}")]
    /// Certificate parameters cannot be reproduced by this verifier.
    ParameterMismatch(String),
    #[error("integrity failure (stored {stored}, computed {computed})")]
    /// A stored digest disagrees with the recomputed one.
    IntegrityFailure {
        /// Digest found in the record.
        stored: String,
        /// Digest recomputed from the canonical fields.
        computed: String,
    },
    #[error("claim rejected: {0}")]
    /// A certificate's claim disagrees with the recomputation.
    ClaimRejected(String),
    #[error("invalid pattern: {0}")]
    /// Pattern is empty or contains a zero exponent.
    InvalidPattern(String),
    #[error("invalid box: {0}")]
    /// Enumeration box or prover configuration is unusable.
    InvalidBox(String),
    #[error("malformed record: {0}")]
    /// A serialized record could not be decoded.
    Malformed(String),
    #[error("io error: {0}")]
    /// Underlying filesystem failure.
    Io(String),
}

impl From<std::io::Error> for CollatzError {
    fn from(err: std::io::Error) -> Self {
        CollatzError::Io(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CollatzError>;
