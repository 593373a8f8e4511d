//! Per-pattern proving pipeline: compose, try Type A, fall back to Type B.
//!
//! "Excluded early" is an ordinary return value here, never an error: the
//! caller inspects [`ProofResult`] to see which route settled the pattern.

use crate::error::{CollatzError, Result};
use crate::exclusion::{check_pattern, FixedPointResult};
use crate::pattern::Pattern;
use crate::solver::{search, SearchOutcome};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Default Type B target precision.
pub const DEFAULT_K: u32 = 32;
/// Default Type B node cap.
pub const DEFAULT_MAX_NODES: u64 = 2_000_000;

/// Parameters of the Type B search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProverConfig {
    /// Target precision: classes are sought modulo `2^k`.
    pub k: u32,
    /// Maximum number of proof-tree nodes a single search may create.
    pub max_nodes: u64,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

impl ProverConfig {
    /// Rejects a zero precision or a zero node cap.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(CollatzError::InvalidBox("k must be at least 1".into()));
        }
        if self.max_nodes == 0 {
            return Err(CollatzError::InvalidBox(
                "max_nodes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Loads a JSON config; missing fields take their defaults.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|err| CollatzError::Malformed(format!("invalid prover config: {err}")))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// How a pattern was settled.
#[derive(Debug, Clone)]
pub enum ProofResult {
    /// Type A excluded the pattern; no search was run.
    TypeA(FixedPointResult),
    /// Type A left a positive-integer candidate, so Type B ran.
    TypeB {
        /// The non-excluding Type A result.
        fixed_point: FixedPointResult,
        /// Search outcome, possibly exhausted.
        search: SearchOutcome,
    },
}

/// Proves or fails to exclude one pattern.
pub fn prove_pattern(pattern: &Pattern, cfg: &ProverConfig) -> Result<ProofResult> {
    cfg.validate()?;
    let fixed_point = check_pattern(pattern)?;
    if fixed_point.is_excluded() {
        info!(pattern = %pattern, reason = %fixed_point.class, "type A exclusion");
        return Ok(ProofResult::TypeA(fixed_point));
    }
    info!(pattern = %pattern, k = cfg.k, "type A inconclusive, running type B");
    let search = search(pattern, cfg.k, cfg.max_nodes);
    Ok(ProofResult::TypeB {
        fixed_point,
        search,
    })
}
