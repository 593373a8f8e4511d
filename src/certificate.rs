//! Canonical certificate records and their content hashes.
//!
//! A certificate is rendered as a JSON object whose keys are emitted in
//! sorted order with no insignificant whitespace.  The content hash is a
//! domain-separated BLAKE2b-256 digest of that canonical form with the
//! `hash` key left out, so a record can be rehashed from its own fields.
//! Big integers are carried as decimal strings.

use crate::error::{CollatzError, Result};
use crate::exclusion::{FixedPointClass, FixedPointResult};
use crate::merkle::{digest_from_hex, digest_to_hex, Digest32};
use crate::pattern::Pattern;
use crate::prover::{prove_pattern, ProofResult, ProverConfig};
use crate::solver::{SearchOutcome, SearchVerdict};
use blake2::digest::{consts::U32, Digest};
use blake2::Blake2b;
use num_bigint::{BigInt, BigUint};
use num_traits::One;
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

const CERTIFICATE_DOMAIN: &[u8] = b"COLLATZ_GHOST_CERT_V1";

/// Type B verdict as serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// No class modulo `2^k` survives.
    Unsat,
    /// A ghost class exists modulo `2^k`.
    Sat,
}

impl Verdict {
    /// `"UNSAT"` or `"SAT"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Unsat => "UNSAT",
            Verdict::Sat => "SAT",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Surviving class reported by a SAT certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostWitness {
    /// `x₀` modulo `2^k`.
    pub x0: BigUint,
    /// `true` for the all-twos pattern with witness 1 (the cycle through 1).
    pub is_trivial: bool,
}

impl GhostWitness {
    /// Builds a witness, deciding triviality from the pattern and residue.
    pub fn new(pattern: &Pattern, x0: BigUint) -> Self {
        let is_trivial = pattern.is_all_twos() && x0.is_one();
        Self { x0, is_trivial }
    }
}

/// Exclusion by the rational fixed point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeACertificate {
    /// Excluded pattern.
    pub pattern: Pattern,
    /// Numerator `B`.
    pub b: BigInt,
    /// Denominator `D = 2^E − 3^M`.
    pub d: BigInt,
    /// Exclusion reason.
    pub reason: FixedPointClass,
    /// `B / D` when it is an integer.
    pub x0: Option<BigInt>,
    /// Content hash as stored.
    pub hash: Digest32,
}

/// Outcome of a completed Type B search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeBCertificate {
    /// Searched pattern.
    pub pattern: Pattern,
    /// Target precision.
    pub k: u32,
    /// Node cap the search ran under.
    pub max_nodes: u64,
    /// Nodes the search created.
    pub nodes: u64,
    /// Verdict.
    pub verdict: Verdict,
    /// Witness class, present exactly when the verdict is SAT.
    pub witness: Option<GhostWitness>,
    /// Content hash as stored.
    pub hash: Digest32,
}

/// A serialized, independently checkable proof outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Certificate {
    /// Type A exclusion.
    TypeA(TypeACertificate),
    /// Type B search result.
    TypeB(TypeBCertificate),
}

impl Certificate {
    /// Seals a Type A exclusion.  Non-excluding results are rejected.
    pub fn type_a(pattern: &Pattern, result: &FixedPointResult) -> Result<Self> {
        if !result.is_excluded() {
            return Err(CollatzError::ArithmeticInvariantViolation(format!(
                "pattern {pattern} is not excluded by type A ({})",
                result.class
            )));
        }
        let x0 = match result.class {
            FixedPointClass::NonPositive => result.x0.clone(),
            _ => None,
        };
        let mut cert = Certificate::TypeA(TypeACertificate {
            pattern: pattern.clone(),
            b: result.b.clone(),
            d: result.d.clone(),
            reason: result.class,
            x0,
            hash: [0u8; 32],
        });
        cert.seal();
        Ok(cert)
    }

    /// Seals a Type B outcome.  An exhausted search has no certificate.
    pub fn type_b(pattern: &Pattern, cfg: &ProverConfig, outcome: &SearchOutcome) -> Result<Self> {
        let (verdict, witness) = match &outcome.verdict {
            SearchVerdict::Unsat => (Verdict::Unsat, None),
            SearchVerdict::Sat { witness } => (
                Verdict::Sat,
                Some(GhostWitness::new(pattern, witness.clone())),
            ),
            SearchVerdict::Exhausted => {
                return Err(CollatzError::ResourceExhausted {
                    nodes: outcome.stats.nodes_created,
                    max_nodes: cfg.max_nodes,
                })
            }
        };
        let mut cert = Certificate::TypeB(TypeBCertificate {
            pattern: pattern.clone(),
            k: cfg.k,
            max_nodes: cfg.max_nodes,
            nodes: outcome.stats.nodes_created,
            verdict,
            witness,
            hash: [0u8; 32],
        });
        cert.seal();
        Ok(cert)
    }

    /// Turns a pipeline result into a certificate.
    pub fn from_proof(pattern: &Pattern, cfg: &ProverConfig, proof: &ProofResult) -> Result<Self> {
        match proof {
            ProofResult::TypeA(result) => Self::type_a(pattern, result),
            ProofResult::TypeB { search, .. } => Self::type_b(pattern, cfg, search),
        }
    }

    /// Pattern the certificate is about.
    pub fn pattern(&self) -> &Pattern {
        match self {
            Certificate::TypeA(c) => &c.pattern,
            Certificate::TypeB(c) => &c.pattern,
        }
    }

    /// Stored content hash.
    pub fn hash(&self) -> &Digest32 {
        match self {
            Certificate::TypeA(c) => &c.hash,
            Certificate::TypeB(c) => &c.hash,
        }
    }

    /// `"A"` or `"B"`.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Certificate::TypeA(_) => "A",
            Certificate::TypeB(_) => "B",
        }
    }

    /// SAT certificate whose witness is not the trivial cycle.
    ///
    /// Triviality is recomputed from the pattern and witness; the stored
    /// `is_trivial` flag is not consulted.
    pub fn is_nontrivial_sat(&self) -> bool {
        match self {
            Certificate::TypeB(TypeBCertificate {
                verdict: Verdict::Sat,
                pattern,
                witness: Some(w),
                ..
            }) => !GhostWitness::new(pattern, w.x0.clone()).is_trivial,
            _ => false,
        }
    }

    /// Canonical field map, without the `hash` key.
    pub fn canonical_value(&self) -> Value {
        match self {
            Certificate::TypeA(c) => {
                let mut obj = json!({
                    "type": "A",
                    "pattern": c.pattern,
                    "B": c.b.to_string(),
                    "D": c.d.to_string(),
                    "reason": c.reason.as_str(),
                });
                if let (Some(x0), Value::Object(map)) = (&c.x0, &mut obj) {
                    map.insert("x0".into(), Value::String(x0.to_string()));
                }
                obj
            }
            Certificate::TypeB(c) => {
                let mut obj = json!({
                    "type": "B",
                    "pattern": c.pattern,
                    "k": c.k,
                    "max_nodes": c.max_nodes,
                    "nodes": c.nodes,
                    "verdict": c.verdict.as_str(),
                });
                if let (Some(w), Value::Object(map)) = (&c.witness, &mut obj) {
                    map.insert("x0_candidate".into(), Value::String(w.x0.to_string()));
                    map.insert("is_trivial".into(), Value::Bool(w.is_trivial));
                }
                obj
            }
        }
    }

    /// Recomputes the content hash from the canonical fields.
    pub fn compute_hash(&self) -> Digest32 {
        let canonical = self.canonical_value().to_string();
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(CERTIFICATE_DOMAIN);
        hasher.update(canonical.as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    /// Overwrites the stored hash with the recomputed one.
    fn seal(&mut self) {
        let digest = self.compute_hash();
        match self {
            Certificate::TypeA(c) => c.hash = digest,
            Certificate::TypeB(c) => c.hash = digest,
        }
    }

    /// Canonical JSON including the `hash` key.
    pub fn to_json_value(&self) -> Value {
        let mut value = self.canonical_value();
        if let Value::Object(map) = &mut value {
            map.insert("hash".into(), Value::String(digest_to_hex(self.hash())));
        }
        value
    }

    /// One canonical JSON line, as written to an atlas.
    pub fn to_json_line(&self) -> String {
        self.to_json_value().to_string()
    }

    /// Decodes a record, keeping its stored hash untouched.
    ///
    /// A Type B record without `k` or `max_nodes` yields
    /// [`CollatzError::ParameterMismatch`].  A `hash` that is not exactly 64
    /// lower-case hex characters yields [`CollatzError::IntegrityFailure`]
    /// carrying the recomputed digest.  Every other defect is
    /// [`CollatzError::Malformed`].
    pub fn from_json_value(value: &Value) -> Result<Self> {
        let mut cert = Self::decode_fields(value)?;
        let stored = value
            .get("hash")
            .and_then(Value::as_str)
            .ok_or_else(|| CollatzError::Malformed("missing hash".into()))?;
        let digest = digest_from_hex(stored).map_err(|_| CollatzError::IntegrityFailure {
            stored: stored.to_string(),
            computed: digest_to_hex(&cert.compute_hash()),
        })?;
        match &mut cert {
            Certificate::TypeA(c) => c.hash = digest,
            Certificate::TypeB(c) => c.hash = digest,
        }
        Ok(cert)
    }

    // Every field but `hash`, which is left zeroed.
    fn decode_fields(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| CollatzError::Malformed("certificate is not an object".into()))?;
        let pattern: Pattern = serde_json::from_value(
            map.get("pattern")
                .cloned()
                .ok_or_else(|| CollatzError::Malformed("missing pattern".into()))?,
        )
        .map_err(|err| CollatzError::Malformed(format!("invalid pattern: {err}")))?;
        let hash = [0u8; 32];
        match str_field(map, "type")? {
            "A" => {
                let x0 = match map.get("x0") {
                    Some(_) => Some(parse_int::<BigInt>(map, "x0")?),
                    None => None,
                };
                Ok(Certificate::TypeA(TypeACertificate {
                    pattern,
                    b: parse_int(map, "B")?,
                    d: parse_int(map, "D")?,
                    reason: str_field(map, "reason")?.parse()?,
                    x0,
                    hash,
                }))
            }
            "B" => {
                let k = param_field(map, "k")?;
                let k = u32::try_from(k)
                    .map_err(|_| CollatzError::ParameterMismatch(format!("k = {k} out of range")))?;
                let max_nodes = param_field(map, "max_nodes")?;
                let nodes = map
                    .get("nodes")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| CollatzError::Malformed("missing nodes".into()))?;
                let verdict = match str_field(map, "verdict")? {
                    "UNSAT" => Verdict::Unsat,
                    "SAT" => Verdict::Sat,
                    other => {
                        return Err(CollatzError::Malformed(format!(
                            "unknown verdict '{other}'"
                        )))
                    }
                };
                let witness = match (verdict, map.get("x0_candidate")) {
                    (Verdict::Sat, Some(_)) => Some(GhostWitness {
                        x0: parse_int(map, "x0_candidate")?,
                        is_trivial: map
                            .get("is_trivial")
                            .and_then(Value::as_bool)
                            .ok_or_else(|| CollatzError::Malformed("missing is_trivial".into()))?,
                    }),
                    (Verdict::Sat, None) => {
                        return Err(CollatzError::Malformed(
                            "SAT certificate without x0_candidate".into(),
                        ))
                    }
                    (Verdict::Unsat, Some(_)) => {
                        return Err(CollatzError::Malformed(
                            "UNSAT certificate carries a witness".into(),
                        ))
                    }
                    (Verdict::Unsat, None) => None,
                };
                Ok(Certificate::TypeB(TypeBCertificate {
                    pattern,
                    k,
                    max_nodes,
                    nodes,
                    verdict,
                    witness,
                    hash,
                }))
            }
            other => Err(CollatzError::Malformed(format!(
                "unknown certificate type '{other}'"
            ))),
        }
    }

    /// Parses one JSON line.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(input)
            .map_err(|err| CollatzError::Malformed(format!("invalid certificate JSON: {err}")))?;
        Self::from_json_value(&value)
    }
}

fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CollatzError::Malformed(format!("missing {key}")))
}

fn param_field(map: &Map<String, Value>, key: &str) -> Result<u64> {
    match map.get(key) {
        None | Some(Value::Null) => Err(CollatzError::ParameterMismatch(format!(
            "certificate does not declare {key}"
        ))),
        Some(v) => v.as_u64().ok_or_else(|| {
            CollatzError::ParameterMismatch(format!("{key} is not a non-negative integer"))
        }),
    }
}

fn parse_int<T: FromStr>(map: &Map<String, Value>, key: &str) -> Result<T> {
    str_field(map, key)?
        .parse()
        .map_err(|_| CollatzError::Malformed(format!("{key} is not a decimal integer")))
}

/// Proves `pattern` and seals the result into a certificate.
///
/// Fails with [`CollatzError::ResourceExhausted`] or
/// [`CollatzError::ArithmeticInvariantViolation`] instead of emitting a
/// certificate that would misstate the outcome.
pub fn certify(pattern: &Pattern, cfg: &ProverConfig) -> Result<Certificate> {
    let proof = prove_pattern(pattern, cfg)?;
    Certificate::from_proof(pattern, cfg, &proof)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(k: u32) -> ProverConfig {
        ProverConfig {
            k,
            max_nodes: 10_000,
        }
    }

    #[test]
    fn test_type_a_record_layout() {
        let cert = certify(&Pattern::parse("2,1,3,1").unwrap(), &cfg(32)).unwrap();
        let value = cert.to_json_value();
        assert_eq!(value["type"], "A");
        assert_eq!(value["B"], "151");
        assert_eq!(value["D"], "47");
        assert_eq!(value["reason"], "non-integer fixed point");
        assert!(value.get("x0").is_none());
        assert_eq!(value["hash"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_non_positive_carries_x0() {
        let cert = certify(&Pattern::parse("1,2").unwrap(), &cfg(32)).unwrap();
        assert_eq!(cert.to_json_value()["x0"], "-5");
    }

    #[test]
    fn test_trivial_type_b_record() {
        let cert = certify(&Pattern::parse("2,2").unwrap(), &cfg(16)).unwrap();
        let value = cert.to_json_value();
        assert_eq!(value["type"], "B");
        assert_eq!(value["verdict"], "SAT");
        assert_eq!(value["x0_candidate"], "1");
        assert_eq!(value["is_trivial"], true);
        assert_eq!(value["k"], 16);
        assert!(!cert.is_nontrivial_sat());
    }

    #[test]
    fn test_exhausted_search_has_no_certificate() {
        let err = certify(
            &Pattern::parse("2,2").unwrap(),
            &ProverConfig {
                k: 32,
                max_nodes: 1,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CollatzError::ResourceExhausted { .. }));
    }

    #[test]
    fn test_line_roundtrip_preserves_hash() {
        for p in ["2,1,3,1", "1,2", "2,2,2"] {
            let cert = certify(&Pattern::parse(p).unwrap(), &cfg(20)).unwrap();
            let parsed = Certificate::from_json_str(&cert.to_json_line()).unwrap();
            assert_eq!(parsed, cert);
            assert_eq!(parsed.compute_hash(), *parsed.hash());
        }
    }

    #[test]
    fn test_canonical_form_is_sorted_and_compact() {
        let cert = certify(&Pattern::parse("2,1,3,1").unwrap(), &cfg(32)).unwrap();
        let line = cert.canonical_value().to_string();
        assert!(line.starts_with(r#"{"B":"151","D":"47","pattern":[2,1,3,1],"reason""#));
        assert!(line.ends_with(r#""type":"A"}"#));
        assert!(!line.contains(": "));
    }

    #[test]
    fn test_hash_tracks_content() {
        let cert = certify(&Pattern::parse("2,2").unwrap(), &cfg(16)).unwrap();
        let mut changed = cert.clone();
        if let Certificate::TypeB(c) = &mut changed {
            c.k = 17;
        }
        assert_ne!(changed.compute_hash(), cert.compute_hash());
    }

    #[test]
    fn test_missing_k_is_parameter_mismatch() {
        let cert = certify(&Pattern::parse("2,2").unwrap(), &cfg(16)).unwrap();
        let mut value = cert.to_json_value();
        value.as_object_mut().unwrap().remove("k");
        assert!(matches!(
            Certificate::from_json_value(&value),
            Err(CollatzError::ParameterMismatch(_))
        ));
        let mut value = cert.to_json_value();
        value.as_object_mut().unwrap().remove("x0_candidate");
        assert!(matches!(
            Certificate::from_json_value(&value),
            Err(CollatzError::Malformed(_))
        ));
    }
}
