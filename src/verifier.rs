//! Independent certificate verifier.
//!
//! The verifier consumes serialized records only.  Type A claims are
//! recomputed from the pattern through the composer.  Type B claims are
//! checked twice: a SAT witness is walked through every valuation congruence
//! and the closure directly, then the bounded search is replayed under the
//! parameters the certificate declares and must reproduce its verdict, its
//! witness and its node count.  Parameters the verifier was told to expect
//! but that the certificate does not carry are reported as inconclusive,
//! never reinterpreted.
//!
//! A confirmed SAT whose witness is not the trivial cycle is a
//! [`SignificantFinding`].  Findings never fold into the ordinary counters
//! and always force exit code [`EXIT_SIGNIFICANT`].

use crate::atlas::{batch_digest, Atlas, AtlasEntry, BoxDescriptor, ParsedAtlas};
use crate::certificate::{Certificate, TypeACertificate, TypeBCertificate, Verdict};
use crate::error::{CollatzError, Result};
use crate::exclusion::{check_pattern, FixedPointClass};
use crate::merkle::{digest_to_hex, merkle_root, Digest32};
use crate::pattern::Pattern;
use crate::residue::valuation;
use crate::solver::{search, SearchVerdict};
use num_bigint::BigUint;
use num_traits::{One, Zero};
#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, warn};

/// Every certificate verified and no finding.
pub const EXIT_OK: i32 = 0;
/// A certificate failed or was inconclusive, or the batch did not check.
pub const EXIT_FAILURE: i32 = 1;
/// A non-trivial SAT verdict was confirmed.
pub const EXIT_SIGNIFICANT: i32 = 99;

/// Parameters a verification run insists on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Required Type B precision, if any.
    pub expected_k: Option<u32>,
    /// Required Type B node cap, if any.
    pub expected_max_nodes: Option<u64>,
}

/// Outcome for a single certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStatus {
    /// Every claim was reproduced.
    Verified,
    /// A claim is wrong or the record was tampered with.
    Failed(CollatzError),
    /// The claim could not be checked under the declared parameters.
    Inconclusive(CollatzError),
}

impl CertificateStatus {
    /// `true` for [`CertificateStatus::Verified`].
    pub fn is_verified(&self) -> bool {
        matches!(self, CertificateStatus::Verified)
    }
}

/// Per-line verification result.
#[derive(Debug, Clone)]
pub struct CertificateReport {
    /// One-based line in the atlas file, or position for in-memory atlases.
    pub line: usize,
    /// Pattern, when the record could be decoded.
    pub pattern: Option<Pattern>,
    /// Status.
    pub status: CertificateStatus,
}

/// A confirmed SAT verdict whose witness is not the trivial cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignificantFinding {
    /// Atlas line.
    pub line: usize,
    /// Pattern.
    pub pattern: Pattern,
    /// Precision of the witness.
    pub k: u32,
    /// Witness class modulo `2^k`.
    pub witness: BigUint,
    /// The witness itself, taken as an integer, runs a real cycle.
    pub real_cycle: bool,
}

/// A non-trivial SAT claim that did not verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconfirmedClaim {
    /// Atlas line.
    pub line: usize,
    /// Pattern.
    pub pattern: Pattern,
    /// Claimed witness.
    pub witness: BigUint,
    /// Why the claim was not confirmed.
    pub reason: CollatzError,
}

/// Aggregate result of verifying an atlas.
#[derive(Debug, Clone)]
pub struct VerificationSummary {
    /// Per-certificate results in file order.
    pub reports: Vec<CertificateReport>,
    /// Count of verified certificates.
    pub verified: usize,
    /// Count of failed certificates.
    pub failed: usize,
    /// Count of inconclusive certificates.
    pub inconclusive: usize,
    /// Batch record check.
    pub batch: std::result::Result<(), CollatzError>,
    /// Confirmed non-trivial SAT verdicts.
    pub findings: Vec<SignificantFinding>,
    /// Non-trivial SAT claims that did not verify.
    pub unconfirmed: Vec<UnconfirmedClaim>,
}

impl VerificationSummary {
    /// Process exit code: 99 for any finding, else 1 for any failure, else 0.
    pub fn exit_code(&self) -> i32 {
        if !self.findings.is_empty() {
            EXIT_SIGNIFICANT
        } else if self.failed > 0
            || self.inconclusive > 0
            || self.batch.is_err()
            || !self.unconfirmed.is_empty()
        {
            EXIT_FAILURE
        } else {
            EXIT_OK
        }
    }

    /// `true` when every certificate and the batch record verified.
    pub fn all_verified(&self) -> bool {
        self.failed == 0 && self.inconclusive == 0 && self.batch.is_ok()
    }
}

fn mask(x: &BigUint, bits: u64) -> BigUint {
    if x.bits() <= bits {
        return x.clone();
    }
    x & ((BigUint::one() << bits) - 1u32)
}

/// Checks a residue class modulo `2^k` against every step and the closure.
///
/// Each step needs `v₂(3x + 1) = a`, which fixes the low `a + 1` bits of
/// `3x + 1`.  Bits of the iterate run out as steps consume them; a walk that
/// cannot finish is checked only on what it can see.
pub fn witness_satisfies(pattern: &Pattern, witness: &BigUint, k: u32) -> bool {
    let k = u64::from(k);
    if witness.bits() > k {
        return false;
    }
    let mut x = witness.clone();
    let mut known = k;
    for &a in pattern.exponents() {
        let a = u64::from(a);
        let t = mask(&(&x * 3u32 + 1u32), known);
        let target = BigUint::one() << a;
        if known <= a {
            return t == mask(&target, known);
        }
        if mask(&t, a + 1) != target {
            return false;
        }
        x = t >> a;
        known -= a;
    }
    mask(&x, known) == mask(witness, known)
}

/// Runs the odd-step map on the integer `x0` and returns the iterates when it
/// follows `pattern` exactly and returns to `x0`.
pub fn integer_cycle(pattern: &Pattern, x0: &BigUint) -> Option<Vec<BigUint>> {
    if x0.is_zero() || !x0.bit(0) {
        return None;
    }
    let mut trajectory = Vec::with_capacity(pattern.len() + 1);
    let mut x = x0.clone();
    trajectory.push(x.clone());
    for &a in pattern.exponents() {
        let t = &x * 3u32 + 1u32;
        if valuation(&t) != Some(u64::from(a)) {
            return None;
        }
        x = t >> a;
        trajectory.push(x.clone());
    }
    (&x == x0).then_some(trajectory)
}

fn failed(msg: String) -> CertificateStatus {
    CertificateStatus::Failed(CollatzError::ClaimRejected(msg))
}

fn verify_type_a(cert: &TypeACertificate) -> CertificateStatus {
    let recomputed = match check_pattern(&cert.pattern) {
        Ok(result) => result,
        Err(err) => return CertificateStatus::Failed(err),
    };
    if recomputed.b != cert.b || recomputed.d != cert.d {
        return failed(format!(
            "claimed B = {}, D = {}; recomputed B = {}, D = {}",
            cert.b, cert.d, recomputed.b, recomputed.d
        ));
    }
    if recomputed.class != cert.reason {
        return failed(format!(
            "claimed '{}', recomputed '{}'",
            cert.reason, recomputed.class
        ));
    }
    if !cert.reason.is_exclusion() {
        return failed(format!("'{}' is not an exclusion", cert.reason));
    }
    let expected_x0 = match recomputed.class {
        FixedPointClass::NonPositive => recomputed.x0,
        _ => None,
    };
    if expected_x0 != cert.x0 {
        return failed("fixed point x0 does not match".into());
    }
    CertificateStatus::Verified
}

fn check_parameters(cert: &TypeBCertificate, cfg: &VerifierConfig) -> Option<CollatzError> {
    if cert.k == 0 || cert.max_nodes == 0 {
        return Some(CollatzError::ParameterMismatch(format!(
            "declared k = {} and max_nodes = {} cannot be replayed",
            cert.k, cert.max_nodes
        )));
    }
    if let Some(k) = cfg.expected_k.filter(|&k| k != cert.k) {
        return Some(CollatzError::ParameterMismatch(format!(
            "certificate k = {}, verifier expects {k}",
            cert.k
        )));
    }
    if let Some(cap) = cfg.expected_max_nodes.filter(|&c| c != cert.max_nodes) {
        return Some(CollatzError::ParameterMismatch(format!(
            "certificate max_nodes = {}, verifier expects {cap}",
            cert.max_nodes
        )));
    }
    None
}

fn verify_type_b(cert: &TypeBCertificate, cfg: &VerifierConfig) -> CertificateStatus {
    if let Some(err) = check_parameters(cert, cfg) {
        return CertificateStatus::Inconclusive(err);
    }
    match check_pattern(&cert.pattern) {
        Ok(fp) if fp.is_excluded() => {
            return failed(format!(
                "pattern is already excluded by type A ({})",
                fp.class
            ))
        }
        Ok(_) => {}
        Err(err) => return CertificateStatus::Failed(err),
    }
    if let Some(w) = &cert.witness {
        if !witness_satisfies(&cert.pattern, &w.x0, cert.k) {
            return failed(format!(
                "witness {} does not satisfy the pattern modulo 2^{}",
                w.x0, cert.k
            ));
        }
        let trivial = cert.pattern.is_all_twos() && w.x0.is_one();
        if trivial != w.is_trivial {
            return failed(format!("is_trivial should be {trivial}"));
        }
    }
    let replay = search(&cert.pattern, cert.k, cert.max_nodes);
    let replay_witness = match replay.verdict {
        SearchVerdict::Exhausted => {
            return CertificateStatus::Inconclusive(CollatzError::ResourceExhausted {
                nodes: replay.stats.nodes_created,
                max_nodes: cert.max_nodes,
            })
        }
        SearchVerdict::Unsat => None,
        SearchVerdict::Sat { witness } => Some(witness),
    };
    let claimed_witness = cert.witness.as_ref().map(|w| &w.x0);
    match (cert.verdict, &replay_witness) {
        (Verdict::Unsat, Some(found)) => {
            return failed(format!("claimed UNSAT, replay found witness {found}"))
        }
        (Verdict::Sat, None) => return failed("claimed SAT, replay is UNSAT".into()),
        _ => {}
    }
    if claimed_witness != replay_witness.as_ref() {
        return failed("witness differs from replay".into());
    }
    if replay.stats.nodes_created != cert.nodes {
        return failed(format!(
            "claimed {} nodes, replay created {}",
            cert.nodes, replay.stats.nodes_created
        ));
    }
    CertificateStatus::Verified
}

/// Verifies one certificate on its own: hash, then every claim.
pub fn verify_certificate(cert: &Certificate, cfg: &VerifierConfig) -> CertificateStatus {
    let computed = cert.compute_hash();
    if &computed != cert.hash() {
        return CertificateStatus::Failed(CollatzError::IntegrityFailure {
            stored: digest_to_hex(cert.hash()),
            computed: digest_to_hex(&computed),
        });
    }
    match cert {
        Certificate::TypeA(c) => verify_type_a(c),
        Certificate::TypeB(c) => verify_type_b(c, cfg),
    }
}

fn verify_entry(
    entry: &AtlasEntry,
    descriptor: &BoxDescriptor,
    cfg: &VerifierConfig,
) -> CertificateStatus {
    let cert = match &entry.certificate {
        Ok(cert) => cert,
        Err(err @ CollatzError::ParameterMismatch(_)) => {
            return CertificateStatus::Inconclusive(err.clone())
        }
        Err(err) => return CertificateStatus::Failed(err.clone()),
    };
    if !descriptor.pattern_box().contains(cert.pattern()) {
        return CertificateStatus::Failed(CollatzError::InvalidBox(format!(
            "pattern {} lies outside the atlas box",
            cert.pattern()
        )));
    }
    if let Certificate::TypeB(c) = cert {
        if c.k != descriptor.k {
            return CertificateStatus::Inconclusive(CollatzError::ParameterMismatch(format!(
                "certificate k = {}, atlas k = {}",
                c.k, descriptor.k
            )));
        }
    }
    verify_certificate(cert, cfg)
}

fn check_batch(parsed: &ParsedAtlas) -> std::result::Result<(), CollatzError> {
    let batch = &parsed.batch;
    batch.box_descriptor.pattern_box().validate()?;
    if batch.certificate_count != parsed.entries.len() {
        return Err(CollatzError::IntegrityFailure {
            stored: format!("{} certificates", batch.certificate_count),
            computed: format!("{} certificates", parsed.entries.len()),
        });
    }
    let hashes = parsed
        .entries
        .iter()
        .map(|e| match &e.certificate {
            Ok(cert) => Ok(cert.compute_hash()),
            Err(_) => Err(CollatzError::Malformed(format!(
                "line {} cannot be hashed",
                e.line
            ))),
        })
        .collect::<Result<Vec<Digest32>>>()?;
    let root = merkle_root(&hashes);
    if root != batch.merkle_root {
        return Err(CollatzError::IntegrityFailure {
            stored: digest_to_hex(&batch.merkle_root),
            computed: digest_to_hex(&root),
        });
    }
    let digest = batch_digest(&root, hashes.len(), &batch.box_descriptor);
    if digest != batch.batch_hash {
        return Err(CollatzError::IntegrityFailure {
            stored: digest_to_hex(&batch.batch_hash),
            computed: digest_to_hex(&digest),
        });
    }
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn verify_entries(
    entries: &[AtlasEntry],
    descriptor: &BoxDescriptor,
    cfg: &VerifierConfig,
) -> Vec<CertificateStatus> {
    entries
        .par_iter()
        .map(|e| verify_entry(e, descriptor, cfg))
        .collect()
}

#[cfg(target_arch = "wasm32")]
fn verify_entries(
    entries: &[AtlasEntry],
    descriptor: &BoxDescriptor,
    cfg: &VerifierConfig,
) -> Vec<CertificateStatus> {
    entries
        .iter()
        .map(|e| verify_entry(e, descriptor, cfg))
        .collect()
}

/// Verifies every certificate of a parsed atlas and its batch record.
pub fn verify_atlas(parsed: &ParsedAtlas, cfg: &VerifierConfig) -> VerificationSummary {
    let descriptor = parsed.batch.box_descriptor;
    let mut statuses = verify_entries(&parsed.entries, &descriptor, cfg);

    // Certificates must appear in strictly increasing enumeration order.
    let mut previous: Option<&Pattern> = None;
    for (entry, status) in parsed.entries.iter().zip(statuses.iter_mut()) {
        let Ok(cert) = &entry.certificate else {
            continue;
        };
        let pattern = cert.pattern();
        if let Some(prev) = previous.filter(|prev| pattern <= *prev) {
            if status.is_verified() {
                *status = CertificateStatus::Failed(CollatzError::Malformed(format!(
                    "pattern {pattern} does not follow {prev} in enumeration order"
                )));
            }
        }
        previous = Some(pattern);
    }

    let mut summary = VerificationSummary {
        reports: Vec::with_capacity(statuses.len()),
        verified: 0,
        failed: 0,
        inconclusive: 0,
        batch: check_batch(parsed),
        findings: Vec::new(),
        unconfirmed: Vec::new(),
    };
    if let Err(err) = &summary.batch {
        warn!(error = %err, "batch record failed");
    }

    for (entry, status) in parsed.entries.iter().zip(statuses) {
        let cert = entry.certificate.as_ref().ok();
        match &status {
            CertificateStatus::Verified => summary.verified += 1,
            CertificateStatus::Failed(err) => {
                summary.failed += 1;
                warn!(line = entry.line, error = %err, "certificate failed");
            }
            CertificateStatus::Inconclusive(err) => {
                summary.inconclusive += 1;
                warn!(line = entry.line, error = %err, "certificate inconclusive");
            }
        }
        if let Some(Certificate::TypeB(c)) = cert {
            let claimed_ghost = c
                .witness
                .as_ref()
                .filter(|w| !(c.pattern.is_all_twos() && w.x0.is_one()));
            if let Some(w) = claimed_ghost {
                match &status {
                    CertificateStatus::Verified => {
                        let real_cycle = integer_cycle(&c.pattern, &w.x0).is_some();
                        error!(
                            line = entry.line,
                            pattern = %c.pattern,
                            k = c.k,
                            witness = %w.x0,
                            real_cycle,
                            "confirmed non-trivial SAT"
                        );
                        summary.findings.push(SignificantFinding {
                            line: entry.line,
                            pattern: c.pattern.clone(),
                            k: c.k,
                            witness: w.x0.clone(),
                            real_cycle,
                        });
                    }
                    CertificateStatus::Failed(reason) | CertificateStatus::Inconclusive(reason) => {
                        summary.unconfirmed.push(UnconfirmedClaim {
                            line: entry.line,
                            pattern: c.pattern.clone(),
                            witness: w.x0.clone(),
                            reason: reason.clone(),
                        });
                    }
                }
            }
        }
        summary.reports.push(CertificateReport {
            line: entry.line,
            pattern: cert.map(|c| c.pattern().clone()),
            status,
        });
    }
    info!(
        verified = summary.verified,
        failed = summary.failed,
        inconclusive = summary.inconclusive,
        findings = summary.findings.len(),
        "verification finished"
    );
    summary
}

/// Verifies an in-memory atlas as if it had been read back from disk.
pub fn verify_built_atlas(atlas: &Atlas, cfg: &VerifierConfig) -> VerificationSummary {
    let parsed = ParsedAtlas {
        entries: atlas
            .certificates
            .iter()
            .enumerate()
            .map(|(idx, cert)| AtlasEntry {
                line: idx + 1,
                certificate: Ok(cert.clone()),
            })
            .collect(),
        batch: atlas.batch.clone(),
    };
    verify_atlas(&parsed, cfg)
}

/// Reads and verifies an atlas file.
pub fn verify_file(path: impl AsRef<Path>, cfg: &VerifierConfig) -> Result<VerificationSummary> {
    let parsed = Atlas::read_jsonl(path)?;
    Ok(verify_atlas(&parsed, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{build_atlas, parse_atlas, AtlasOptions};
    use crate::certificate::{certify, GhostWitness};
    use crate::pattern::PatternBox;
    use crate::prover::ProverConfig;
    use proptest::prelude::*;

    fn prover(k: u32) -> ProverConfig {
        ProverConfig {
            k,
            max_nodes: 10_000,
        }
    }

    fn small_atlas() -> Atlas {
        build_atlas(
            &PatternBox::new(2, 1, 3).unwrap(),
            &prover(16),
            &AtlasOptions::default(),
        )
        .unwrap()
        .atlas
    }

    /// Re-seals a Type B certificate after its fields were edited.
    fn forge(mut cert: TypeBCertificate) -> Certificate {
        cert.hash = [0u8; 32];
        let unsealed = Certificate::TypeB(cert.clone());
        cert.hash = unsealed.compute_hash();
        Certificate::TypeB(cert)
    }

    #[test]
    fn test_roundtrip_verifies_cleanly() {
        let atlas = small_atlas();
        let parsed = parse_atlas(&atlas.to_jsonl()).unwrap();
        let summary = verify_atlas(&parsed, &VerifierConfig::default());
        assert_eq!(summary.verified, 9);
        assert_eq!(summary.failed, 0);
        assert!(summary.batch.is_ok());
        assert!(summary.findings.is_empty());
        assert_eq!(summary.exit_code(), EXIT_OK);
    }

    #[test]
    fn test_single_character_hash_tamper() {
        let atlas = small_atlas();
        let text = atlas.to_jsonl();
        let first = text.lines().next().unwrap();
        let value: serde_json::Value = serde_json::from_str(first).unwrap();
        let hash = value["hash"].as_str().unwrap().to_string();

        let mut variants = Vec::new();
        let flipped = if hash.starts_with('0') { "1" } else { "0" };
        variants.push(format!("{flipped}{}", &hash[1..]));
        if let Some(pos) = hash.find(|c: char| c.is_ascii_lowercase()) {
            let mut upper = hash.clone();
            upper[pos..pos + 1].make_ascii_uppercase();
            variants.push(upper);
        }
        variants.push(format!("g{}", &hash[1..]));
        variants.push(format!("{hash} "));

        for tampered_hash in variants {
            let tampered = text.replacen(&hash, &tampered_hash, 1);
            let summary = verify_atlas(&parse_atlas(&tampered).unwrap(), &VerifierConfig::default());
            assert_eq!(summary.failed, 1, "accepted {tampered_hash}");
            match &summary.reports[0].status {
                CertificateStatus::Failed(CollatzError::IntegrityFailure { stored, computed }) => {
                    assert_eq!(stored, &tampered_hash);
                    assert_eq!(computed, &hash);
                }
                other => panic!("expected integrity failure for {tampered_hash}, got {other:?}"),
            }
            assert_eq!(summary.exit_code(), EXIT_FAILURE);
        }
    }

    #[test]
    fn test_edited_content_breaks_hash_and_batch() {
        let atlas = small_atlas();
        let tampered = atlas.to_jsonl().replacen("\"B\":\"5\"", "\"B\":\"6\"", 1);
        let summary = verify_atlas(&parse_atlas(&tampered).unwrap(), &VerifierConfig::default());
        assert_eq!(summary.failed, 1);
        assert!(matches!(
            summary.batch,
            Err(CollatzError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn test_forged_unsat_is_rejected() {
        let cert = certify(&Pattern::parse("2,2").unwrap(), &prover(16)).unwrap();
        let Certificate::TypeB(mut inner) = cert else {
            panic!("[2,2] needs type B");
        };
        inner.verdict = Verdict::Unsat;
        inner.witness = None;
        let status = verify_certificate(&forge(inner), &VerifierConfig::default());
        assert!(matches!(status, CertificateStatus::Failed(_)));
    }

    #[test]
    fn test_forged_nontrivial_claim_is_unconfirmed() {
        let atlas = small_atlas();
        let mut certificates = atlas.certificates.clone();
        let idx = certificates
            .iter()
            .position(|c| c.type_tag() == "B")
            .unwrap();
        let Certificate::TypeB(mut inner) = certificates[idx].clone() else {
            unreachable!()
        };
        inner.witness = Some(GhostWitness {
            x0: BigUint::from(3u32),
            is_trivial: false,
        });
        certificates[idx] = forge(inner);
        let forged = Atlas::new(certificates, atlas.batch.box_descriptor);
        let summary = verify_built_atlas(&forged, &VerifierConfig::default());
        assert!(summary.batch.is_ok());
        assert!(summary.findings.is_empty());
        assert_eq!(summary.unconfirmed.len(), 1);
        assert_eq!(summary.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_trivial_flag_does_not_hide_a_ghost_claim() {
        let atlas = small_atlas();
        let mut certificates = atlas.certificates.clone();
        let idx = certificates
            .iter()
            .position(|c| c.type_tag() == "B")
            .unwrap();
        let Certificate::TypeB(mut inner) = certificates[idx].clone() else {
            unreachable!()
        };
        inner.witness = Some(GhostWitness {
            x0: BigUint::from(3u32),
            is_trivial: true,
        });
        let forged_cert = forge(inner);
        assert!(forged_cert.is_nontrivial_sat());
        certificates[idx] = forged_cert;
        let forged = Atlas::new(certificates, atlas.batch.box_descriptor);
        let summary = verify_built_atlas(&forged, &VerifierConfig::default());
        assert!(summary.batch.is_ok());
        assert_eq!(summary.failed, 1);
        assert!(summary.findings.is_empty());
        assert_eq!(summary.unconfirmed.len(), 1);
        assert_eq!(summary.unconfirmed[0].witness, BigUint::from(3u32));
        assert_eq!(summary.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_wrong_type_a_claim_fails() {
        let cert = certify(&Pattern::parse("1,3").unwrap(), &prover(16)).unwrap();
        let Certificate::TypeA(mut inner) = cert else {
            panic!("[1,3] is excluded by type A");
        };
        inner.reason = FixedPointClass::NonPositive;
        let mut forged = Certificate::TypeA(inner);
        let digest = forged.compute_hash();
        if let Certificate::TypeA(c) = &mut forged {
            c.hash = digest;
        }
        assert!(matches!(
            verify_certificate(&forged, &VerifierConfig::default()),
            CertificateStatus::Failed(_)
        ));
    }

    #[test]
    fn test_parameter_mismatch_is_inconclusive() {
        let cert = certify(&Pattern::parse("2,2").unwrap(), &prover(16)).unwrap();
        let cfg = VerifierConfig {
            expected_k: Some(32),
            expected_max_nodes: None,
        };
        assert!(matches!(
            verify_certificate(&cert, &cfg),
            CertificateStatus::Inconclusive(CollatzError::ParameterMismatch(_))
        ));
        let cfg = VerifierConfig {
            expected_k: Some(16),
            expected_max_nodes: Some(10_000),
        };
        assert!(verify_certificate(&cert, &cfg).is_verified());

        let mut value = cert.to_json_value();
        value.as_object_mut().unwrap().remove("max_nodes");
        let atlas = Atlas::new(vec![cert], small_atlas().batch.box_descriptor);
        let mut lines: Vec<String> = atlas.to_jsonl().lines().map(str::to_string).collect();
        lines[0] = value.to_string();
        let summary = verify_atlas(
            &parse_atlas(&lines.join("\n")).unwrap(),
            &VerifierConfig::default(),
        );
        assert_eq!(summary.inconclusive, 1);
        assert_eq!(summary.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_order_and_box_membership() {
        let atlas = small_atlas();
        let mut certificates = atlas.certificates.clone();
        certificates.swap(0, 1);
        let swapped = Atlas::new(certificates, atlas.batch.box_descriptor);
        let summary = verify_built_atlas(&swapped, &VerifierConfig::default());
        assert!(summary.batch.is_ok());
        assert_eq!(summary.failed, 1);

        let outside = certify(&Pattern::parse("4,1").unwrap(), &prover(16)).unwrap();
        let mut certificates = atlas.certificates.clone();
        certificates.push(outside);
        let grown = Atlas::new(certificates, atlas.batch.box_descriptor);
        let summary = verify_built_atlas(&grown, &VerifierConfig::default());
        assert!(matches!(
            summary.reports[9].status,
            CertificateStatus::Failed(CollatzError::InvalidBox(_))
        ));
    }

    #[test]
    fn test_exit_code_precedence() {
        let mut summary = verify_built_atlas(&small_atlas(), &VerifierConfig::default());
        assert_eq!(summary.exit_code(), EXIT_OK);
        summary.failed = 1;
        assert_eq!(summary.exit_code(), EXIT_FAILURE);
        summary.findings.push(SignificantFinding {
            line: 1,
            pattern: Pattern::parse("2").unwrap(),
            k: 8,
            witness: BigUint::from(3u32),
            real_cycle: false,
        });
        assert_eq!(summary.exit_code(), EXIT_SIGNIFICANT);
    }

    #[test]
    fn test_integer_cycle() {
        let one = BigUint::one();
        assert_eq!(
            integer_cycle(&Pattern::parse("2,2").unwrap(), &one),
            Some(vec![one.clone(), one.clone(), one.clone()])
        );
        assert!(integer_cycle(&Pattern::parse("1,2").unwrap(), &one).is_none());
        assert!(integer_cycle(&Pattern::parse("2").unwrap(), &BigUint::from(2u32)).is_none());
        // 3 -> 5 -> 1 follows [1,4] but does not return to 3.
        assert!(integer_cycle(&Pattern::parse("1,4").unwrap(), &BigUint::from(3u32)).is_none());
    }

    proptest! {
        #[test]
        fn prop_replayed_witness_satisfies_independent_walk(
            exps in prop::collection::vec(1u32..6, 1..5),
            k in 1u32..40,
        ) {
            let p = Pattern::new(exps).unwrap();
            if let SearchVerdict::Sat { witness } = search(&p, k, 1_000).verdict {
                prop_assert!(witness_satisfies(&p, &witness, k));
                // Every step forces x odd, so the neighbouring class fails.
                let other = (&witness + 1u32) % (BigUint::one() << k);
                prop_assert!(!witness_satisfies(&p, &other, k));
            }
        }
    }
}
