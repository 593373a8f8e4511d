//! Box-wide proving and the atlas file format.
//!
//! An atlas is a JSON-lines file: one canonical certificate per line in
//! enumeration order, followed by a single batch record.  The batch hash
//! binds the Merkle root of the certificate hashes, the certificate count and
//! the box descriptor, so reordering, dropping or editing any record changes
//! it.  Blank lines and lines starting with `#` are ignored when reading.

use crate::certificate::{certify, Certificate};
use crate::error::{CollatzError, Result};
use crate::merkle::{digest_from_hex, digest_to_hex, merkle_root, Digest32};
use crate::pattern::{Pattern, PatternBox};
use crate::prover::ProverConfig;
use blake2::digest::{consts::U32, Digest};
use blake2::Blake2b;
#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

const BATCH_DOMAIN: &[u8] = b"COLLATZ_GHOST_BATCH_V1";

/// Box and precision an atlas was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxDescriptor {
    /// Pattern length.
    #[serde(rename = "M")]
    pub m: usize,
    /// Smallest exponent.
    pub amin: u32,
    /// Largest exponent.
    pub amax: u32,
    /// Type B target precision.
    pub k: u32,
}

impl BoxDescriptor {
    /// Describes `bx` proved at precision `k`.
    pub fn new(bx: &PatternBox, k: u32) -> Self {
        Self {
            m: bx.m,
            amin: bx.amin,
            amax: bx.amax,
            k,
        }
    }

    /// The enumerated box.
    pub fn pattern_box(&self) -> PatternBox {
        PatternBox {
            m: self.m,
            amin: self.amin,
            amax: self.amax,
        }
    }

    fn canonical_value(&self) -> Value {
        json!({ "M": self.m, "amin": self.amin, "amax": self.amax, "k": self.k })
    }
}

/// Trailing record of an atlas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    /// Digest over the root, the count and the descriptor.
    pub batch_hash: Digest32,
    /// Number of certificate lines.
    pub certificate_count: usize,
    /// Box and precision.
    pub box_descriptor: BoxDescriptor,
    /// Merkle root of the certificate hashes in file order.
    pub merkle_root: Digest32,
}

/// Batch digest for a given Merkle root, count and descriptor.
pub fn batch_digest(root: &Digest32, count: usize, descriptor: &BoxDescriptor) -> Digest32 {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(BATCH_DOMAIN);
    hasher.update(root);
    hasher.update((count as u64).to_le_bytes());
    hasher.update(descriptor.canonical_value().to_string().as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

impl BatchRecord {
    /// Seals the batch over `hashes`, taken in the given order.
    pub fn seal(hashes: &[Digest32], box_descriptor: BoxDescriptor) -> Self {
        let root = merkle_root(hashes);
        Self {
            batch_hash: batch_digest(&root, hashes.len(), &box_descriptor),
            certificate_count: hashes.len(),
            box_descriptor,
            merkle_root: root,
        }
    }

    /// JSON form written as the last atlas line.
    pub fn to_json_value(&self) -> Value {
        json!({
            "batch_hash": digest_to_hex(&self.batch_hash),
            "certificate_count": self.certificate_count,
            "box_descriptor": self.box_descriptor.canonical_value(),
            "merkle_root": digest_to_hex(&self.merkle_root),
        })
    }

    /// Decodes a batch line without checking it.
    ///
    /// A digest that is not exactly 64 lower-case hex characters is an
    /// [`CollatzError::IntegrityFailure`].  For `batch_hash` the reported
    /// digest is recomputed from the other stored fields.
    pub fn from_json_value(value: &Value) -> Result<Self> {
        let text_field = |key: &str| -> Result<&str> {
            value
                .get(key)
                .and_then(Value::as_str)
                .ok_or_else(|| CollatzError::Malformed(format!("batch record missing {key}")))
        };
        let certificate_count = value
            .get("certificate_count")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| CollatzError::Malformed("batch record missing certificate_count".into()))?;
        let box_descriptor: BoxDescriptor = serde_json::from_value(
            value
                .get("box_descriptor")
                .cloned()
                .ok_or_else(|| CollatzError::Malformed("batch record missing box_descriptor".into()))?,
        )
        .map_err(|err| CollatzError::Malformed(format!("invalid box_descriptor: {err}")))?;
        let stored_root = text_field("merkle_root")?;
        let merkle_root = digest_from_hex(stored_root).map_err(|err| {
            CollatzError::IntegrityFailure {
                stored: stored_root.to_string(),
                computed: err,
            }
        })?;
        let stored_batch = text_field("batch_hash")?;
        let batch_hash = digest_from_hex(stored_batch).map_err(|_| CollatzError::IntegrityFailure {
            stored: stored_batch.to_string(),
            computed: digest_to_hex(&batch_digest(&merkle_root, certificate_count, &box_descriptor)),
        })?;
        Ok(Self {
            batch_hash,
            certificate_count,
            box_descriptor,
            merkle_root,
        })
    }
}

/// Certificates of a box in enumeration order, with their batch record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atlas {
    /// Certificates in enumeration order.
    pub certificates: Vec<Certificate>,
    /// Batch record sealed over `certificates`.
    pub batch: BatchRecord,
}

impl Atlas {
    /// Seals `certificates` into an atlas for `descriptor`.
    pub fn new(certificates: Vec<Certificate>, descriptor: BoxDescriptor) -> Self {
        let hashes: Vec<Digest32> = certificates.iter().map(|c| *c.hash()).collect();
        let batch = BatchRecord::seal(&hashes, descriptor);
        Self {
            certificates,
            batch,
        }
    }

    /// Full JSON-lines text, batch record last.
    pub fn to_jsonl(&self) -> String {
        let mut out = String::new();
        for cert in &self.certificates {
            out.push_str(&cert.to_json_line());
            out.push('\n');
        }
        out.push_str(&self.batch.to_json_value().to_string());
        out.push('\n');
        out
    }

    /// Writes the atlas and returns the SHA-256 hex checksum of the bytes written.
    pub fn write_jsonl(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let text = self.to_jsonl();
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        let checksum = hex::encode(Sha256::digest(text.as_bytes()));
        info!(
            path = %path.display(),
            certificates = self.certificates.len(),
            sha256 = %checksum,
            "atlas written"
        );
        Ok(checksum)
    }

    /// Reads an atlas file without verifying it.
    pub fn read_jsonl(path: impl AsRef<Path>) -> Result<ParsedAtlas> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| CollatzError::Io(format!("failed to read {}: {err}", path.display())))?;
        parse_atlas(&text)
    }
}

/// One certificate line as decoded from a file.
#[derive(Debug, Clone)]
pub struct AtlasEntry {
    /// One-based line number.
    pub line: usize,
    /// Decoded certificate, or why it could not be decoded.
    pub certificate: Result<Certificate>,
}

/// An atlas read back from text, with undecodable lines kept as errors.
#[derive(Debug, Clone)]
pub struct ParsedAtlas {
    /// Certificate lines in file order.
    pub entries: Vec<AtlasEntry>,
    /// The trailing batch record as stored.
    pub batch: BatchRecord,
}

/// Splits atlas text into certificate entries and the batch record.
///
/// A defective certificate line becomes an erroring entry.  A missing,
/// repeated or non-final batch record fails the whole parse.
pub fn parse_atlas(text: &str) -> Result<ParsedAtlas> {
    let mut entries = Vec::new();
    let mut batch = None;
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let number = idx + 1;
        if batch.is_some() {
            return Err(CollatzError::Malformed(format!(
                "line {number}: record after the batch record"
            )));
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                entries.push(AtlasEntry {
                    line: number,
                    certificate: Err(CollatzError::Malformed(format!("invalid JSON: {err}"))),
                });
                continue;
            }
        };
        if value.get("batch_hash").is_some() {
            batch = Some(BatchRecord::from_json_value(&value)?);
        } else {
            entries.push(AtlasEntry {
                line: number,
                certificate: Certificate::from_json_value(&value),
            });
        }
    }
    let batch = batch.ok_or_else(|| CollatzError::Malformed("atlas has no batch record".into()))?;
    Ok(ParsedAtlas { entries, batch })
}

/// Limits for a box run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasOptions {
    /// Prove only the first `limit` patterns of the enumeration.
    pub limit: Option<usize>,
}

/// Result of proving a box.
#[derive(Debug, Clone)]
pub struct AtlasRun {
    /// Certified patterns, sealed.
    pub atlas: Atlas,
    /// Patterns that produced no certificate, with the reason.
    pub skipped: Vec<(Pattern, CollatzError)>,
}

#[cfg(not(target_arch = "wasm32"))]
fn certify_all(patterns: &[Pattern], cfg: &ProverConfig) -> Vec<Result<Certificate>> {
    patterns.par_iter().map(|p| certify(p, cfg)).collect()
}

#[cfg(target_arch = "wasm32")]
fn certify_all(patterns: &[Pattern], cfg: &ProverConfig) -> Vec<Result<Certificate>> {
    patterns.iter().map(|p| certify(p, cfg)).collect()
}

/// Proves every pattern of `bx` (up to `opts.limit`) and seals the atlas.
///
/// Patterns are proved in parallel; results are gathered back into
/// enumeration order before sealing.  Exhausted or inconsistent patterns are
/// reported in [`AtlasRun::skipped`] and left out of the atlas.
pub fn build_atlas(bx: &PatternBox, cfg: &ProverConfig, opts: &AtlasOptions) -> Result<AtlasRun> {
    bx.validate()?;
    cfg.validate()?;
    let patterns: Vec<Pattern> = bx.iter().take(opts.limit.unwrap_or(usize::MAX)).collect();
    info!(
        m = bx.m,
        amin = bx.amin,
        amax = bx.amax,
        k = cfg.k,
        box_size = ?bx.count(),
        patterns = patterns.len(),
        "proving box"
    );
    let results = certify_all(&patterns, cfg);
    let mut certificates = Vec::with_capacity(patterns.len());
    let mut skipped = Vec::new();
    for (pattern, result) in patterns.into_iter().zip(results) {
        match result {
            Ok(cert) => certificates.push(cert),
            Err(err) => {
                warn!(pattern = %pattern, error = %err, "pattern skipped");
                skipped.push((pattern, err));
            }
        }
    }
    let atlas = Atlas::new(certificates, BoxDescriptor::new(bx, cfg.k));
    info!(
        certificates = atlas.certificates.len(),
        skipped = skipped.len(),
        batch_hash = %digest_to_hex(&atlas.batch.batch_hash),
        "box sealed"
    );
    Ok(AtlasRun { atlas, skipped })
}
