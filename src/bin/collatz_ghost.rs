//! Command-line driver for proving and verifying cycle-exclusion atlases.
//!
//! Output meant for machines goes to stdout as JSON; logs go to stderr and
//! are filtered through `COLLATZ_GHOST_LOG` (default `warn`).
//!
//! Exit codes: 0 on success, 1 on any error, inconclusive or failed
//! certificate, 99 when a non-trivial SAT verdict is confirmed.

use collatz_ghost::merkle::digest_to_hex;
use collatz_ghost::{
    build_atlas, certify, enumerate_ghosts, search, verify_certificate, verify_file, AtlasOptions,
    CertificateStatus, Pattern, PatternBox, ProverConfig, VerificationSummary, VerifierConfig,
    EXIT_OK, EXIT_SIGNIFICANT,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{env, fs, path::PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "COLLATZ_GHOST_LOG";

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_help() {
    println!("Usage: collatz-ghost <prove|prove-box|verify|ghosts> ...");
    println!("  prove --pattern <a1,a2,..> [--k N] [--max-nodes N] [--config file]");
    println!("  prove-box --m M --amax A [--amin a] [--k N] [--max-nodes N] [--limit N]");
    println!("            --out <atlas.jsonl> [--config file]");
    println!("  verify --atlas <atlas.jsonl> [--k N] [--max-nodes N] [--config file] [--verbose]");
    println!("  ghosts --pattern <a1,a2,..> [--k N] [--max-nodes N] [--config file]");
}

/// Settings that may come from `--config`; flags override them.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    k: Option<u32>,
    max_nodes: Option<u64>,
    limit: Option<usize>,
}

#[derive(Debug, Default)]
struct Flags {
    pattern: Option<String>,
    m: Option<usize>,
    amin: Option<u32>,
    amax: Option<u32>,
    k: Option<u32>,
    max_nodes: Option<u64>,
    limit: Option<usize>,
    out: Option<PathBuf>,
    atlas: Option<PathBuf>,
    config: Option<PathBuf>,
    verbose: bool,
}

fn parse_value<T: std::str::FromStr>(flag: &str, raw: Option<String>) -> T {
    let raw = raw.unwrap_or_else(|| fatal(&format!("{flag} expects a value")));
    raw.parse::<T>()
        .unwrap_or_else(|_| fatal(&format!("invalid {flag} value: {raw}")))
}

fn parse_flags(args: Vec<String>) -> Flags {
    let mut flags = Flags::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--pattern" => {
                flags.pattern = Some(
                    iter.next()
                        .unwrap_or_else(|| fatal("--pattern expects a value")),
                );
            }
            "--m" | "-M" => flags.m = Some(parse_value("--m", iter.next())),
            "--amin" => flags.amin = Some(parse_value("--amin", iter.next())),
            "--amax" => flags.amax = Some(parse_value("--amax", iter.next())),
            "--k" => flags.k = Some(parse_value("--k", iter.next())),
            "--max-nodes" => flags.max_nodes = Some(parse_value("--max-nodes", iter.next())),
            "--limit" => flags.limit = Some(parse_value("--limit", iter.next())),
            "--out" => flags.out = Some(parse_value("--out", iter.next())),
            "--atlas" => flags.atlas = Some(parse_value("--atlas", iter.next())),
            "--config" => flags.config = Some(parse_value("--config", iter.next())),
            "--verbose" | "-v" => flags.verbose = true,
            other => fatal(&format!("unknown argument: {other}")),
        }
    }
    flags
}

impl Flags {
    fn file_config(&self) -> ConfigFile {
        let Some(path) = &self.config else {
            return ConfigFile::default();
        };
        let text = fs::read_to_string(path)
            .unwrap_or_else(|err| fatal(&format!("failed to read {}: {err}", path.display())));
        serde_json::from_str(&text)
            .unwrap_or_else(|err| fatal(&format!("invalid config {}: {err}", path.display())))
    }

    fn prover_config(&self) -> ProverConfig {
        let file = self.file_config();
        let defaults = ProverConfig::default();
        let cfg = ProverConfig {
            k: self.k.or(file.k).unwrap_or(defaults.k),
            max_nodes: self.max_nodes.or(file.max_nodes).unwrap_or(defaults.max_nodes),
        };
        cfg.validate()
            .unwrap_or_else(|err| fatal(&format!("invalid configuration: {err}")));
        cfg
    }

    fn verifier_config(&self) -> VerifierConfig {
        let file = self.file_config();
        VerifierConfig {
            expected_k: self.k.or(file.k),
            expected_max_nodes: self.max_nodes.or(file.max_nodes),
        }
    }

    fn limit(&self) -> Option<usize> {
        self.limit.or_else(|| self.file_config().limit)
    }

    fn pattern(&self) -> Pattern {
        let raw = self
            .pattern
            .as_deref()
            .unwrap_or_else(|| fatal("--pattern is required"));
        Pattern::parse(raw).unwrap_or_else(|err| fatal(&err.to_string()))
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => fatal(&format!("failed to encode output: {err}")),
    }
}

fn cmd_prove(flags: Flags) -> i32 {
    let pattern = flags.pattern();
    let cfg = flags.prover_config();
    let cert = certify(&pattern, &cfg)
        .unwrap_or_else(|err| fatal(&format!("pattern {pattern}: {err}")));
    println!("{}", cert.to_json_line());
    if cert.is_nontrivial_sat() {
        match verify_certificate(&cert, &VerifierConfig::default()) {
            CertificateStatus::Verified => {
                error!(pattern = %pattern, "confirmed non-trivial SAT");
                return EXIT_SIGNIFICANT;
            }
            status => fatal(&format!("non-trivial SAT did not verify: {status:?}")),
        }
    }
    EXIT_OK
}

fn cmd_prove_box(flags: Flags) -> i32 {
    let m = flags.m.unwrap_or_else(|| fatal("--m is required"));
    let amax = flags.amax.unwrap_or_else(|| fatal("--amax is required"));
    let amin = flags.amin.unwrap_or(1);
    let out = flags
        .out
        .clone()
        .unwrap_or_else(|| fatal("--out is required"));
    let bx = PatternBox::new(m, amin, amax).unwrap_or_else(|err| fatal(&err.to_string()));
    let cfg = flags.prover_config();
    let opts = AtlasOptions {
        limit: flags.limit(),
    };
    let run = build_atlas(&bx, &cfg, &opts)
        .unwrap_or_else(|err| fatal(&format!("box run failed: {err}")));
    let checksum = run
        .atlas
        .write_jsonl(&out)
        .unwrap_or_else(|err| fatal(&format!("failed to write {}: {err}", out.display())));
    let type_b = run
        .atlas
        .certificates
        .iter()
        .filter(|c| c.type_tag() == "B")
        .count();
    let skipped: Vec<Value> = run
        .skipped
        .iter()
        .map(|(pattern, err)| json!({ "pattern": pattern, "error": err.to_string() }))
        .collect();
    print_json(&json!({
        "atlas": out.display().to_string(),
        "certificates": run.atlas.certificates.len(),
        "type_a": run.atlas.certificates.len() - type_b,
        "type_b": type_b,
        "merkle_root": digest_to_hex(&run.atlas.batch.merkle_root),
        "batch_hash": digest_to_hex(&run.atlas.batch.batch_hash),
        "sha256": checksum,
        "skipped": skipped,
    }));
    if run.skipped.is_empty() {
        EXIT_OK
    } else {
        1
    }
}

fn summary_json(summary: &VerificationSummary, verbose: bool) -> Value {
    let findings: Vec<Value> = summary
        .findings
        .iter()
        .map(|f| {
            json!({
                "line": f.line,
                "pattern": f.pattern,
                "k": f.k,
                "witness": f.witness.to_string(),
                "real_cycle": f.real_cycle,
            })
        })
        .collect();
    let unconfirmed: Vec<Value> = summary
        .unconfirmed
        .iter()
        .map(|c| {
            json!({
                "line": c.line,
                "pattern": c.pattern,
                "witness": c.witness.to_string(),
                "reason": c.reason.to_string(),
            })
        })
        .collect();
    let mut out = json!({
        "verified": summary.verified,
        "failed": summary.failed,
        "inconclusive": summary.inconclusive,
        "batch": match &summary.batch {
            Ok(()) => Value::String("ok".into()),
            Err(err) => Value::String(err.to_string()),
        },
        "significant_findings": findings,
        "unconfirmed_claims": unconfirmed,
        "exit_code": summary.exit_code(),
    });
    if verbose {
        let reports: Vec<Value> = summary
            .reports
            .iter()
            .map(|r| {
                let (status, reason) = match &r.status {
                    CertificateStatus::Verified => ("verified", None),
                    CertificateStatus::Failed(err) => ("failed", Some(err.to_string())),
                    CertificateStatus::Inconclusive(err) => ("inconclusive", Some(err.to_string())),
                };
                json!({
                    "line": r.line,
                    "pattern": r.pattern,
                    "status": status,
                    "reason": reason,
                })
            })
            .collect();
        if let Value::Object(map) = &mut out {
            map.insert("certificates".into(), Value::Array(reports));
        }
    }
    out
}

fn cmd_verify(flags: Flags) -> i32 {
    let path = flags
        .atlas
        .clone()
        .unwrap_or_else(|| fatal("--atlas is required"));
    let cfg = flags.verifier_config();
    let summary = verify_file(&path, &cfg)
        .unwrap_or_else(|err| fatal(&format!("cannot verify {}: {err}", path.display())));
    print_json(&summary_json(&summary, flags.verbose));
    if !summary.findings.is_empty() {
        eprintln!(
            "SIGNIFICANT: {} confirmed non-trivial SAT verdict(s) in {}",
            summary.findings.len(),
            path.display()
        );
    }
    summary.exit_code()
}

fn cmd_ghosts(flags: Flags) -> i32 {
    let pattern = flags.pattern();
    let cfg = flags.prover_config();
    let ghosts = enumerate_ghosts(&pattern, cfg.k, cfg.max_nodes).unwrap_or_else(|| {
        fatal(&format!(
            "node cap {} exhausted before every branch was visited",
            cfg.max_nodes
        ))
    });
    info!(pattern = %pattern, ghosts = ghosts.len(), "enumeration finished");
    let classes: Vec<String> = ghosts.iter().map(|g| g.to_string()).collect();
    // Bit-by-bit refinement that reaches the first ghost.
    let first = search(&pattern, cfg.k, cfg.max_nodes);
    let path: Vec<Value> = first
        .witness_path()
        .into_iter()
        .map(|(precision, residue)| json!({ "precision": precision, "residue": residue.to_string() }))
        .collect();
    print_json(&json!({
        "pattern": pattern,
        "k": cfg.k,
        "ghosts": classes,
        "witness_path": path,
        "search_nodes": first.tree.len(),
    }));
    EXIT_OK
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let command = args.next();
    let code = match command.as_deref() {
        Some("prove") => cmd_prove(parse_flags(args.collect())),
        Some("prove-box") => cmd_prove_box(parse_flags(args.collect())),
        Some("verify") => cmd_verify(parse_flags(args.collect())),
        Some("ghosts") => cmd_ghosts(parse_flags(args.collect())),
        Some("-h") | Some("--help") | Some("help") => {
            print_help();
            EXIT_OK
        }
        Some(other) => {
            print_help();
            fatal(&format!("unknown command: {other}"))
        }
        None => {
            print_help();
            std::process::exit(1);
        }
    };
    std::process::exit(code);
}
