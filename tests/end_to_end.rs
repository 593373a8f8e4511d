use collatz_ghost::{
    build_atlas, verify_file, Atlas, AtlasOptions, CertificateStatus, PatternBox, ProverConfig,
    VerifierConfig, EXIT_FAILURE, EXIT_OK,
};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn scratch_dir(tag: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("collatz_ghost_{tag}_{unique}"))
}

#[test]
fn prove_write_read_verify() {
    let bx = PatternBox::new(3, 1, 3).unwrap();
    let cfg = ProverConfig {
        k: 24,
        max_nodes: 100_000,
    };
    let run = build_atlas(&bx, &cfg, &AtlasOptions::default()).unwrap();
    assert!(run.skipped.is_empty());
    assert_eq!(run.atlas.certificates.len(), 27);

    let dir = scratch_dir("e2e");
    let path = dir.join("m3.jsonl");
    let checksum = run.atlas.write_jsonl(&path).unwrap();
    assert_eq!(checksum.len(), 64);

    let parsed = Atlas::read_jsonl(&path).unwrap();
    assert_eq!(parsed.batch, run.atlas.batch);

    let summary = verify_file(
        &path,
        &VerifierConfig {
            expected_k: Some(24),
            expected_max_nodes: Some(100_000),
        },
    )
    .unwrap();
    assert_eq!(summary.verified, 27);
    assert!(summary.all_verified());
    assert!(summary.findings.is_empty());
    assert!(summary.unconfirmed.is_empty());
    assert_eq!(summary.exit_code(), EXIT_OK);

    // The only Type B pattern in the box is the trivial cycle.
    let trivial = summary
        .reports
        .iter()
        .filter(|r| r.pattern.as_ref().is_some_and(|p| p.is_all_twos()))
        .count();
    assert_eq!(trivial, 1);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn verifier_under_other_parameters_is_inconclusive() {
    let bx = PatternBox::new(2, 2, 2).unwrap();
    let cfg = ProverConfig {
        k: 12,
        max_nodes: 1_000,
    };
    let run = build_atlas(&bx, &cfg, &AtlasOptions::default()).unwrap();
    let dir = scratch_dir("params");
    let path = dir.join("twos.jsonl");
    run.atlas.write_jsonl(&path).unwrap();

    let summary = verify_file(
        &path,
        &VerifierConfig {
            expected_k: Some(32),
            expected_max_nodes: None,
        },
    )
    .unwrap();
    assert_eq!(summary.inconclusive, 1);
    assert!(matches!(
        summary.reports[0].status,
        CertificateStatus::Inconclusive(_)
    ));
    assert_eq!(summary.exit_code(), EXIT_FAILURE);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn truncated_atlas_fails_batch_check() {
    let bx = PatternBox::new(2, 1, 2).unwrap();
    let run = build_atlas(&bx, &ProverConfig::default(), &AtlasOptions::default()).unwrap();
    let text = run.atlas.to_jsonl();
    let mut lines: Vec<&str> = text.lines().collect();
    lines.remove(0);
    let dir = scratch_dir("truncated");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("cut.jsonl");
    fs::write(&path, lines.join("\n")).unwrap();

    let summary = verify_file(&path, &VerifierConfig::default()).unwrap();
    assert_eq!(summary.failed, 0);
    assert!(summary.batch.is_err());
    assert_eq!(summary.exit_code(), EXIT_FAILURE);

    fs::remove_dir_all(&dir).unwrap();
}
