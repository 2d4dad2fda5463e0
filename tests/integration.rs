//! End-to-end sealing and verification scenarios.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use veriseal::pipeline::Pipeline;
use veriseal::pqc::PqcSigner;
use veriseal::signer::RsaSigner;
use veriseal::tsa::LocalTsa;
use veriseal::verify::verify_package;
use veriseal::{evidence, sha256_hex};

fn pipeline(pqc: PqcSigner) -> Pipeline {
    Pipeline::new(
        RsaSigner::new(Some(PathBuf::from("tests/data/signing_key_pkcs8.pem"))),
        pqc,
        Box::new(LocalTsa::new().unwrap()),
    )
}

fn write_package(dir: &Path, files: &[(String, Vec<u8>)]) {
    for (name, bytes) in files {
        std::fs::write(dir.join(name), bytes).unwrap();
    }
}

fn sealed_package() -> Vec<(String, Vec<u8>)> {
    let pipeline = pipeline(PqcSigner::disabled());
    let record = pipeline
        .seal("What is 2+2?", "2+2 equals 4.\n", "test-model")
        .unwrap();
    pipeline.build_package(&record, Some(1)).unwrap()
}

#[test]
fn end_to_end_seal_and_verify() {
    let pipeline = pipeline(PqcSigner::disabled());
    let record = pipeline
        .seal("What is 2+2?", "2+2 equals 4.\n", "test-model")
        .unwrap();

    // already-canonical input passes through unchanged
    assert_eq!(record.signed_payload, b"2+2 equals 4.\n");
    assert_eq!(
        record.response_hash,
        sha256_hex(b"2+2 equals 4.\n").unwrap()
    );

    let files = pipeline.build_package(&record, Some(1)).unwrap();
    let dir = TempDir::new().unwrap();
    write_package(dir.path(), &files);

    let result = verify_package(dir.path());
    assert!(result.valid, "report: {:?}", result.report);
    assert!(result.report.contains(&"hash: OK".to_string()));
    assert!(result.report.contains(&"signature: OK".to_string()));
    assert!(result
        .report
        .contains(&"timestamp: 2026-01-01T00:00:00Z".to_string()));
    assert!(result
        .report
        .contains(&"PQC signature: not present".to_string()));
    assert!(result.pqc_valid.is_none());
}

#[test]
fn zip_and_directory_verification_agree() {
    let files = sealed_package();

    let dir = TempDir::new().unwrap();
    write_package(dir.path(), &files);
    let from_dir = verify_package(dir.path());

    let zip_dir = TempDir::new().unwrap();
    let zip_path = zip_dir.path().join("package.aep");
    std::fs::write(&zip_path, evidence::to_zip(&files).unwrap()).unwrap();
    let from_zip = verify_package(&zip_path);

    assert!(from_dir.valid);
    assert!(from_zip.valid);
    assert_eq!(from_dir.report, from_zip.report);
}

#[test]
fn tampered_canonical_bytes_fail_hash_check() {
    let files = sealed_package();
    let dir = TempDir::new().unwrap();
    write_package(dir.path(), &files);
    std::fs::write(dir.path().join(evidence::FILE_CANONICAL), b"2+2 equals 5.\n").unwrap();

    let result = verify_package(dir.path());
    assert!(!result.valid);
    assert_eq!(result.failure_reason.as_deref(), Some("hash mismatch"));
}

#[test]
fn unrelated_signature_fails_signature_check() {
    let files = sealed_package();
    let dir = TempDir::new().unwrap();
    write_package(dir.path(), &files);

    // a signature from a different payload, same key
    let other = pipeline(PqcSigner::disabled())
        .seal("q", "a completely different response", "test-model")
        .unwrap();
    std::fs::write(
        dir.path().join(evidence::FILE_SIGNATURE),
        other.signature.unwrap(),
    )
    .unwrap();

    let result = verify_package(dir.path());
    assert!(!result.valid);
    assert_eq!(result.failure_reason.as_deref(), Some("signature invalid"));
    assert!(result.report.contains(&"hash: OK".to_string()));
}

#[test]
fn missing_timestamp_is_not_a_failure() {
    let files = sealed_package();
    let dir = TempDir::new().unwrap();
    write_package(dir.path(), &files);
    std::fs::write(dir.path().join(evidence::FILE_TIMESTAMP), b"").unwrap();

    let result = verify_package(dir.path());
    assert!(result.valid);
    assert!(result.report.contains(&"timestamp: (none)".to_string()));
}

#[test]
fn garbage_timestamp_is_invalid() {
    let files = sealed_package();
    let dir = TempDir::new().unwrap();
    write_package(dir.path(), &files);
    std::fs::write(dir.path().join(evidence::FILE_TIMESTAMP), b"bm90IGEgdG9rZW4=").unwrap();

    let result = verify_package(dir.path());
    assert!(!result.valid);
    assert_eq!(result.failure_reason.as_deref(), Some("timestamp invalid"));
}

#[test]
fn pqc_signed_package_verifies_and_reports_valid() {
    let key_dir = TempDir::new().unwrap();
    let key_path = key_dir.path().join("pqc_key.pem");
    std::fs::write(&key_path, veriseal::pqc::seed_to_pem(&[11u8; 32])).unwrap();

    let pipeline = pipeline(PqcSigner::new(true, Some(key_path)));
    let record = pipeline.seal("q", "some response\n", "test-model").unwrap();
    assert!(record.signature_pqc.is_some());

    let files = pipeline.build_package(&record, None).unwrap();
    assert_eq!(files.len(), 10);
    let dir = TempDir::new().unwrap();
    write_package(dir.path(), &files);

    let result = verify_package(dir.path());
    assert!(result.valid, "report: {:?}", result.report);
    assert_eq!(result.pqc_valid, Some(true));
    assert!(result.report.contains(&"PQC signature: valid".to_string()));
}

#[test]
fn pqc_mismatch_is_reported_but_not_fatal() {
    let key_dir = TempDir::new().unwrap();
    let key_path = key_dir.path().join("pqc_key.pem");
    std::fs::write(&key_path, veriseal::pqc::seed_to_pem(&[12u8; 32])).unwrap();

    let pipeline = pipeline(PqcSigner::new(true, Some(key_path)));
    let record = pipeline.seal("q", "some response\n", "test-model").unwrap();
    let files = pipeline.build_package(&record, None).unwrap();

    let dir = TempDir::new().unwrap();
    write_package(dir.path(), &files);
    // PQC signature from an unrelated payload
    let unrelated = pipeline.seal("q", "other response\n", "test-model").unwrap();
    std::fs::write(
        dir.path().join(evidence::FILE_PQC_SIGNATURE),
        unrelated.signature_pqc.unwrap(),
    )
    .unwrap();

    let result = verify_package(dir.path());
    assert!(result.valid);
    assert_eq!(result.pqc_valid, Some(false));
    assert!(result.report.contains(&"PQC signature: invalid".to_string()));
}

#[test]
fn cli_verifies_package_and_exits_zero() {
    let files = sealed_package();
    let dir = TempDir::new().unwrap();
    write_package(dir.path(), &files);

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_veriseal_verify"))
        .arg(dir.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hash: OK"));
    assert!(stdout.trim_end().ends_with("VALID"));
}

#[test]
fn cli_usage_error_exits_one() {
    let status = std::process::Command::new(env!("CARGO_BIN_EXE_veriseal_verify"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn claim_bearing_package_verifies_with_claim_in_report() {
    let pipeline = pipeline(PqcSigner::disabled());
    let record = pipeline
        .seal(
            "Does this comply with GDPR article 17?",
            "Erasure requests are honored within 30 days. See the retention schedule.",
            "test-model",
        )
        .unwrap();
    assert!(record.claim.is_some());

    let files = pipeline.build_package(&record, Some(7)).unwrap();
    let dir = TempDir::new().unwrap();
    write_package(dir.path(), &files);

    let result = verify_package(dir.path());
    assert!(result.valid, "report: {:?}", result.report);
    assert!(result
        .report
        .iter()
        .any(|line| line.starts_with("claim: Erasure requests are honored")));
    assert!(result
        .report
        .contains(&"policy_version: gdpr-2024".to_string()));
}
