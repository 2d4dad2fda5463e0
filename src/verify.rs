//! Offline verification of evidence packages.
//!
//! A package is accepted as a directory of files or a `.aep` ZIP archive;
//! archives are extracted into a temporary directory that is removed on
//! every exit path. Verification is a single pass over the contents with
//! no retries: checks run in a fixed order and the first mandatory failure
//! is terminal. Malformed content never raises an error, it produces an
//! `Invalid` result with a readable reason.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use serde::Serialize;
use tempfile::TempDir;

use crate::digest::{decode_hash_hex, sha256};
use crate::evidence::{
    PackageMetadata, FILE_CANONICAL, FILE_HASH, FILE_METADATA, FILE_PQC_PUBLIC_KEY,
    FILE_PQC_SIGNATURE, FILE_PUBLIC_KEY, FILE_SIGNATURE, FILE_TIMESTAMP,
};
use crate::signer::verify_digest_signature;
use crate::tsa::rfc3161;
use crate::{evidence, pqc};

const CLAIM_DISPLAY_LIMIT: usize = 80;

/// Outcome of a verification run. `pqc_valid` is `None` when the package
/// carries no post-quantum artifacts.
#[derive(Serialize, Debug, Clone)]
pub struct VerificationResult {
    pub valid: bool,
    pub report: Vec<String>,
    pub failure_reason: Option<String>,
    pub pqc_valid: Option<bool>,
}

impl VerificationResult {
    fn valid(report: Vec<String>, pqc_valid: Option<bool>) -> Self {
        Self {
            valid: true,
            report,
            failure_reason: None,
            pqc_valid,
        }
    }

    fn invalid(report: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            report,
            failure_reason: Some(reason.into()),
            pqc_valid: None,
        }
    }
}

/// Verify an evidence package at `path` (directory or `.aep` archive).
pub fn verify_package(path: &Path) -> VerificationResult {
    let files = if path.is_dir() {
        read_package_dir(path)
    } else {
        read_package_zip(path)
    };
    match files {
        Ok(files) => verify_files(&files),
        Err(reason) => VerificationResult::invalid(Vec::new(), reason),
    }
}

fn read_package_dir(dir: &Path) -> Result<HashMap<String, Vec<u8>>, String> {
    let mut files = HashMap::new();
    for name in evidence::CANONICAL_ORDER {
        let path = dir.join(name);
        if path.is_file() {
            let bytes = std::fs::read(&path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            files.insert(name.to_string(), bytes);
        }
    }
    Ok(files)
}

fn read_package_zip(path: &Path) -> Result<HashMap<String, Vec<u8>>, String> {
    let file = File::open(path).map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format!("not a readable archive: {e}"))?;

    // Extract into a scoped temporary directory; dropped (and deleted) on
    // every return path.
    let tmp = TempDir::new().map_err(|e| format!("cannot create temporary directory: {e}"))?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| format!("cannot read archive entry: {e}"))?;
        let Some(enclosed) = entry.enclosed_name() else {
            continue;
        };
        let Some(file_name) = enclosed.file_name().map(|n| n.to_owned()) else {
            continue;
        };
        let dest = tmp.path().join(file_name);
        let mut out =
            File::create(&dest).map_err(|e| format!("cannot extract archive entry: {e}"))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| format!("cannot extract archive entry: {e}"))?;
    }
    read_package_dir(tmp.path())
}

fn verify_files(files: &HashMap<String, Vec<u8>>) -> VerificationResult {
    let mut report = Vec::new();

    // 1. Load
    let hash_hex = match files.get(FILE_HASH).map(|b| text(b)) {
        Some(h) if !h.is_empty() => h,
        _ => return VerificationResult::invalid(report, "hash.sha256 missing or empty"),
    };
    let Ok(digest) = decode_hash_hex(&hash_hex) else {
        return VerificationResult::invalid(
            report,
            "hash.sha256 is not a 64-character hex digest",
        );
    };
    let Some(canonical) = files.get(FILE_CANONICAL) else {
        return VerificationResult::invalid(report, "canonical.bin missing");
    };
    let public_key_pem = match files.get(FILE_PUBLIC_KEY).map(|b| text(b)) {
        Some(p) if !p.is_empty() => p,
        _ => return VerificationResult::invalid(report, "public_key.pem missing or empty"),
    };

    // 2. Hash
    if sha256(canonical) != digest {
        return VerificationResult::invalid(report, "hash mismatch");
    }
    report.push("hash: OK".to_string());

    // 3. Signature
    let Ok(public_key) = RsaPublicKey::from_public_key_pem(&public_key_pem) else {
        return VerificationResult::invalid(report, "public_key.pem unreadable");
    };
    let signature_b64 = files.get(FILE_SIGNATURE).map(|b| text(b)).unwrap_or_default();
    let signature_ok = !signature_b64.is_empty()
        && BASE64
            .decode(&signature_b64)
            .map(|sig| verify_digest_signature(&public_key, &digest, &sig))
            .unwrap_or(false);
    if !signature_ok {
        return VerificationResult::invalid(report, "signature invalid");
    }
    report.push("signature: OK".to_string());

    // 4. Timestamp
    let token_b64 = files.get(FILE_TIMESTAMP).map(|b| text(b)).unwrap_or_default();
    if token_b64.is_empty() {
        report.push("timestamp: (none)".to_string());
    } else {
        let token = BASE64
            .decode(&token_b64)
            .ok()
            .and_then(|der| rfc3161::parse_token(&der).ok());
        let Some(token) = token else {
            return VerificationResult::invalid(report, "timestamp invalid");
        };
        report.push(format!("timestamp: {}", token.tst_info.gen_time));
        if token.certificate_der.is_some() && !rfc3161::verify_token_signature(&token) {
            return VerificationResult::invalid(report, "timestamp signature invalid");
        }
    }

    // 5. PQC (informational unless policy says otherwise)
    let pqc_sig = files.get(FILE_PQC_SIGNATURE).map(|b| text(b)).unwrap_or_default();
    let pqc_pem = files.get(FILE_PQC_PUBLIC_KEY).map(|b| text(b)).unwrap_or_default();
    let pqc_valid = if !pqc_sig.is_empty() && !pqc_pem.is_empty() {
        let ok = pqc::verify_with_pem(&pqc_pem, &digest, &pqc_sig);
        report.push(format!(
            "PQC signature: {}",
            if ok { "valid" } else { "invalid" }
        ));
        Some(ok)
    } else {
        report.push("PQC signature: not present".to_string());
        None
    };

    // 6. Metadata enrichment
    if let Some(metadata) = files
        .get(FILE_METADATA)
        .and_then(|b| serde_json::from_slice::<PackageMetadata>(b).ok())
    {
        if let Some(claim) = metadata.claim.filter(|c| !c.is_empty()) {
            report.push(format!("claim: {}", truncate(&claim, CLAIM_DISPLAY_LIMIT)));
        }
        if let Some(policy) = metadata.policy_version.filter(|p| !p.is_empty()) {
            report.push(format!("policy_version: {policy}"));
        }
    }

    VerificationResult::valid(report, pqc_valid)
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
