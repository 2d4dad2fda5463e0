//! Evidence package assembly.
//!
//! A package is a fixed mapping of file names to bytes that lets anyone
//! re-verify a sealed record with no access to this system. Binary
//! artifacts (signature, timestamp token) are stored base64-encoded so
//! every file is representable as text. Absent artifacts become empty
//! files rather than missing entries.

use std::io::Write;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::claim::ClaimMetadata;
use crate::error::{SealError, SealResult};
use crate::pqc::{PQC_ALGORITHM_NAME, PQC_STANDARD_NAME};

pub const FILE_RESPONSE: &str = "response.txt";
pub const FILE_CANONICAL: &str = "canonical.bin";
pub const FILE_HASH: &str = "hash.sha256";
pub const FILE_SIGNATURE: &str = "signature.sig";
pub const FILE_TIMESTAMP: &str = "timestamp.tsr";
pub const FILE_METADATA: &str = "metadata.json";
pub const FILE_PUBLIC_KEY: &str = "public_key.pem";
pub const FILE_PQC_SIGNATURE: &str = "signature_pqc.sig";
pub const FILE_PQC_PUBLIC_KEY: &str = "pqc_public_key.pem";
pub const FILE_PQC_ALGORITHM: &str = "pqc_algorithm.json";

/// Canonical entry order for package serialization.
pub const CANONICAL_ORDER: [&str; 10] = [
    FILE_RESPONSE,
    FILE_CANONICAL,
    FILE_HASH,
    FILE_SIGNATURE,
    FILE_TIMESTAMP,
    FILE_METADATA,
    FILE_PUBLIC_KEY,
    FILE_PQC_SIGNATURE,
    FILE_PQC_PUBLIC_KEY,
    FILE_PQC_ALGORITHM,
];

/// Post-quantum artifacts, present only when the record was PQC-signed.
#[derive(Debug, Clone)]
pub struct PqcArtifacts {
    pub signature: Vec<u8>,
    pub public_key_pem: String,
}

/// Everything the builder needs to assemble a package.
#[derive(Debug, Clone)]
pub struct PackageInput {
    pub response_text: String,
    /// The exact bytes that were hashed (canonical response, plus the
    /// claim payload when a claim was bound in).
    pub canonical_bytes: Vec<u8>,
    pub hash_hex: String,
    pub signature: Option<Vec<u8>>,
    pub tsa_token: Option<Vec<u8>>,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub response_id: Option<i64>,
    pub public_key_pem: Option<String>,
    pub claim: Option<ClaimMetadata>,
    /// Policy-coverage payload from the policy layer, passed through into
    /// metadata untouched.
    pub policy_coverage: Option<serde_json::Value>,
    pub pqc: Option<PqcArtifacts>,
}

/// `metadata.json` contents. Extra fields are flat and optional; `model`
/// and `created_at` are always present.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PackageMetadata {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_coverage: Option<serde_json::Value>,
}

/// Build the 7-file package, or 10 files when PQC artifacts are supplied.
/// Entries come back in canonical order.
pub fn build_package(input: &PackageInput) -> SealResult<Vec<(String, Vec<u8>)>> {
    let metadata = PackageMetadata {
        model: input.model.clone(),
        created_at: input
            .created_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        response_id: input.response_id,
        claim: input.claim.as_ref().map(|c| c.claim.clone()),
        confidence: input.claim.as_ref().map(|c| c.confidence),
        policy_version: input.claim.as_ref().map(|c| c.policy_version.clone()),
        policy_coverage: input.policy_coverage.clone(),
    };
    let metadata_json = serde_json::to_vec_pretty(&metadata)?;

    let encode_opt = |bytes: &Option<Vec<u8>>| -> Vec<u8> {
        bytes
            .as_ref()
            .map(|b| BASE64.encode(b).into_bytes())
            .unwrap_or_default()
    };

    let mut files = vec![
        (FILE_RESPONSE.to_string(), input.response_text.clone().into_bytes()),
        (FILE_CANONICAL.to_string(), input.canonical_bytes.clone()),
        (FILE_HASH.to_string(), input.hash_hex.clone().into_bytes()),
        (FILE_SIGNATURE.to_string(), encode_opt(&input.signature)),
        (FILE_TIMESTAMP.to_string(), encode_opt(&input.tsa_token)),
        (FILE_METADATA.to_string(), metadata_json),
        (
            FILE_PUBLIC_KEY.to_string(),
            input
                .public_key_pem
                .clone()
                .unwrap_or_default()
                .into_bytes(),
        ),
    ];

    if let Some(pqc) = &input.pqc {
        let algorithm = serde_json::json!({
            "algorithm": PQC_ALGORITHM_NAME,
            "standard": PQC_STANDARD_NAME,
        });
        files.push((
            FILE_PQC_SIGNATURE.to_string(),
            BASE64.encode(&pqc.signature).into_bytes(),
        ));
        files.push((
            FILE_PQC_PUBLIC_KEY.to_string(),
            pqc.public_key_pem.clone().into_bytes(),
        ));
        files.push((
            FILE_PQC_ALGORITHM.to_string(),
            serde_json::to_vec(&algorithm)?,
        ));
    }

    Ok(files)
}

/// Serialize a package to a ZIP archive in canonical entry order.
pub fn to_zip(files: &[(String, Vec<u8>)]) -> SealResult<Vec<u8>> {
    let mut ordered: Vec<&(String, Vec<u8>)> = files.iter().collect();
    ordered.sort_by_key(|(name, _)| {
        CANONICAL_ORDER
            .iter()
            .position(|n| n == name)
            .unwrap_or(CANONICAL_ORDER.len())
    });

    let mut buf = std::io::Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(&mut buf);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in ordered {
        writer
            .start_file(name.clone(), options)
            .map_err(|e| SealError::io(format!("cannot start zip entry {name}: {e}")))?;
        writer
            .write_all(bytes)
            .map_err(|e| SealError::io(format!("cannot write zip entry {name}: {e}")))?;
    }
    writer
        .finish()
        .map_err(|e| SealError::io(format!("cannot finish zip archive: {e}")))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn minimal_input() -> PackageInput {
        PackageInput {
            response_text: "2+2 equals 4.\n".into(),
            canonical_bytes: b"2+2 equals 4.\n".to_vec(),
            hash_hex: "ab".repeat(32),
            signature: None,
            tsa_token: None,
            model: "test-model".into(),
            created_at: "2026-01-01T00:00:00Z".parse().unwrap(),
            response_id: None,
            public_key_pem: None,
            claim: None,
            policy_coverage: None,
            pqc: None,
        }
    }

    #[test]
    fn seven_files_in_canonical_order() {
        let files = build_package(&minimal_input()).unwrap();
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, &CANONICAL_ORDER[..7]);
    }

    #[test]
    fn absent_artifacts_become_empty_files() {
        let files = build_package(&minimal_input()).unwrap();
        let get = |name: &str| &files.iter().find(|(n, _)| n == name).unwrap().1;
        assert!(get(FILE_SIGNATURE).is_empty());
        assert!(get(FILE_TIMESTAMP).is_empty());
        assert!(get(FILE_PUBLIC_KEY).is_empty());
    }

    #[test]
    fn signature_and_token_are_base64_text() {
        let mut input = minimal_input();
        input.signature = Some(vec![0xde, 0xad, 0xbe, 0xef]);
        input.tsa_token = Some(vec![0x30, 0x03, 0x02, 0x01, 0x01]);
        let files = build_package(&input).unwrap();
        let get = |name: &str| &files.iter().find(|(n, _)| n == name).unwrap().1;
        assert_eq!(get(FILE_SIGNATURE), b"3q2+7w==");
        let token_text = String::from_utf8(get(FILE_TIMESTAMP).clone()).unwrap();
        assert_eq!(BASE64.decode(token_text).unwrap(), vec![0x30, 0x03, 0x02, 0x01, 0x01]);
    }

    #[test]
    fn metadata_carries_model_and_created_at() {
        let mut input = minimal_input();
        input.response_id = Some(42);
        input.claim = Some(ClaimMetadata {
            claim: "It complies.".into(),
            confidence: 0.85,
            model: "test-model".into(),
            policy_version: "gdpr-2024".into(),
        });
        let files = build_package(&input).unwrap();
        let raw = &files.iter().find(|(n, _)| n == FILE_METADATA).unwrap().1;
        let metadata: PackageMetadata = serde_json::from_slice(raw).unwrap();
        assert_eq!(metadata.model, "test-model");
        assert_eq!(metadata.created_at, "2026-01-01T00:00:00Z");
        assert_eq!(metadata.response_id, Some(42));
        assert_eq!(metadata.claim.as_deref(), Some("It complies."));
        assert_eq!(metadata.policy_version.as_deref(), Some("gdpr-2024"));
    }

    #[test]
    fn pqc_artifacts_extend_to_ten_files() {
        let mut input = minimal_input();
        input.pqc = Some(PqcArtifacts {
            signature: vec![1, 2, 3],
            public_key_pem: "-----BEGIN ML-DSA-65 PUBLIC KEY-----\n".into(),
        });
        let files = build_package(&input).unwrap();
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, &CANONICAL_ORDER[..]);
        let algo = &files.iter().find(|(n, _)| n == FILE_PQC_ALGORITHM).unwrap().1;
        let algo: serde_json::Value = serde_json::from_slice(algo).unwrap();
        assert_eq!(algo["algorithm"], "ML-DSA (Dilithium3)");
        assert_eq!(algo["standard"], "FIPS 204");
    }

    #[test]
    fn zip_round_trip_preserves_entries() {
        let mut input = minimal_input();
        input.signature = Some(vec![9, 9, 9]);
        let files = build_package(&input).unwrap();
        let zipped = to_zip(&files).unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zipped)).unwrap();
        assert_eq!(archive.len(), 7);
        for (i, (name, bytes)) in files.iter().enumerate() {
            let mut entry = archive.by_index(i).unwrap();
            assert_eq!(entry.name(), name);
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            assert_eq!(&contents, bytes, "entry {name}");
        }
    }
}
