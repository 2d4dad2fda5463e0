//! The sealing pipeline: canonicalize, claim, hash, sign, timestamp.
//!
//! Each stage degrades independently. A missing signing key skips signing
//! and timestamping but still produces a hash; a timestamp failure yields
//! a signed-but-not-timestamped record; an unavailable PQC signer is
//! simply skipped. Only caller mistakes (oversized or malformed input)
//! abort the run.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::canonical::canonicalize;
use crate::claim::{infer_claim, ClaimFormat, ClaimMetadata};
use crate::config::{SigningConfig, TsaMode};
use crate::digest::{decode_hash_hex, sha256_hex};
use crate::error::{SealError, SealResult};
use crate::evidence::{self, PackageInput, PqcArtifacts};
use crate::pqc::PqcSigner;
use crate::signer::RsaSigner;
use crate::tsa::{LocalTsa, RemoteTsa, TimestampAuthority};

/// A sealed record, shaped for the persistence layer.
#[derive(Debug, Clone)]
pub struct SealedRecord {
    pub prompt: String,
    pub response: String,
    pub response_hash: String,
    /// Base64 RSA signature, absent when no signing key is configured.
    pub signature: Option<String>,
    /// Base64 ML-DSA signature, absent when the PQC signer is unavailable.
    pub signature_pqc: Option<String>,
    pub pqc_public_key_pem: Option<String>,
    /// Raw DER timestamp token.
    pub tsa_token: Option<Vec<u8>>,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub claim: Option<ClaimMetadata>,
    /// The exact bytes that were hashed: canonical response, plus the
    /// claim payload when a claim was bound in.
    pub signed_payload: Vec<u8>,
}

pub struct Pipeline {
    signer: RsaSigner,
    pqc: PqcSigner,
    tsa: Box<dyn TimestampAuthority>,
}

impl Pipeline {
    pub fn new(signer: RsaSigner, pqc: PqcSigner, tsa: Box<dyn TimestampAuthority>) -> Self {
        Self { signer, pqc, tsa }
    }

    pub fn from_config(config: &SigningConfig) -> SealResult<Self> {
        let tsa: Box<dyn TimestampAuthority> = match &config.tsa_mode {
            TsaMode::Local => Box::new(LocalTsa::new()?),
            TsaMode::Remote { url } => Box::new(RemoteTsa::new(url.clone())?),
        };
        Ok(Self {
            signer: RsaSigner::new(config.signing_key.clone()),
            pqc: PqcSigner::new(config.pqc_enabled, config.pqc_key.clone()),
            tsa,
        })
    }

    /// Seal a prompt/response pair into a record.
    pub fn seal(&self, prompt: &str, response: &str, model: &str) -> SealResult<SealedRecord> {
        let canonical = canonicalize(response)?;
        let claim = infer_claim(prompt, response, model);

        let signed_payload = match &claim {
            Some(claim) => {
                let mut payload = canonical.clone();
                payload.push(b'\n');
                payload.extend_from_slice(&claim.canonical_bytes(ClaimFormat::Current));
                payload
            }
            None => canonical,
        };
        let response_hash = sha256_hex(&signed_payload)?;

        let signature = match self.signer.sign(&response_hash) {
            Ok(sig) => Some(sig),
            Err(SealError::KeyNotConfigured { message, .. }) => {
                tracing::warn!(%message, "sealing without RSA signature");
                None
            }
            Err(e) => return Err(e),
        };

        // The token is taken over the raw signature bytes: it attests to
        // when the signature existed. An unsigned record gets no timestamp.
        let tsa_token = match &signature {
            Some(sig_b64) => {
                let sig_bytes = BASE64
                    .decode(sig_b64)
                    .map_err(|e| SealError::serialization(format!("fresh signature: {e}")))?;
                match self.tsa.timestamp(&sig_bytes) {
                    Ok(token) => Some(token),
                    Err(SealError::TimestampFailed { message }) => {
                        tracing::warn!(%message, "sealing without timestamp");
                        None
                    }
                    Err(e) => return Err(e),
                }
            }
            None => None,
        };

        // PQC accompanies the classical signature, never replaces it.
        let (signature_pqc, pqc_public_key_pem) = if signature.is_some() && self.pqc.is_available()
        {
            let digest = decode_hash_hex(&response_hash)?;
            match (self.pqc.sign(&digest), self.pqc.public_key_pem()) {
                (Ok(sig), Ok(pem)) => (Some(sig), Some(pem)),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(error = %e, "sealing without PQC signature");
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        Ok(SealedRecord {
            prompt: prompt.to_string(),
            response: response.to_string(),
            response_hash,
            signature,
            signature_pqc,
            pqc_public_key_pem,
            tsa_token,
            model: model.to_string(),
            created_at: Utc::now(),
            claim,
            signed_payload,
        })
    }

    /// Assemble the evidence package files for a sealed record.
    pub fn build_package(
        &self,
        record: &SealedRecord,
        response_id: Option<i64>,
    ) -> SealResult<Vec<(String, Vec<u8>)>> {
        let signature = record
            .signature
            .as_ref()
            .map(|b64| {
                BASE64
                    .decode(b64)
                    .map_err(|e| SealError::serialization(format!("stored signature: {e}")))
            })
            .transpose()?;
        let pqc = match (&record.signature_pqc, &record.pqc_public_key_pem) {
            (Some(sig_b64), Some(pem)) => Some(PqcArtifacts {
                signature: BASE64
                    .decode(sig_b64)
                    .map_err(|e| SealError::serialization(format!("stored PQC signature: {e}")))?,
                public_key_pem: pem.clone(),
            }),
            _ => None,
        };
        let public_key_pem = match self.signer.public_key_pem() {
            Ok(pem) => Some(pem),
            Err(SealError::KeyNotConfigured { .. }) => None,
            Err(e) => return Err(e),
        };

        evidence::build_package(&PackageInput {
            response_text: record.response.clone(),
            canonical_bytes: record.signed_payload.clone(),
            hash_hex: record.response_hash.clone(),
            signature,
            tsa_token: record.tsa_token.clone(),
            model: record.model.clone(),
            created_at: record.created_at,
            response_id,
            public_key_pem,
            claim: record.claim.clone(),
            policy_coverage: None,
            pqc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::encode;
    use std::path::PathBuf;

    struct FailingTsa;
    impl TimestampAuthority for FailingTsa {
        fn timestamp(&self, _data: &[u8]) -> SealResult<Vec<u8>> {
            Err(SealError::timestamp_failed("authority offline"))
        }
    }

    fn signing_pipeline(tsa: Box<dyn TimestampAuthority>) -> Pipeline {
        Pipeline::new(
            RsaSigner::new(Some(PathBuf::from("tests/data/signing_key_pkcs8.pem"))),
            PqcSigner::disabled(),
            tsa,
        )
    }

    #[test]
    fn seal_produces_hash_signature_and_token() {
        let pipeline = signing_pipeline(Box::new(LocalTsa::new().unwrap()));
        let record = pipeline
            .seal("What is 2+2?", "2+2 equals 4.\n", "test-model")
            .unwrap();
        assert_eq!(record.signed_payload, b"2+2 equals 4.\n");
        assert_eq!(record.response_hash.len(), 64);
        assert!(record.signature.is_some());
        assert!(record.tsa_token.is_some());
        assert!(record.claim.is_none());
        assert!(record.signature_pqc.is_none());
    }

    #[test]
    fn claim_is_bound_into_the_hashed_payload() {
        let pipeline = signing_pipeline(Box::new(LocalTsa::new().unwrap()));
        let record = pipeline
            .seal(
                "Does this comply with GDPR?",
                "Yes, it does. Details follow.",
                "test-model",
            )
            .unwrap();
        let claim = record.claim.as_ref().unwrap();
        assert_eq!(claim.policy_version, "gdpr-2024");

        let mut expected = b"Yes, it does. Details follow.\n".to_vec();
        expected.push(b'\n');
        expected.extend_from_slice(&encode(
            &claim.claim,
            claim.confidence,
            &claim.model,
            &claim.policy_version,
            ClaimFormat::Current,
        ));
        assert_eq!(record.signed_payload, expected);
        assert_eq!(record.response_hash, sha256_hex(&expected).unwrap());
    }

    #[test]
    fn timestamp_covers_the_signature_bytes() {
        let pipeline = signing_pipeline(Box::new(LocalTsa::new().unwrap()));
        let record = pipeline
            .seal("What is 2+2?", "2+2 equals 4.\n", "test-model")
            .unwrap();
        let sig_bytes = BASE64.decode(record.signature.as_ref().unwrap()).unwrap();
        let token =
            crate::tsa::rfc3161::parse_token(record.tsa_token.as_ref().unwrap()).unwrap();
        assert_eq!(
            token.tst_info.message_imprint_digest,
            crate::digest::sha256(&sig_bytes).to_vec()
        );
    }

    #[test]
    fn unsigned_record_gets_no_pqc_signature() {
        let key_dir = tempfile::TempDir::new().unwrap();
        let key_path = key_dir.path().join("pqc_key.pem");
        std::fs::write(&key_path, crate::pqc::seed_to_pem(&[4u8; 32])).unwrap();
        let pipeline = Pipeline::new(
            RsaSigner::new(None),
            PqcSigner::new(true, Some(key_path)),
            Box::new(LocalTsa::new().unwrap()),
        );
        let record = pipeline.seal("p", "r", "m").unwrap();
        assert!(record.signature.is_none());
        assert!(record.signature_pqc.is_none());
        assert!(record.pqc_public_key_pem.is_none());
    }

    #[test]
    fn four_byte_chars_at_the_input_limit_still_seal() {
        let pipeline = signing_pipeline(Box::new(FailingTsa));
        let response = "\u{10348}".repeat(crate::canonical::MAX_INPUT_CHARS);
        let record = pipeline
            .seal("compliance question", &response, "m")
            .unwrap();
        assert!(record.claim.is_some());
        assert_eq!(record.response_hash.len(), 64);
    }

    #[test]
    fn missing_signing_key_degrades_to_hash_only() {
        let pipeline = Pipeline::new(
            RsaSigner::new(None),
            PqcSigner::disabled(),
            Box::new(LocalTsa::new().unwrap()),
        );
        let record = pipeline.seal("prompt", "response", "m").unwrap();
        assert_eq!(record.response_hash.len(), 64);
        assert!(record.signature.is_none());
        assert!(record.tsa_token.is_none());
    }

    #[test]
    fn timestamp_failure_keeps_the_signature() {
        let pipeline = signing_pipeline(Box::new(FailingTsa));
        let record = pipeline.seal("prompt", "response", "m").unwrap();
        assert!(record.signature.is_some());
        assert!(record.tsa_token.is_none());
    }

    #[test]
    fn oversized_response_is_rejected() {
        let pipeline = signing_pipeline(Box::new(FailingTsa));
        let big = "x".repeat(crate::canonical::MAX_INPUT_CHARS + 1);
        assert!(matches!(
            pipeline.seal("p", &big, "m"),
            Err(SealError::InputTooLarge { .. })
        ));
    }
}
