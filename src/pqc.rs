//! Post-quantum signing with ML-DSA-65 (Dilithium3, FIPS 204).
//!
//! This signer is strictly optional: any problem loading the key makes it
//! unavailable instead of failing the pipeline, and records sealed without
//! a PQC signature stay fully verifiable on the classical path.
//!
//! Key material on disk is PEM with one of two labels:
//! - `ML-DSA-65 SEED` — the 32-byte ξ seed; both keys are derived from it.
//! - `ML-DSA-65 PRIVATE KEY` — the expanded private key; requires a sibling
//!   `pqc_public.pem` in the same directory since the public key cannot be
//!   recovered from the expanded form.
//! A sibling `pqc_public.pem`, when present, always wins over derivation so
//! the distributed public key file is byte-identical to the one verifiers
//! hold.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use fips204::ml_dsa_65::{PrivateKey, PublicKey, KG, PK_LEN, SIG_LEN, SK_LEN};
use fips204::traits::{KeyGen, SerDes, Signer, Verifier};

use crate::error::{SealError, SealResult};

const SEED_LABEL: &str = "ML-DSA-65 SEED";
const PRIVATE_LABEL: &str = "ML-DSA-65 PRIVATE KEY";
const PUBLIC_LABEL: &str = "ML-DSA-65 PUBLIC KEY";
const SIBLING_PUBLIC_FILE: &str = "pqc_public.pem";

/// Human-readable algorithm descriptor recorded alongside PQC signatures.
pub const PQC_ALGORITHM_NAME: &str = "ML-DSA (Dilithium3)";
pub const PQC_STANDARD_NAME: &str = "FIPS 204";

struct LoadedPqcKeys {
    private: PrivateKey,
    public: PublicKey,
    public_pem: String,
}

/// Optional ML-DSA-65 signer. Construct once; availability never changes
/// afterwards.
pub struct PqcSigner {
    keys: Option<LoadedPqcKeys>,
}

impl PqcSigner {
    /// Load the signer. `enabled == false` or `key_path == None` yields an
    /// unavailable signer; so does any load failure, after a warning.
    pub fn new(enabled: bool, key_path: Option<PathBuf>) -> Self {
        if !enabled {
            return Self { keys: None };
        }
        let Some(path) = key_path else {
            tracing::warn!("PQC signing enabled but no key path configured");
            return Self { keys: None };
        };
        match load_keys(&path) {
            Ok(keys) => {
                tracing::debug!(path = %path.display(), "ML-DSA-65 key loaded");
                Self { keys: Some(keys) }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "PQC key unavailable, continuing without post-quantum signatures");
                Self { keys: None }
            }
        }
    }

    /// Signer with no key material, for pipelines that never PQC-sign.
    pub fn disabled() -> Self {
        Self { keys: None }
    }

    pub fn is_available(&self) -> bool {
        self.keys.is_some()
    }

    fn keys(&self) -> SealResult<&LoadedPqcKeys> {
        self.keys
            .as_ref()
            .ok_or_else(|| SealError::key_not_configured("PQC", "ML-DSA-65 key not loaded"))
    }

    /// Sign a 32-byte digest. Returns the base64 signature.
    pub fn sign(&self, digest: &[u8]) -> SealResult<String> {
        if digest.len() != 32 {
            return Err(SealError::validation(format!(
                "PQC signing expects a 32-byte digest, got {} bytes",
                digest.len()
            )));
        }
        let keys = self.keys()?;
        let signature = keys
            .private
            .try_sign(digest, &[])
            .map_err(|e| SealError::crypto(format!("ML-DSA signing failed: {e}")))?;
        Ok(BASE64.encode(signature))
    }

    /// Verify a base64 ML-DSA signature over a 32-byte digest. Any
    /// malformed input verifies as `false`.
    pub fn verify(&self, digest: &[u8], signature_base64: &str) -> bool {
        let Some(keys) = self.keys.as_ref() else {
            return false;
        };
        verify_with_public_key(&keys.public, digest, signature_base64)
    }

    /// PEM encoding of the ML-DSA-65 public key.
    pub fn public_key_pem(&self) -> SealResult<String> {
        Ok(self.keys()?.public_pem.clone())
    }
}

/// Verify against an externally supplied public key PEM, as the offline
/// verifier does with the `pqc_public_key.pem` package entry.
pub fn verify_with_pem(public_key_pem: &str, digest: &[u8], signature_base64: &str) -> bool {
    let Some(public) = parse_public_pem(public_key_pem) else {
        return false;
    };
    verify_with_public_key(&public, digest, signature_base64)
}

fn verify_with_public_key(public: &PublicKey, digest: &[u8], signature_base64: &str) -> bool {
    if digest.len() != 32 {
        return false;
    }
    let Ok(raw) = BASE64.decode(signature_base64.trim()) else {
        return false;
    };
    let Ok(signature) = <[u8; SIG_LEN]>::try_from(raw.as_slice()) else {
        return false;
    };
    public.verify(digest, &signature, &[])
}

fn parse_public_pem(pem_text: &str) -> Option<PublicKey> {
    let parsed = pem::parse(pem_text).ok()?;
    if parsed.tag() != PUBLIC_LABEL {
        return None;
    }
    let bytes = <[u8; PK_LEN]>::try_from(parsed.contents()).ok()?;
    PublicKey::try_from_bytes(bytes).ok()
}

fn load_keys(path: &Path) -> SealResult<LoadedPqcKeys> {
    let pem_text = std::fs::read_to_string(path)
        .map_err(|e| SealError::io(format!("cannot read PQC key {}: {e}", path.display())))?;
    let parsed = pem::parse(&pem_text)
        .map_err(|e| SealError::crypto(format!("cannot parse PQC key PEM: {e}")))?;

    let (private, derived_public) = match parsed.tag() {
        SEED_LABEL => {
            let seed = <[u8; 32]>::try_from(parsed.contents()).map_err(|_| {
                SealError::crypto(format!(
                    "ML-DSA-65 seed must be 32 bytes, got {}",
                    parsed.contents().len()
                ))
            })?;
            let (public, private) = KG::keygen_from_seed(&seed);
            (private, Some(public))
        }
        PRIVATE_LABEL => {
            let bytes = <[u8; SK_LEN]>::try_from(parsed.contents()).map_err(|_| {
                SealError::crypto(format!(
                    "ML-DSA-65 private key must be {SK_LEN} bytes, got {}",
                    parsed.contents().len()
                ))
            })?;
            let private = PrivateKey::try_from_bytes(bytes)
                .map_err(|e| SealError::crypto(format!("invalid ML-DSA-65 private key: {e}")))?;
            (private, None)
        }
        other => {
            return Err(SealError::crypto(format!(
                "unexpected PEM label '{other}' for PQC key"
            )))
        }
    };

    // The sibling public key file, when present, is authoritative.
    let sibling = path
        .parent()
        .map(|dir| dir.join(SIBLING_PUBLIC_FILE))
        .filter(|p| p.is_file());
    let (public, public_pem) = if let Some(sibling_path) = sibling {
        let sibling_pem = std::fs::read_to_string(&sibling_path).map_err(|e| {
            SealError::io(format!(
                "cannot read {}: {e}",
                sibling_path.display()
            ))
        })?;
        let public = parse_public_pem(&sibling_pem).ok_or_else(|| {
            SealError::crypto(format!("invalid public key in {}", sibling_path.display()))
        })?;
        (public, sibling_pem)
    } else {
        let public = derived_public.ok_or_else(|| {
            SealError::key_not_configured(
                "PQC",
                format!(
                    "expanded private key requires a sibling {SIBLING_PUBLIC_FILE} next to {}",
                    path.display()
                ),
            )
        })?;
        let pem_out = encode_public_pem(&public);
        let public = parse_public_pem(&pem_out)
            .ok_or_else(|| SealError::crypto("public key re-parse failed"))?;
        (public, pem_out)
    };

    Ok(LoadedPqcKeys {
        private,
        public,
        public_pem,
    })
}

fn encode_public_pem(public: &PublicKey) -> String {
    let bytes = public.clone().into_bytes();
    pem::encode(&pem::Pem::new(PUBLIC_LABEL, bytes.to_vec()))
}

/// Encode a 32-byte seed as the on-disk PEM format, for key provisioning.
pub fn seed_to_pem(seed: &[u8; 32]) -> String {
    pem::encode(&pem::Pem::new(SEED_LABEL, seed.to_vec()))
}
