//! RSA signing of SHA-256 digests using PKCS#1 v1.5 over a DigestInfo.
//!
//! The digest is wrapped in a DER `DigestInfo{sha256, digest}` which is
//! signed directly with the raw RSA primitive (no further hashing inside
//! the signature scheme). The private key comes from a PEM file configured
//! at construction time; the public key is derived from it.
//!
//! Key generation for operators:
//! ```text
//! openssl genpkey -algorithm RSA -out signing.key -pkeyopt rsa_keygen_bits:2048
//! ```

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::OnceCell;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use yasna::models::ObjectIdentifier;

use crate::digest::decode_hash_hex;
use crate::error::{SealError, SealResult};

const OID_SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];

/// DER `DigestInfo` pairing the SHA-256 algorithm identifier with the
/// digest value. Parameters are absent, matching the historical signed
/// records this system must keep verifying.
pub(crate) fn build_digest_info(digest: &[u8; 32]) -> Vec<u8> {
    yasna::construct_der(|writer| {
        writer.write_sequence(|writer| {
            writer.next().write_sequence(|writer| {
                writer
                    .next()
                    .write_oid(&ObjectIdentifier::from_slice(OID_SHA256));
            });
            writer.next().write_bytes(digest);
        })
    })
}

/// Verify a raw-primitive RSA signature over `DigestInfo(sha256, digest)`.
///
/// Shared by the signer and the offline verifier so both sides use the
/// exact same construction.
pub(crate) fn verify_digest_signature(
    public_key: &RsaPublicKey,
    digest: &[u8; 32],
    signature: &[u8],
) -> bool {
    if signature.is_empty() {
        return false;
    }
    let digest_info = build_digest_info(digest);
    public_key
        .verify(Pkcs1v15Sign::new_unprefixed(), &digest_info, signature)
        .is_ok()
}

struct LoadedRsaKeys {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    public_pem: String,
}

/// Classical signer over a lazily loaded RSA key pair.
///
/// Key loading is idempotent and safe under concurrent first use: callers
/// either observe the fully loaded keys or retry the load. A missing or
/// unloadable key surfaces as `KeyNotConfigured`, which the signing
/// pipeline treats as "proceed without a signature".
pub struct RsaSigner {
    key_path: Option<PathBuf>,
    keys: OnceCell<LoadedRsaKeys>,
}

impl RsaSigner {
    pub fn new(key_path: Option<PathBuf>) -> Self {
        Self {
            key_path,
            keys: OnceCell::new(),
        }
    }

    fn keys(&self) -> SealResult<&LoadedRsaKeys> {
        let path = self.key_path.as_deref().ok_or_else(|| {
            SealError::key_not_configured("RSA signing", "no signing key path configured")
        })?;
        self.keys.get_or_try_init(|| load_keys(path))
    }

    /// True when a key path is configured (the key itself may still fail
    /// to load on first use).
    pub fn is_configured(&self) -> bool {
        self.key_path.is_some()
    }

    /// Sign a 64-character hex SHA-256 hash. Returns the base64 signature.
    pub fn sign(&self, hash_hex: &str) -> SealResult<String> {
        let digest = decode_hash_hex(hash_hex)?;
        let keys = self.keys()?;
        let digest_info = build_digest_info(&digest);
        let signature = keys
            .private
            .sign(Pkcs1v15Sign::new_unprefixed(), &digest_info)
            .map_err(|e| SealError::crypto(format!("RSA signing failed: {e}")))?;
        Ok(BASE64.encode(signature))
    }

    /// Verify a base64 signature against a hex hash.
    ///
    /// Malformed hex/base64 input yields `Ok(false)`; only a missing key
    /// is an error, so callers can tell "not applicable" from "invalid".
    pub fn verify(&self, hash_hex: &str, signature_base64: &str) -> SealResult<bool> {
        let keys = self.keys()?;
        let Ok(digest) = decode_hash_hex(hash_hex) else {
            return Ok(false);
        };
        let trimmed = signature_base64.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }
        let Ok(signature) = BASE64.decode(trimmed) else {
            return Ok(false);
        };
        Ok(verify_digest_signature(&keys.public, &digest, &signature))
    }

    /// PEM (SPKI) encoding of the signing public key.
    pub fn public_key_pem(&self) -> SealResult<String> {
        Ok(self.keys()?.public_pem.clone())
    }
}

fn load_keys(path: &Path) -> SealResult<LoadedRsaKeys> {
    let pem = std::fs::read_to_string(path).map_err(|e| {
        SealError::key_not_configured(
            "RSA signing",
            format!("cannot read key file {}: {e}", path.display()),
        )
    })?;
    let private = if pem.contains("BEGIN RSA PRIVATE KEY") {
        RsaPrivateKey::from_pkcs1_pem(&pem).map_err(|e| e.to_string())
    } else {
        RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| e.to_string())
    }
    .map_err(|e| {
        SealError::key_not_configured(
            "RSA signing",
            format!("cannot parse key file {}: {e}", path.display()),
        )
    })?;
    let public = private.to_public_key();
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| SealError::crypto(format!("cannot encode public key: {e}")))?;
    tracing::debug!(path = %path.display(), "RSA signing key loaded");
    Ok(LoadedRsaKeys {
        private,
        public,
        public_pem,
    })
}
