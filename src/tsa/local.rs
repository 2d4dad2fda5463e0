//! Deterministic in-process timestamp authority.
//!
//! Uses a bundled 2048-bit RSA key and self-signed timestamping certificate
//! and answers with a fixed generation time, so development and tests get
//! structurally real tokens with reproducible semantics. Token bytes may
//! still differ between calls; only the parsed fields are stable.

use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use x509_parser::prelude::*;

use super::rfc3161::{self, TokenSigner};
use super::TimestampAuthority;
use crate::error::{SealError, SealResult};

const TSA_KEY_PEM: &str = include_str!("testdata/tsa_key.pem");
const TSA_CERT_DER: &[u8] = include_bytes!("testdata/tsa_cert.der");

/// Policy OID asserted in locally issued tokens.
pub const LOCAL_POLICY_OID: &[u64] = &[1, 2, 3, 4, 5, 6];
/// Fixed generation time of locally issued tokens.
pub const LOCAL_GEN_TIME: &str = "20260101000000Z";

pub struct LocalTsa {
    private_key: RsaPrivateKey,
    issuer_der: Vec<u8>,
    cert_serial: Vec<u8>,
}

impl LocalTsa {
    pub fn new() -> SealResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(TSA_KEY_PEM)
            .map_err(|e| SealError::crypto(format!("bundled TSA key unreadable: {e}")))?;
        let (_, cert) = X509Certificate::from_der(TSA_CERT_DER)
            .map_err(|e| SealError::crypto(format!("bundled TSA certificate unreadable: {e}")))?;
        Ok(Self {
            private_key,
            issuer_der: cert.tbs_certificate.issuer.as_raw().to_vec(),
            cert_serial: cert.tbs_certificate.raw_serial().to_vec(),
        })
    }
}

impl TimestampAuthority for LocalTsa {
    fn timestamp(&self, data: &[u8]) -> SealResult<Vec<u8>> {
        if data.is_empty() {
            return Err(SealError::validation("cannot timestamp empty data"));
        }
        let digest = crate::digest::sha256(data);
        // Serial is the digest itself as a positive integer, so the same
        // payload always gets the same serial.
        let tst_info = rfc3161::build_tst_info(LOCAL_POLICY_OID, &digest, &digest, LOCAL_GEN_TIME);
        let signer = TokenSigner {
            private_key: &self.private_key,
            cert_der: TSA_CERT_DER,
            issuer_der: &self.issuer_der,
            cert_serial: &self.cert_serial,
        };
        let token = rfc3161::build_token(&tst_info, &signer)?;
        tracing::debug!(token_len = token.len(), "issued local timestamp token");
        Ok(token)
    }
}
