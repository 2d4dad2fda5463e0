//! SHA-256 digesting of canonical bytes.

use sha2::{Digest, Sha256};

use crate::error::{SealError, SealResult};

/// Maximum digestable byte length: canonical output at four bytes per
/// character, plus headroom for an appended claim payload.
pub const MAX_DIGEST_INPUT_BYTES: usize = 4 * crate::canonical::MAX_INPUT_CHARS + 8 * 1024;

/// SHA-256 of `bytes` as 64-character lowercase hex.
///
/// Empty input hashes to the well-known empty-string digest.
pub fn sha256_hex(bytes: &[u8]) -> SealResult<String> {
    if bytes.len() > MAX_DIGEST_INPUT_BYTES {
        return Err(SealError::InputTooLarge {
            actual: bytes.len(),
            max: MAX_DIGEST_INPUT_BYTES,
        });
    }
    Ok(hex::encode(Sha256::digest(bytes)))
}

/// Raw SHA-256 digest, for callers that need the 32 bytes directly.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Decode a 64-character hex hash into its 32-byte digest.
pub fn decode_hash_hex(hash_hex: &str) -> SealResult<[u8; 32]> {
    if hash_hex.len() != 64 {
        return Err(SealError::validation(format!(
            "hash must be a 64-character hex string, got length {}",
            hash_hex.len()
        )));
    }
    let bytes = hex::decode(hash_hex)
        .map_err(|_| SealError::validation("hash must be hexadecimal"))?;
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&bytes);
    Ok(digest)
}
