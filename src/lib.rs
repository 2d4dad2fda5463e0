//! Tamper-evident, timestamped cryptographic evidence for AI-generated
//! text.
//!
//! The sealing pipeline canonicalizes a response, optionally binds in a
//! compliance claim, hashes the payload with SHA-256, signs the hash with
//! RSA (and optionally ML-DSA-65), and obtains an RFC 3161 timestamp
//! token. The result can be exported as an evidence package that
//! [`verify::verify_package`] re-checks offline with no access to this
//! system.

pub mod canonical;
pub mod claim;
pub mod config;
pub mod digest;
pub mod error;
pub mod evidence;
pub mod pipeline;
pub mod pqc;
pub mod signer;
pub mod tsa;
pub mod verify;

pub use canonical::canonicalize;
pub use claim::{ClaimFormat, ClaimMetadata};
pub use config::{SigningConfig, TsaMode};
pub use digest::sha256_hex;
pub use error::{SealError, SealResult};
pub use evidence::{build_package, to_zip, PackageInput};
pub use pipeline::{Pipeline, SealedRecord};
pub use pqc::PqcSigner;
pub use signer::RsaSigner;
pub use tsa::{LocalTsa, RemoteTsa, TimestampAuthority};
pub use verify::{verify_package, VerificationResult};
