//! RFC 3161 timestamping.
//!
//! `LocalTsa` answers in-process with a bundled key and a fixed clock, so
//! development and tests never depend on a network authority. `RemoteTsa`
//! speaks the same protocol to a real server over HTTP. Both produce a DER
//! `ContentInfo` timestamp token that the offline verifier can parse and
//! check without contacting the authority again.

pub mod local;
pub mod remote;
pub mod rfc3161;

pub use local::LocalTsa;
pub use remote::RemoteTsa;

use crate::error::SealResult;

/// Obtains a timestamp token binding data to a point in time.
pub trait TimestampAuthority: Send + Sync {
    /// Produce a DER-encoded timestamp token over `data`. The data is
    /// SHA-256 hashed internally; the token attests to that digest.
    ///
    /// Empty input is a `Validation` error; every other failure surfaces
    /// as `TimestampFailed` so the caller can continue without a token.
    fn timestamp(&self, data: &[u8]) -> SealResult<Vec<u8>>;
}
