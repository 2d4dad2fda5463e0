//! Error taxonomy for the sealing and verification pipeline.

use thiserror::Error;

/// Errors that can occur while sealing text or handling evidence packages.
///
/// The taxonomy separates caller mistakes (`Validation`, `InputTooLarge`)
/// from recoverable degraded states (`KeyNotConfigured`, `TimestampFailed`)
/// and from genuine faults (`Crypto`, `Io`, `Serialization`). Callers of the
/// signing pipeline are expected to continue without the affected artifact
/// on `KeyNotConfigured` and `TimestampFailed`.
#[derive(Error, Debug)]
pub enum SealError {
    /// Malformed input supplied by the caller.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Input exceeds a configured size bound.
    #[error("input length {actual} exceeds maximum {max}")]
    InputTooLarge { actual: usize, max: usize },

    /// A signing key was requested but none is configured or loadable.
    #[error("{which} key not configured: {message}")]
    KeyNotConfigured { which: &'static str, message: String },

    /// The timestamp authority was unreachable, rejected the request, or
    /// returned an unparsable token.
    #[error("timestamp failed: {message}")]
    TimestampFailed { message: String },

    /// A cryptographic primitive failed in a way that is not a normal
    /// "signature does not verify" outcome.
    #[error("crypto error: {message}")]
    Crypto { message: String },

    /// File I/O failed.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization or deserialization failed.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl SealError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn key_not_configured(which: &'static str, message: impl Into<String>) -> Self {
        Self::KeyNotConfigured {
            which,
            message: message.into(),
        }
    }

    pub fn timestamp_failed(message: impl Into<String>) -> Self {
        Self::TimestampFailed {
            message: message.into(),
        }
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for SealError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for SealError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type for sealing and verification operations.
pub type SealResult<T> = std::result::Result<T, SealError>;
