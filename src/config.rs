//! Runtime configuration for the sealing pipeline.
//!
//! Resolution precedence: explicit values passed by the caller > environment
//! variables > defaults. Environment keys:
//!
//! - `VERISEAL_SIGNING_KEY`  — path to the RSA signing key PEM
//! - `VERISEAL_PQC_ENABLED`  — `true`/`1` to enable post-quantum signing
//! - `VERISEAL_PQC_KEY`      — path to the ML-DSA key PEM
//! - `VERISEAL_TSA_MODE`     — `local` (default) or `remote`
//! - `VERISEAL_TSA_URL`      — endpoint for `remote` mode

use std::path::PathBuf;

use crate::error::{SealError, SealResult};

/// Which timestamp authority the pipeline talks to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TsaMode {
    /// Deterministic in-process authority with a bundled key.
    #[default]
    Local,
    /// Real RFC 3161 server over HTTP.
    Remote { url: String },
}

/// Resolved pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct SigningConfig {
    pub signing_key: Option<PathBuf>,
    pub pqc_enabled: bool,
    pub pqc_key: Option<PathBuf>,
    pub tsa_mode: TsaMode,
}

impl SigningConfig {
    /// Resolve configuration from the environment.
    pub fn from_env() -> SealResult<Self> {
        let signing_key = env_nonempty("VERISEAL_SIGNING_KEY").map(PathBuf::from);
        let pqc_enabled = env_nonempty("VERISEAL_PQC_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);
        let pqc_key = env_nonempty("VERISEAL_PQC_KEY").map(PathBuf::from);

        let tsa_mode = match env_nonempty("VERISEAL_TSA_MODE").as_deref() {
            None | Some("local") => TsaMode::Local,
            Some("remote") => {
                let url = env_nonempty("VERISEAL_TSA_URL").ok_or_else(|| {
                    SealError::validation(
                        "VERISEAL_TSA_MODE=remote requires VERISEAL_TSA_URL to be set",
                    )
                })?;
                TsaMode::Remote { url }
            }
            Some(other) => {
                return Err(SealError::validation(format!(
                    "VERISEAL_TSA_MODE must be 'local' or 'remote', got '{other}'"
                )))
            }
        };

        Ok(Self {
            signing_key,
            pqc_enabled,
            pqc_key,
            tsa_mode,
        })
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}
