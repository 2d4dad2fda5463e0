//! Structured compliance-claim metadata and its deterministic encoding.
//!
//! The canonical claim encoding is bound into the signed payload, so it
//! must stay byte-stable across storage round trips. Keys are emitted in
//! fixed alphabetical order (`claim, confidence, model, policy_version`)
//! and confidence uses a fixed 6-decimal format so a float column in the
//! database cannot change the signed bytes.

use serde::{Deserialize, Serialize};

/// Optional claim bound into the signed payload alongside the response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClaimMetadata {
    /// Claim text, e.g. the first sentence of the response.
    pub claim: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Model identifier the response came from.
    pub model: String,
    /// Policy version the claim refers to, e.g. "gdpr-2024".
    pub policy_version: String,
}

/// Which canonical encoding of the claim to produce.
///
/// `Legacy` exists only so records signed before the fixed 6-decimal
/// confidence format remain verifiable. It is selected explicitly by the
/// caller, never auto-detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimFormat {
    #[default]
    Current,
    Legacy,
}

impl ClaimMetadata {
    /// Canonical single-line encoding used in the signed payload.
    pub fn canonical_bytes(&self, format: ClaimFormat) -> Vec<u8> {
        encode(
            &self.claim,
            self.confidence,
            &self.model,
            &self.policy_version,
            format,
        )
    }
}

/// Encode claim fields deterministically. Missing values are substituted
/// by the caller with empty strings / `0.0` before calling.
pub fn encode(
    claim: &str,
    confidence: f64,
    model: &str,
    policy_version: &str,
    format: ClaimFormat,
) -> Vec<u8> {
    let conf = match format {
        ClaimFormat::Current => format!("{confidence:.6}"),
        ClaimFormat::Legacy => format!("{confidence}"),
    };
    let json = format!(
        "{{\"claim\":\"{}\",\"confidence\":{},\"model\":\"{}\",\"policy_version\":\"{}\"}}",
        escape(claim),
        conf,
        escape(model),
        escape(policy_version),
    );
    json.into_bytes()
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

const DEFAULT_CONFIDENCE: f64 = 0.85;
const CLAIM_MAX_LENGTH: usize = 500;

/// Infer a minimal claim from a prompt/response pair.
///
/// Returns `None` when the prompt does not suggest a compliance context.
/// The claim text is the first sentence of the response, or a truncation
/// when the response has no sentence boundary.
pub fn infer_claim(prompt: &str, response: &str, model: &str) -> Option<ClaimMetadata> {
    let lower = prompt.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    let compliance_context = ["gdpr", "comply", "compliance", "clause", "ai act", "legal", "regulatory", "compliant"]
        .iter()
        .any(|kw| lower.contains(kw));
    if !compliance_context {
        return None;
    }

    let policy_version = if lower.contains("gdpr") {
        "gdpr-2024"
    } else if lower.contains("ai act") {
        "ai-act-2024"
    } else {
        "compliance-2024"
    };

    let text = response.trim();
    let claim = first_sentence_or_truncate(text);

    Some(ClaimMetadata {
        claim,
        confidence: DEFAULT_CONFIDENCE,
        model: model.to_string(),
        policy_version: policy_version.to_string(),
    })
}

fn first_sentence_or_truncate(text: &str) -> String {
    if let Some(end) = text.find('.') {
        if end > 0 {
            return text[..=end].trim().to_string();
        }
    }
    if text.chars().count() > CLAIM_MAX_LENGTH {
        let truncated: String = text.chars().take(CLAIM_MAX_LENGTH).collect();
        return format!("{truncated}...");
    }
    text.to_string()
}
