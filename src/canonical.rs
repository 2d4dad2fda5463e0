//! Canonical form for response text before hashing.
//!
//! Rules, applied in order:
//! 1. Normalize Unicode to NFC.
//! 2. Normalize line endings to `\n` (`\r\n` and lone `\r`).
//! 3. Trim whitespace from each line; collapse runs of blank lines to one.
//! 4. Drop a trailing blank line left by the collapse step.
//! 5. Non-empty result ends with exactly one `\n`.
//!
//! Output is UTF-8 bytes. Same logical content always produces the same
//! bytes, so `\r\n` vs `\n` input hashes identically years later.

use unicode_normalization::UnicodeNormalization;

use crate::error::{SealError, SealResult};

/// Maximum accepted input length in characters. A DoS guard, not a
/// semantic rule; oversized input is rejected, never truncated.
pub const MAX_INPUT_CHARS: usize = 128 * 1024;

/// Canonicalize `text` into reproducible UTF-8 bytes.
///
/// Empty input yields an empty byte vector. Canonicalizing the decoded
/// output again reproduces the same bytes (idempotence).
pub fn canonicalize(text: &str) -> SealResult<Vec<u8>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let char_count = text.chars().count();
    if char_count > MAX_INPUT_CHARS {
        return Err(SealError::InputTooLarge {
            actual: char_count,
            max: MAX_INPUT_CHARS,
        });
    }

    let nfc: String = text.nfc().collect();
    let unified = nfc.replace("\r\n", "\n").replace('\r', "\n");

    let mut out: Vec<&str> = Vec::new();
    let mut last_was_blank = false;
    for line in unified.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !last_was_blank {
                out.push("");
            }
            last_was_blank = true;
        } else {
            out.push(trimmed);
            last_was_blank = false;
        }
    }
    if out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }

    let mut joined = out.join("\n");
    if !joined.is_empty() {
        joined.push('\n');
    }
    Ok(joined.into_bytes())
}
