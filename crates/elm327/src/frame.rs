//! Response Framing
//!
//! ELM327 adapters wrap their output in chrome: stray carriage returns,
//! newlines, spacing between byte pairs, and the `>` prompt that marks the
//! end of a response. The helpers here strip that chrome and validate the
//! Mode-01 echo prefix.

use crate::error::ObdError;

/// Bytes the adapter may emit around the actual response content.
const PROMPT_NOISE: &[u8] = b"\r\n >";

/// Strip any leading/trailing run of newline, carriage-return, space, and
/// the `>` prompt character. Interior bytes are left untouched.
pub fn trim_prompt(raw: &[u8]) -> &[u8] {
    let start = raw
        .iter()
        .position(|b| !PROMPT_NOISE.contains(b))
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !PROMPT_NOISE.contains(b))
        .map_or(start, |i| i + 1);
    &raw[start..end]
}

/// Validate and unwrap a Mode-01 positive response.
///
/// The response must begin with the two-character `41` echo. Spacing is then
/// removed from the whole sequence and the four echo characters (two-digit
/// mode plus two-digit PID) are dropped, leaving only the payload hex digits.
pub fn parse_mode1(raw: &[u8]) -> Result<Vec<u8>, ObdError> {
    if raw.len() < 2 || raw[0] != b'4' || raw[1] != b'1' {
        return Err(ObdError::UnexpectedResponse(
            String::from_utf8_lossy(raw).into_owned(),
        ));
    }

    let digits: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !matches!(b, b' ' | b'\r' | b'\n'))
        .collect();

    // Mode echo + PID echo precede the payload.
    Ok(digits[4.min(digits.len())..].to_vec())
}

/// Parse a single ASCII hex digit.
pub(crate) fn hex_digit(b: u8) -> Result<u64, ObdError> {
    (b as char)
        .to_digit(16)
        .map(u64::from)
        .ok_or(ObdError::InvalidHex(b))
}

/// Fold a run of ASCII hex digits into an unsigned integer, most significant
/// digit first.
pub(crate) fn fold_hex(digits: &[u8]) -> Result<u64, ObdError> {
    if digits.len() > 16 {
        return Err(ObdError::UnexpectedResponse(format!(
            "payload of {} hex digits exceeds 64 bits",
            digits.len()
        )));
    }
    digits
        .iter()
        .try_fold(0u64, |acc, &b| Ok(acc << 4 | hex_digit(b)?))
}
