use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use thiserror::Error;

/// Decodes base64url input. Trailing `=` padding is tolerated because some
/// clients still emit it for `rawId` and `userHandle`.
pub fn base64url_decode(input: &str) -> Result<Vec<u8>, UtilError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(input.trim_end_matches('='))
        .map_err(|_| UtilError::Format("Failed to decode base64url".to_string()))?;
    Ok(decoded)
}

pub fn base64url_encode(input: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

/// Standard-alphabet base64 with padding, as used by JWS `x5c` headers.
pub(crate) fn base64_decode(input: &str) -> Result<Vec<u8>, UtilError> {
    STANDARD
        .decode(input)
        .map_err(|_| UtilError::Format("Failed to decode base64".to_string()))
}

pub(crate) fn base64_encode(input: impl AsRef<[u8]>) -> String {
    STANDARD.encode(input)
}

/// Lowercase hex, used for credential IDs and AAGUIDs in log output.
pub fn hex_encode(input: impl AsRef<[u8]>) -> String {
    input.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

#[derive(Debug, Error, Clone)]
pub enum UtilError {
    #[error("Invalid format: {0}")]
    Format(String),
}
