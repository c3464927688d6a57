//! Small helpers shared by the JWE and JWS code paths.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Encodes bytes as unpadded base64url.
pub fn b64_encode(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Strictly decodes unpadded base64url.
///
/// Padding, whitespace and characters outside the URL-safe alphabet are
/// rejected.
///
/// # Errors
/// * `Error::Format` - If the input is not canonical base64url
pub fn b64_decode(input: &str, what: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(input)
        .map_err(|e| Error::Format(format!("{what} is not valid base64url: {e}")))
}

/// Fills a fresh buffer from the operating system CSPRNG.
///
/// # Errors
/// * `Error::Random` - If the random source fails; this is never retried
pub fn random_bytes(size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; size];
    OsRng.try_fill_bytes(&mut buf).map_err(|_| Error::Random)?;
    Ok(buf)
}

/// Reads an optional base64url-encoded header parameter.
pub(crate) fn header_b64(header: &Map<String, Value>, name: &str) -> Result<Option<Vec<u8>>> {
    match header.get(name) {
        None => Ok(None),
        Some(Value::String(s)) => b64_decode(s, &format!("\"{name}\" header parameter")).map(Some),
        Some(_) => Err(Error::Format(format!(
            "\"{name}\" header parameter must be a string"
        ))),
    }
}
