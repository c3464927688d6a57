//! JWE header types and functionality.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::EcdhCurve;
use crate::error::{Error, Result};
use crate::key::PublicKeyMaterial;
use crate::utils::{b64_decode, b64_encode};

/// A JOSE header: an ordered JSON object.
pub type Header = Map<String, Value>;

/// Joins header segments into the JOSE Header.
///
/// Segments must not share parameter names. A duplicate is a `Policy` error.
///
/// # Errors
/// * `Error::Policy` - If the same parameter appears in two segments
pub fn join_headers(segments: &[Option<&Header>]) -> Result<Header> {
    let mut joined = Header::new();
    for segment in segments.iter().flatten() {
        for (name, value) in segment.iter() {
            if joined.insert(name.clone(), value.clone()).is_some() {
                return Err(Error::Policy(format!(
                    "header parameter \"{name}\" appears in more than one header"
                )));
            }
        }
    }
    Ok(joined)
}

/// Parses the decoded protected header bytes.
///
/// # Errors
/// * `Error::Format` - If the bytes are not a JSON object
pub fn parse_protected(bytes: &[u8]) -> Result<Header> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(header)) => Ok(header),
        _ => Err(Error::Format(
            "protected header must be a JSON object".into(),
        )),
    }
}

/// An ephemeral public key for ECDH (the `epk` header parameter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EphemeralPublicKey {
    /// The key type (always "EC" or "OKP")
    pub kty: String,

    /// The curve used
    pub crv: EcdhCurve,

    /// The public key x-coordinate (base64url-encoded)
    pub x: String,

    /// The public key y-coordinate (base64url-encoded, only for NIST curves)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl EphemeralPublicKey {
    /// Creates a new ephemeral public key from raw bytes.
    ///
    /// NIST curve keys are uncompressed SEC1 points (`0x04 || x || y`).
    ///
    /// # Errors
    /// * `Error::Format` - If the bytes have the wrong shape for `curve`
    pub fn new(curve: EcdhCurve, public_key: &[u8]) -> Result<Self> {
        let size = curve.coordinate_len();
        match curve {
            EcdhCurve::X25519 => {
                if public_key.len() != size {
                    return Err(Error::Format("invalid X25519 public key length".into()));
                }
                Ok(Self {
                    kty: curve.kty().to_string(),
                    crv: curve,
                    x: b64_encode(public_key),
                    y: None,
                })
            }
            EcdhCurve::P256 | EcdhCurve::P384 | EcdhCurve::P521 => {
                if public_key.len() != 1 + 2 * size || public_key[0] != 0x04 {
                    return Err(Error::Format(format!(
                        "{curve} public key must be an uncompressed point"
                    )));
                }
                Ok(Self {
                    kty: curve.kty().to_string(),
                    crv: curve,
                    x: b64_encode(&public_key[1..=size]),
                    y: Some(b64_encode(&public_key[1 + size..])),
                })
            }
        }
    }

    /// Builds the `epk` value for a public key.
    ///
    /// # Errors
    /// * `Error::KeyType` - If the key is RSA
    pub fn from_public_key(key: &PublicKeyMaterial) -> Result<Self> {
        let curve = key
            .curve()
            .ok_or_else(|| Error::KeyType("ephemeral keys must be EC or OKP".into()))?;
        let raw = key
            .to_raw()
            .ok_or_else(|| Error::KeyType("ephemeral keys must be EC or OKP".into()))?;
        Self::new(curve, &raw)
    }

    /// Gets the raw public key bytes.
    ///
    /// # Errors
    /// * `Error::Format` - If a coordinate is missing or not base64url
    pub fn raw_public_key(&self) -> Result<Vec<u8>> {
        if self.kty != self.crv.kty() {
            return Err(Error::Format(format!(
                "\"epk\" kty {} does not match curve {}",
                self.kty, self.crv
            )));
        }
        let x = b64_decode(&self.x, "\"epk\" x")?;
        match self.crv {
            EcdhCurve::X25519 => Ok(x),
            EcdhCurve::P256 | EcdhCurve::P384 | EcdhCurve::P521 => {
                let y = self
                    .y
                    .as_deref()
                    .ok_or_else(|| Error::Format("\"epk\" is missing the y coordinate".into()))?;
                let y = b64_decode(y, "\"epk\" y")?;

                let mut key = Vec::with_capacity(1 + x.len() + y.len());
                key.push(0x04);
                key.extend_from_slice(&x);
                key.extend_from_slice(&y);
                Ok(key)
            }
        }
    }

    /// Parses the key into public key material, validating the point.
    ///
    /// # Errors
    /// * `Error::Format` - If the key is malformed or not on its curve
    pub fn to_public_key(&self) -> Result<PublicKeyMaterial> {
        PublicKeyMaterial::from_raw(self.crv, &self.raw_public_key()?)
    }

    /// Reads the `epk` parameter from a joined header.
    ///
    /// # Errors
    /// * `Error::Format` - If `epk` is missing or malformed
    pub fn from_header(header: &Header) -> Result<Self> {
        let value = header
            .get("epk")
            .ok_or_else(|| Error::Format("missing \"epk\" header parameter".into()))?;
        serde_json::from_value(value.clone())
            .map_err(|e| Error::Format(format!("invalid \"epk\" header parameter: {e}")))
    }

    /// The JSON value placed in the header.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("kty".into(), Value::String(self.kty.clone()));
        map.insert("crv".into(), Value::String(self.crv.to_string()));
        map.insert("x".into(), Value::String(self.x.clone()));
        if let Some(y) = &self.y {
            map.insert("y".into(), Value::String(y.clone()));
        }
        Value::Object(map)
    }
}
