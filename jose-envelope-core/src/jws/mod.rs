//! JWS (JSON Web Signature) support.
//!
//! Compact and flattened JSON serializations with HMAC (`HS256`, `HS384`,
//! `HS512`) and ECDSA (`ES256`, `ES384`) signatures. Headers go through
//! [`validate_jws_header`] before any key is used.
//!
//! # Examples
//!
//! ```rust
//! use jose_envelope_core::jws::{verify_compact, JwsBuilder, SignatureAlgorithm};
//! use jose_envelope_core::key::KeyHandle;
//! use jose_envelope_core::policy::JwsPolicy;
//!
//! let key = KeyHandle::secret(vec![7u8; 32]);
//! let jws = JwsBuilder::new(SignatureAlgorithm::Hs256)
//!     .sign_compact(b"payload", &key)
//!     .unwrap();
//!
//! let policy = JwsPolicy::new([SignatureAlgorithm::Hs256]);
//! let verified = verify_compact(&jws, &key, &policy).unwrap();
//! assert_eq!(verified.payload, b"payload");
//! ```

use std::fmt;
use std::str::FromStr;

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use p256::ecdsa::signature::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Sha256, Sha384, Sha512};
use tracing::debug;

use crate::error::{Error, Result};
use crate::jwe::header::{parse_protected, Header};
use crate::jwe::EcdhCurve;
use crate::key::{KeyFamily, KeyHandle, KeyKind, KeyMaterial, KeyUse, PrivateKeyMaterial, PublicKeyMaterial};
use crate::policy::{validate_jws_header, JwsPolicy};
use crate::resolver::{KeyResolver, KeySelector};
use crate::utils::{b64_decode, b64_encode};

/// JWS signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// HMAC using SHA-256
    Hs256,
    /// HMAC using SHA-384
    Hs384,
    /// HMAC using SHA-512
    Hs512,
    /// ECDSA using P-256 and SHA-256
    Es256,
    /// ECDSA using P-384 and SHA-384
    Es384,
}

impl SignatureAlgorithm {
    /// Every supported algorithm.
    pub const ALL: [Self; 5] = [Self::Hs256, Self::Hs384, Self::Hs512, Self::Es256, Self::Es384];

    /// The registered `alg` name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
        }
    }

    /// The key family this algorithm signs with.
    #[must_use]
    pub fn key_family(self) -> KeyFamily {
        match self {
            Self::Hs256 | Self::Hs384 | Self::Hs512 => KeyFamily::Oct,
            Self::Es256 | Self::Es384 => KeyFamily::Ec,
        }
    }

    /// The curve an ECDSA algorithm requires.
    #[must_use]
    pub fn curve(self) -> Option<EcdhCurve> {
        match self {
            Self::Es256 => Some(EcdhCurve::P256),
            Self::Es384 => Some(EcdhCurve::P384),
            _ => None,
        }
    }

    fn min_secret_len(self) -> usize {
        match self {
            Self::Hs256 => 32,
            Self::Hs384 => 48,
            Self::Hs512 => 64,
            Self::Es256 | Self::Es384 => 0,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| Error::NotSupported(format!("JWS algorithm {s}")))
    }
}

/// A JWS in compact serialization, split into its three parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactJws {
    /// The protected header (base64url-encoded)
    pub protected: String,
    /// The payload (base64url-encoded)
    pub payload: String,
    /// The signature (base64url-encoded)
    pub signature: String,
}

impl CompactJws {
    /// Splits a compact JWS into its parts.
    ///
    /// # Errors
    /// * `Error::Format` - If there are not exactly three parts or the
    ///   protected header is empty
    pub fn parse(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.split('.').collect();
        let [protected, payload, signature] = parts.as_slice() else {
            return Err(Error::Format(format!(
                "compact JWS must have 3 parts, found {}",
                parts.len()
            )));
        };
        if protected.is_empty() {
            return Err(Error::Format("protected header must not be empty".into()));
        }
        Ok(Self {
            protected: (*protected).to_owned(),
            payload: (*payload).to_owned(),
            signature: (*signature).to_owned(),
        })
    }
}

impl fmt::Display for CompactJws {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.protected, self.payload, self.signature)
    }
}

/// A JWS in flattened JSON serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedJws {
    /// The protected header (base64url-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<String>,
    /// Unprotected header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Header>,
    /// The payload (base64url-encoded)
    pub payload: String,
    /// The signature (base64url-encoded)
    pub signature: String,
}

impl FlattenedJws {
    /// Parses the flattened JSON serialization.
    ///
    /// # Errors
    /// * `Error::Format` - If the input is not a flattened JWS object
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input)
            .map_err(|e| Error::Format(format!("invalid flattened JWS: {e}")))
    }

    /// Serializes to JSON text.
    ///
    /// # Errors
    /// * `Error::Json` - If serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedJws {
    /// The decoded payload
    pub payload: Vec<u8>,
    /// The algorithm that verified
    pub alg: SignatureAlgorithm,
    /// The protected header
    pub protected_header: Header,
    /// The unprotected header (flattened JSON only)
    pub unprotected_header: Option<Header>,
}

/// Builds signed JWS objects.
#[derive(Debug, Clone)]
pub struct JwsBuilder {
    alg: SignatureAlgorithm,
    protected: Header,
    unprotected: Option<Header>,
}

impl JwsBuilder {
    /// Creates a builder that signs with `alg`.
    #[must_use]
    pub fn new(alg: SignatureAlgorithm) -> Self {
        Self {
            alg,
            protected: Header::new(),
            unprotected: None,
        }
    }

    /// Adds parameters to the protected header. `alg` is always set by the builder.
    #[must_use]
    pub fn protected_header(mut self, header: Header) -> Self {
        self.protected.extend(header);
        self
    }

    /// Sets the unprotected header (flattened JSON only).
    #[must_use]
    pub fn unprotected_header(mut self, header: Header) -> Self {
        self.unprotected = Some(header);
        self
    }

    fn signed_parts(&self, payload: &[u8], key: &KeyHandle) -> Result<(String, String, String)> {
        let mut protected = Header::new();
        protected.insert("alg".into(), Value::String(self.alg.as_str().into()));
        for (name, value) in &self.protected {
            if name != "alg" {
                protected.insert(name.clone(), value.clone());
            }
        }
        if let Some(unprotected) = &self.unprotected {
            crate::jwe::header::join_headers(&[Some(&protected), Some(unprotected)])?;
        }

        let protected = b64_encode(serde_json::to_vec(&protected)?);
        let payload = b64_encode(payload);
        let signing_input = format!("{protected}.{payload}");
        let signature = sign(self.alg, key, signing_input.as_bytes())?;
        Ok((protected, payload, b64_encode(signature)))
    }

    /// Signs `payload` into the compact serialization.
    ///
    /// # Errors
    /// * `Error::KeyType` - If `key` cannot sign with the algorithm
    /// * `Error::Format` - If an unprotected header was set
    pub fn sign_compact(&self, payload: &[u8], key: &KeyHandle) -> Result<String> {
        if self.unprotected.is_some() {
            return Err(Error::Format(
                "compact serialization cannot carry an unprotected header".into(),
            ));
        }
        let (protected, payload, signature) = self.signed_parts(payload, key)?;
        Ok(CompactJws {
            protected,
            payload,
            signature,
        }
        .to_string())
    }

    /// Signs `payload` into the flattened JSON serialization.
    ///
    /// # Errors
    /// * `Error::KeyType` - If `key` cannot sign with the algorithm
    /// * `Error::Policy` - If the headers share a parameter
    pub fn sign_flattened(&self, payload: &[u8], key: &KeyHandle) -> Result<FlattenedJws> {
        let (protected, payload, signature) = self.signed_parts(payload, key)?;
        Ok(FlattenedJws {
            protected: Some(protected),
            header: self.unprotected.clone(),
            payload,
            signature,
        })
    }
}

fn check_key(alg: SignatureAlgorithm, key: &KeyHandle, signing: bool) -> Result<()> {
    if key.family() != alg.key_family() {
        return Err(Error::KeyType(format!(
            "{alg} cannot be used with a {} key",
            key.family().kty()
        )));
    }
    if key.key_use() == Some(KeyUse::Encryption) {
        return Err(Error::KeyType(format!(
            "key is restricted to encryption and cannot be used for {alg}"
        )));
    }
    if let Some(bound) = key.algorithm() {
        if bound != alg.as_str() {
            return Err(Error::KeyType(format!(
                "key is bound to {bound} and cannot be used for {alg}"
            )));
        }
    }
    let expected = match (alg.key_family(), signing) {
        (KeyFamily::Oct, _) => KeyKind::Secret,
        (_, true) => KeyKind::Private,
        (_, false) => KeyKind::Public,
    };
    if key.kind() != expected {
        return Err(Error::KeyType(format!(
            "{alg} requires a {expected:?} key, got {:?}",
            key.kind()
        )));
    }
    if let Some(curve) = alg.curve() {
        if key.curve() != Some(curve) {
            return Err(Error::KeyType(format!("{alg} requires a {curve} key")));
        }
    }
    if let Some(secret) = key.secret_bytes() {
        if secret.len() < alg.min_secret_len() {
            return Err(Error::KeyType(format!(
                "{alg} requires a key of at least {} bytes",
                alg.min_secret_len()
            )));
        }
    }
    Ok(())
}

fn keyed_mac<M: Mac + KeyInit>(secret: &[u8], input: &[u8]) -> Result<M> {
    let mut mac = <M as Mac>::new_from_slice(secret)
        .map_err(|_| Error::KeyType("invalid HMAC key".into()))?;
    mac.update(input);
    Ok(mac)
}

fn hmac_sign(alg: SignatureAlgorithm, secret: &[u8], input: &[u8]) -> Result<Vec<u8>> {
    match alg {
        SignatureAlgorithm::Hs256 => Ok(keyed_mac::<Hmac<Sha256>>(secret, input)?
            .finalize()
            .into_bytes()
            .to_vec()),
        SignatureAlgorithm::Hs384 => Ok(keyed_mac::<Hmac<Sha384>>(secret, input)?
            .finalize()
            .into_bytes()
            .to_vec()),
        SignatureAlgorithm::Hs512 => Ok(keyed_mac::<Hmac<Sha512>>(secret, input)?
            .finalize()
            .into_bytes()
            .to_vec()),
        SignatureAlgorithm::Es256 | SignatureAlgorithm::Es384 => {
            Err(Error::KeyType(format!("{alg} is not an HMAC algorithm")))
        }
    }
}

fn hmac_verify(alg: SignatureAlgorithm, secret: &[u8], input: &[u8], tag: &[u8]) -> Result<bool> {
    match alg {
        SignatureAlgorithm::Hs256 => Ok(keyed_mac::<Hmac<Sha256>>(secret, input)?
            .verify_slice(tag)
            .is_ok()),
        SignatureAlgorithm::Hs384 => Ok(keyed_mac::<Hmac<Sha384>>(secret, input)?
            .verify_slice(tag)
            .is_ok()),
        SignatureAlgorithm::Hs512 => Ok(keyed_mac::<Hmac<Sha512>>(secret, input)?
            .verify_slice(tag)
            .is_ok()),
        SignatureAlgorithm::Es256 | SignatureAlgorithm::Es384 => {
            Err(Error::KeyType(format!("{alg} is not an HMAC algorithm")))
        }
    }
}

fn sign(alg: SignatureAlgorithm, key: &KeyHandle, input: &[u8]) -> Result<Vec<u8>> {
    check_key(alg, key, true)?;
    debug!(alg = %alg, "signing JWS");
    match key.material() {
        KeyMaterial::Secret(secret) => hmac_sign(alg, secret, input),
        KeyMaterial::Private(PrivateKeyMaterial::P256(secret)) => {
            let signature: p256::ecdsa::Signature =
                p256::ecdsa::SigningKey::from(secret).sign(input);
            Ok(signature.to_bytes().to_vec())
        }
        KeyMaterial::Private(PrivateKeyMaterial::P384(secret)) => {
            let signature: p384::ecdsa::Signature =
                p384::ecdsa::SigningKey::from(secret).sign(input);
            Ok(signature.to_bytes().to_vec())
        }
        _ => Err(Error::KeyType(format!("{alg} cannot sign with this key"))),
    }
}

fn verify_signature(
    alg: SignatureAlgorithm,
    key: &KeyHandle,
    input: &[u8],
    signature: &[u8],
) -> Result<()> {
    check_key(alg, key, false)?;
    let verified = match key.material() {
        KeyMaterial::Secret(secret) => hmac_verify(alg, secret, input, signature)?,
        KeyMaterial::Public(PublicKeyMaterial::P256(public)) => {
            p256::ecdsa::Signature::from_slice(signature).is_ok_and(|signature| {
                p256::ecdsa::VerifyingKey::from(public)
                    .verify(input, &signature)
                    .is_ok()
            })
        }
        KeyMaterial::Public(PublicKeyMaterial::P384(public)) => {
            p384::ecdsa::Signature::from_slice(signature).is_ok_and(|signature| {
                p384::ecdsa::VerifyingKey::from(public)
                    .verify(input, &signature)
                    .is_ok()
            })
        }
        _ => return Err(Error::KeyType(format!("{alg} cannot verify with this key"))),
    };
    if verified {
        Ok(())
    } else {
        Err(Error::SignatureVerification)
    }
}

fn decode_protected(protected: &str) -> Result<Header> {
    if protected.is_empty() {
        return Err(Error::Format("protected header must not be empty".into()));
    }
    parse_protected(&b64_decode(protected, "protected header")?)
}

fn verify_parts(
    protected: &str,
    unprotected: Option<&Header>,
    payload: &str,
    signature: &str,
    key: &KeyHandle,
    policy: &JwsPolicy,
) -> Result<VerifiedJws> {
    let protected_header = decode_protected(protected)?;
    let validated = validate_jws_header(Some(&protected_header), unprotected, policy)?;
    let signature = b64_decode(signature, "signature")?;
    let payload_bytes = b64_decode(payload, "payload")?;

    let signing_input = format!("{protected}.{payload}");
    verify_signature(validated.alg, key, signing_input.as_bytes(), &signature)?;

    Ok(VerifiedJws {
        payload: payload_bytes,
        alg: validated.alg,
        protected_header,
        unprotected_header: unprotected.cloned(),
    })
}

/// Verifies a compact JWS.
///
/// # Errors
/// * `Error::Format` - Malformed serialization
/// * `Error::Policy` / `Error::NotSupported` - Header rejected by `policy`
/// * `Error::KeyType` - `key` cannot verify the header's algorithm
/// * `Error::SignatureVerification` - The signature does not verify
pub fn verify_compact(jws: &str, key: &KeyHandle, policy: &JwsPolicy) -> Result<VerifiedJws> {
    let jws = CompactJws::parse(jws)?;
    verify_parts(&jws.protected, None, &jws.payload, &jws.signature, key, policy)
}

/// Verifies a flattened JSON JWS.
///
/// # Errors
/// See [`verify_compact`].
pub fn verify_flattened(
    jws: &FlattenedJws,
    key: &KeyHandle,
    policy: &JwsPolicy,
) -> Result<VerifiedJws> {
    let protected = jws
        .protected
        .as_deref()
        .ok_or_else(|| Error::Format("JWS \"protected\" member is required".into()))?;
    verify_parts(
        protected,
        jws.header.as_ref(),
        &jws.payload,
        &jws.signature,
        key,
        policy,
    )
}

/// Verifies a compact JWS with a key found by `resolver`.
///
/// The header is validated against `policy` before the resolver is asked.
///
/// # Errors
/// See [`verify_compact`], plus whatever the resolver returns.
pub async fn verify_compact_with<R>(
    jws: &str,
    resolver: &R,
    policy: &JwsPolicy,
) -> Result<VerifiedJws>
where
    R: KeyResolver + ?Sized,
{
    let parsed = CompactJws::parse(jws)?;
    let protected_header = decode_protected(&parsed.protected)?;
    let validated = validate_jws_header(Some(&protected_header), None, policy)?;
    let selector =
        KeySelector::from_header(&validated.header, validated.alg.as_str(), KeyUse::Signature);
    let key = resolver.resolve_key(&selector).await?;
    verify_parts(
        &parsed.protected,
        None,
        &parsed.payload,
        &parsed.signature,
        &key,
        policy,
    )
}
