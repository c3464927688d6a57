//! Opaque key handles.
//!
//! A [`KeyHandle`] is the only way key material enters the engine. It is an
//! explicit tagged union: the family (`oct`, `RSA`, `EC`, `OKP`) and the
//! public/private/secret split are fixed when the handle is built and are
//! never inferred from the shape of the bytes later on.
//!
//! # Security Considerations
//!
//! - Secret bytes are zeroized when the handle is dropped
//! - `Debug` output never includes key material
//! - The engine borrows handles for the duration of one operation only

use std::fmt;

use p256::elliptic_curve::sec1::ToEncodedPoint;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::jwe::EcdhCurve;

pub mod jwk;

pub use jwk::{ImportOptions, Jwk};

/// Algorithm family of a key, as named by the JWK `kty` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    /// Symmetric octet sequence
    Oct,
    /// RSA
    Rsa,
    /// NIST elliptic curves
    Ec,
    /// Octet key pairs (X25519)
    Okp,
}

impl KeyFamily {
    /// The JWK `kty` value for this family.
    #[must_use]
    pub fn kty(self) -> &'static str {
        match self {
            Self::Oct => "oct",
            Self::Rsa => "RSA",
            Self::Ec => "EC",
            Self::Okp => "OKP",
        }
    }
}

/// Intended use of a key (JWK `use`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyUse {
    /// Signatures and MACs
    #[serde(rename = "sig")]
    Signature,
    /// Encryption and key management
    #[serde(rename = "enc")]
    Encryption,
}

/// Whether a handle holds secret, public or private material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Symmetric secret
    Secret,
    /// Asymmetric public key
    Public,
    /// Asymmetric private key
    Private,
}

/// Asymmetric public key material.
#[derive(Clone, PartialEq)]
pub enum PublicKeyMaterial {
    /// RSA public key
    Rsa(RsaPublicKey),
    /// P-256 public key
    P256(p256::PublicKey),
    /// P-384 public key
    P384(p384::PublicKey),
    /// P-521 public key
    P521(p521::PublicKey),
    /// X25519 public key
    X25519(x25519_dalek::PublicKey),
}

/// Asymmetric private key material.
#[derive(Clone)]
pub enum PrivateKeyMaterial {
    /// RSA private key
    Rsa(RsaPrivateKey),
    /// P-256 secret scalar
    P256(p256::SecretKey),
    /// P-384 secret scalar
    P384(p384::SecretKey),
    /// P-521 secret scalar
    P521(p521::SecretKey),
    /// X25519 static secret
    X25519(x25519_dalek::StaticSecret),
}

/// The three shapes a key handle can take.
#[derive(Clone)]
pub enum KeyMaterial {
    /// Symmetric secret bytes (also used for PBES2 passwords)
    Secret(Zeroizing<Vec<u8>>),
    /// Public half of an asymmetric key
    Public(PublicKeyMaterial),
    /// Private half of an asymmetric key
    Private(PrivateKeyMaterial),
}

/// A capability-tagged key.
///
/// # Examples
///
/// ```rust
/// use jose_envelope_core::key::{KeyFamily, KeyHandle};
///
/// let key = KeyHandle::secret(vec![0u8; 32]);
/// assert_eq!(key.family(), KeyFamily::Oct);
/// ```
#[derive(Clone)]
pub struct KeyHandle {
    material: KeyMaterial,
    key_use: Option<KeyUse>,
    extractable: bool,
    algorithm: Option<String>,
}

impl KeyHandle {
    /// Creates a handle over symmetric secret bytes.
    #[must_use]
    pub fn secret(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(KeyMaterial::Secret(Zeroizing::new(bytes.into())))
    }

    /// Creates a handle over a public key.
    #[must_use]
    pub fn public(material: PublicKeyMaterial) -> Self {
        Self::new(KeyMaterial::Public(material))
    }

    /// Creates a handle over a private key.
    #[must_use]
    pub fn private(material: PrivateKeyMaterial) -> Self {
        Self::new(KeyMaterial::Private(material))
    }

    fn new(material: KeyMaterial) -> Self {
        Self {
            material,
            key_use: None,
            extractable: true,
            algorithm: None,
        }
    }

    /// Restricts the handle to one use.
    #[must_use]
    pub fn with_use(mut self, key_use: KeyUse) -> Self {
        self.key_use = Some(key_use);
        self
    }

    /// Binds the handle to a single JOSE algorithm identifier.
    #[must_use]
    pub fn with_algorithm(mut self, alg: impl Into<String>) -> Self {
        self.algorithm = Some(alg.into());
        self
    }

    /// Sets whether secret bytes may be exported from the handle.
    #[must_use]
    pub fn with_extractable(mut self, extractable: bool) -> Self {
        self.extractable = extractable;
        self
    }

    /// The key material.
    #[must_use]
    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Declared use, if any.
    #[must_use]
    pub fn key_use(&self) -> Option<KeyUse> {
        self.key_use
    }

    /// Algorithm the handle is bound to, if any.
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    /// Whether secret bytes may be exported.
    #[must_use]
    pub fn is_extractable(&self) -> bool {
        self.extractable
    }

    /// Secret, public or private.
    #[must_use]
    pub fn kind(&self) -> KeyKind {
        match self.material {
            KeyMaterial::Secret(_) => KeyKind::Secret,
            KeyMaterial::Public(_) => KeyKind::Public,
            KeyMaterial::Private(_) => KeyKind::Private,
        }
    }

    /// Algorithm family tag.
    #[must_use]
    pub fn family(&self) -> KeyFamily {
        match &self.material {
            KeyMaterial::Secret(_) => KeyFamily::Oct,
            KeyMaterial::Public(PublicKeyMaterial::Rsa(_))
            | KeyMaterial::Private(PrivateKeyMaterial::Rsa(_)) => KeyFamily::Rsa,
            KeyMaterial::Public(PublicKeyMaterial::X25519(_))
            | KeyMaterial::Private(PrivateKeyMaterial::X25519(_)) => KeyFamily::Okp,
            KeyMaterial::Public(_) | KeyMaterial::Private(_) => KeyFamily::Ec,
        }
    }

    /// Curve for EC and OKP keys.
    #[must_use]
    pub fn curve(&self) -> Option<EcdhCurve> {
        match &self.material {
            KeyMaterial::Public(public) => public.curve(),
            KeyMaterial::Private(private) => private.curve(),
            KeyMaterial::Secret(_) => None,
        }
    }

    /// Exports the secret bytes of an extractable symmetric key.
    ///
    /// # Errors
    /// * `Error::KeyType` - If the handle is asymmetric or not extractable
    pub fn export_secret(&self) -> Result<&[u8]> {
        match &self.material {
            KeyMaterial::Secret(bytes) if self.extractable => Ok(bytes),
            KeyMaterial::Secret(_) => Err(Error::KeyType("key is not extractable".into())),
            _ => Err(Error::KeyType("key is not a symmetric secret".into())),
        }
    }

    /// Returns a handle over the public half of an asymmetric private key.
    #[must_use]
    pub fn to_public(&self) -> Option<Self> {
        match &self.material {
            KeyMaterial::Private(private) => Some(Self {
                material: KeyMaterial::Public(private.public_key()),
                key_use: self.key_use,
                extractable: true,
                algorithm: self.algorithm.clone(),
            }),
            KeyMaterial::Public(_) => Some(self.clone()),
            KeyMaterial::Secret(_) => None,
        }
    }

    pub(crate) fn secret_bytes(&self) -> Option<&[u8]> {
        match &self.material {
            KeyMaterial::Secret(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("kind", &self.kind())
            .field("family", &self.family())
            .field("curve", &self.curve())
            .field("use", &self.key_use)
            .field("extractable", &self.extractable)
            .field("alg", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl From<RsaPublicKey> for KeyHandle {
    fn from(key: RsaPublicKey) -> Self {
        Self::public(PublicKeyMaterial::Rsa(key))
    }
}

impl From<RsaPrivateKey> for KeyHandle {
    fn from(key: RsaPrivateKey) -> Self {
        Self::private(PrivateKeyMaterial::Rsa(key))
    }
}

impl From<p256::SecretKey> for KeyHandle {
    fn from(key: p256::SecretKey) -> Self {
        Self::private(PrivateKeyMaterial::P256(key))
    }
}

impl From<p384::SecretKey> for KeyHandle {
    fn from(key: p384::SecretKey) -> Self {
        Self::private(PrivateKeyMaterial::P384(key))
    }
}

impl From<p521::SecretKey> for KeyHandle {
    fn from(key: p521::SecretKey) -> Self {
        Self::private(PrivateKeyMaterial::P521(key))
    }
}

impl From<x25519_dalek::StaticSecret> for KeyHandle {
    fn from(key: x25519_dalek::StaticSecret) -> Self {
        Self::private(PrivateKeyMaterial::X25519(key))
    }
}

impl PublicKeyMaterial {
    /// Curve for EC and OKP keys.
    #[must_use]
    pub fn curve(&self) -> Option<EcdhCurve> {
        match self {
            Self::Rsa(_) => None,
            Self::P256(_) => Some(EcdhCurve::P256),
            Self::P384(_) => Some(EcdhCurve::P384),
            Self::P521(_) => Some(EcdhCurve::P521),
            Self::X25519(_) => Some(EcdhCurve::X25519),
        }
    }

    /// Parses a raw public key: SEC1 for NIST curves, 32 bytes for X25519.
    ///
    /// # Errors
    /// * `Error::Format` - If the bytes are not a valid point on `curve`
    pub fn from_raw(curve: EcdhCurve, bytes: &[u8]) -> Result<Self> {
        let invalid = |_| Error::Format(format!("invalid {curve} public key"));
        match curve {
            EcdhCurve::X25519 => {
                let raw: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| Error::Format("invalid X25519 public key length".into()))?;
                Ok(Self::X25519(x25519_dalek::PublicKey::from(raw)))
            }
            EcdhCurve::P256 => p256::PublicKey::from_sec1_bytes(bytes)
                .map(Self::P256)
                .map_err(invalid),
            EcdhCurve::P384 => p384::PublicKey::from_sec1_bytes(bytes)
                .map(Self::P384)
                .map_err(invalid),
            EcdhCurve::P521 => p521::PublicKey::from_sec1_bytes(bytes)
                .map(Self::P521)
                .map_err(invalid),
        }
    }

    /// Raw public key bytes: uncompressed SEC1 for NIST curves.
    ///
    /// Returns `None` for RSA keys.
    #[must_use]
    pub fn to_raw(&self) -> Option<Vec<u8>> {
        match self {
            Self::Rsa(_) => None,
            Self::P256(key) => Some(key.to_encoded_point(false).as_bytes().to_vec()),
            Self::P384(key) => Some(key.to_encoded_point(false).as_bytes().to_vec()),
            Self::P521(key) => Some(key.to_encoded_point(false).as_bytes().to_vec()),
            Self::X25519(key) => Some(key.as_bytes().to_vec()),
        }
    }

    /// RSA modulus length in bits.
    pub(crate) fn rsa_modulus_bits(&self) -> Option<usize> {
        match self {
            Self::Rsa(key) => Some(key.size() * 8),
            _ => None,
        }
    }
}

impl fmt::Debug for PublicKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa(key) => write!(f, "PublicKeyMaterial::Rsa({} bits)", key.size() * 8),
            other => write!(f, "PublicKeyMaterial::{:?}", other.curve()),
        }
    }
}

impl PrivateKeyMaterial {
    /// Curve for EC and OKP keys.
    #[must_use]
    pub fn curve(&self) -> Option<EcdhCurve> {
        match self {
            Self::Rsa(_) => None,
            Self::P256(_) => Some(EcdhCurve::P256),
            Self::P384(_) => Some(EcdhCurve::P384),
            Self::P521(_) => Some(EcdhCurve::P521),
            Self::X25519(_) => Some(EcdhCurve::X25519),
        }
    }

    /// Derives the matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKeyMaterial {
        match self {
            Self::Rsa(key) => PublicKeyMaterial::Rsa(key.to_public_key()),
            Self::P256(key) => PublicKeyMaterial::P256(key.public_key()),
            Self::P384(key) => PublicKeyMaterial::P384(key.public_key()),
            Self::P521(key) => PublicKeyMaterial::P521(key.public_key()),
            Self::X25519(key) => PublicKeyMaterial::X25519(x25519_dalek::PublicKey::from(key)),
        }
    }
}
