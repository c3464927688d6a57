//! Algorithm identifiers for JWE operations.
//!
//! The registry names (`alg`, `enc`, `crv`) are parsed into closed enums here
//! so the rest of the engine can match exhaustively instead of comparing
//! strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::key::KeyFamily;

/// AES key size used by the key wrapping families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AesKeySize {
    /// 128-bit key
    A128,
    /// 192-bit key
    A192,
    /// 256-bit key
    A256,
}

impl AesKeySize {
    /// Key length in bytes.
    #[must_use]
    pub fn key_len(self) -> usize {
        match self {
            Self::A128 => 16,
            Self::A192 => 24,
            Self::A256 => 32,
        }
    }
}

/// Digest used by RSAES-OAEP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OaepDigest {
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

/// Key management algorithms (the JWE `alg` header parameter).
///
/// # Examples
///
/// ```rust
/// use jose_envelope_core::jwe::types::{AesKeySize, KeyManagementAlgorithm};
///
/// let alg: KeyManagementAlgorithm = "ECDH-ES+A256KW".parse().unwrap();
/// assert_eq!(alg, KeyManagementAlgorithm::EcdhEsAesKw(AesKeySize::A256));
/// assert_eq!(alg.to_string(), "ECDH-ES+A256KW");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyManagementAlgorithm {
    /// Direct use of a shared symmetric key as the CEK
    Dir,
    /// AES Key Wrap (RFC 3394)
    AesKw(AesKeySize),
    /// AES-GCM key wrapping
    AesGcmKw(AesKeySize),
    /// ECDH-ES direct key agreement
    EcdhEs,
    /// ECDH-ES with the derived key used to AES-wrap the CEK
    EcdhEsAesKw(AesKeySize),
    /// PBES2 with HMAC-SHA2 and AES Key Wrap
    Pbes2(AesKeySize),
    /// RSAES-OAEP
    RsaOaep(OaepDigest),
}

impl KeyManagementAlgorithm {
    /// Every algorithm this engine implements.
    pub const ALL: [Self; 17] = [
        Self::Dir,
        Self::AesKw(AesKeySize::A128),
        Self::AesKw(AesKeySize::A192),
        Self::AesKw(AesKeySize::A256),
        Self::AesGcmKw(AesKeySize::A128),
        Self::AesGcmKw(AesKeySize::A192),
        Self::AesGcmKw(AesKeySize::A256),
        Self::EcdhEs,
        Self::EcdhEsAesKw(AesKeySize::A128),
        Self::EcdhEsAesKw(AesKeySize::A192),
        Self::EcdhEsAesKw(AesKeySize::A256),
        Self::Pbes2(AesKeySize::A128),
        Self::Pbes2(AesKeySize::A192),
        Self::Pbes2(AesKeySize::A256),
        Self::RsaOaep(OaepDigest::Sha256),
        Self::RsaOaep(OaepDigest::Sha384),
        Self::RsaOaep(OaepDigest::Sha512),
    ];

    /// Registered name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        use AesKeySize::{A128, A192, A256};
        match self {
            Self::Dir => "dir",
            Self::AesKw(A128) => "A128KW",
            Self::AesKw(A192) => "A192KW",
            Self::AesKw(A256) => "A256KW",
            Self::AesGcmKw(A128) => "A128GCMKW",
            Self::AesGcmKw(A192) => "A192GCMKW",
            Self::AesGcmKw(A256) => "A256GCMKW",
            Self::EcdhEs => "ECDH-ES",
            Self::EcdhEsAesKw(A128) => "ECDH-ES+A128KW",
            Self::EcdhEsAesKw(A192) => "ECDH-ES+A192KW",
            Self::EcdhEsAesKw(A256) => "ECDH-ES+A256KW",
            Self::Pbes2(A128) => "PBES2-HS256+A128KW",
            Self::Pbes2(A192) => "PBES2-HS384+A192KW",
            Self::Pbes2(A256) => "PBES2-HS512+A256KW",
            Self::RsaOaep(OaepDigest::Sha256) => "RSA-OAEP-256",
            Self::RsaOaep(OaepDigest::Sha384) => "RSA-OAEP-384",
            Self::RsaOaep(OaepDigest::Sha512) => "RSA-OAEP-512",
        }
    }

    /// Key families that can drive this algorithm.
    #[must_use]
    pub fn key_families(self) -> &'static [KeyFamily] {
        match self {
            Self::Dir | Self::AesKw(_) | Self::AesGcmKw(_) | Self::Pbes2(_) => &[KeyFamily::Oct],
            Self::EcdhEs | Self::EcdhEsAesKw(_) => &[KeyFamily::Ec, KeyFamily::Okp],
            Self::RsaOaep(_) => &[KeyFamily::Rsa],
        }
    }

    /// Whether the CEK is derived directly instead of carried encrypted.
    ///
    /// Direct algorithms always produce an empty `encrypted_key`.
    #[must_use]
    pub fn is_direct(self) -> bool {
        matches!(self, Self::Dir | Self::EcdhEs)
    }
}

impl fmt::Display for KeyManagementAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyManagementAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| Error::NotSupported(format!("\"alg\" (Algorithm) value {s}")))
    }
}

/// Content encryption algorithms (the JWE `enc` header parameter).
///
/// # Examples
///
/// ```rust
/// use jose_envelope_core::jwe::types::ContentEncryptionAlgorithm;
///
/// let enc = ContentEncryptionAlgorithm::A256Gcm;
/// assert_eq!(enc.cek_len(), 32);
/// assert_eq!(enc.iv_len(), 12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncryptionAlgorithm {
    /// AES-128-CBC with HMAC-SHA-256
    A128CbcHs256,
    /// AES-192-CBC with HMAC-SHA-384
    A192CbcHs384,
    /// AES-256-CBC with HMAC-SHA-512
    A256CbcHs512,
    /// AES-128-GCM
    A128Gcm,
    /// AES-192-GCM
    A192Gcm,
    /// AES-256-GCM
    A256Gcm,
}

impl ContentEncryptionAlgorithm {
    /// Every algorithm this engine implements.
    pub const ALL: [Self; 6] = [
        Self::A128CbcHs256,
        Self::A192CbcHs384,
        Self::A256CbcHs512,
        Self::A128Gcm,
        Self::A192Gcm,
        Self::A256Gcm,
    ];

    /// Registered name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A192CbcHs384 => "A192CBC-HS384",
            Self::A256CbcHs512 => "A256CBC-HS512",
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    /// Content encryption key length in bytes.
    ///
    /// For the CBC-HMAC composites this is the MAC key followed by the AES key.
    #[must_use]
    pub fn cek_len(self) -> usize {
        match self {
            Self::A128CbcHs256 | Self::A256Gcm => 32,
            Self::A192CbcHs384 => 48,
            Self::A256CbcHs512 => 64,
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
        }
    }

    /// Initialization vector length in bytes.
    #[must_use]
    pub fn iv_len(self) -> usize {
        if self.is_cbc() {
            16
        } else {
            12
        }
    }

    /// Authentication tag length in bytes.
    #[must_use]
    pub fn tag_len(self) -> usize {
        match self {
            Self::A128CbcHs256 | Self::A128Gcm | Self::A192Gcm | Self::A256Gcm => 16,
            Self::A192CbcHs384 => 24,
            Self::A256CbcHs512 => 32,
        }
    }

    /// Whether this is one of the AES-CBC + HMAC composites.
    #[must_use]
    pub fn is_cbc(self) -> bool {
        matches!(
            self,
            Self::A128CbcHs256 | Self::A192CbcHs384 | Self::A256CbcHs512
        )
    }
}

impl fmt::Display for ContentEncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentEncryptionAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|enc| enc.as_str() == s)
            .ok_or_else(|| Error::NotSupported(format!("\"enc\" (Encryption Algorithm) value {s}")))
    }
}

/// Elliptic curves supported for ECDH key agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcdhCurve {
    /// X25519 curve (Curve25519)
    #[serde(rename = "X25519")]
    X25519,
    /// NIST P-256 curve
    #[serde(rename = "P-256")]
    P256,
    /// NIST P-384 curve
    #[serde(rename = "P-384")]
    P384,
    /// NIST P-521 curve
    #[serde(rename = "P-521")]
    P521,
}

impl EcdhCurve {
    /// JWK `crv` name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X25519 => "X25519",
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    /// Looks a curve up by its JWK `crv` name.
    #[must_use]
    pub fn from_jwk_name(crv: &str) -> Option<Self> {
        match crv {
            "X25519" => Some(Self::X25519),
            "P-256" => Some(Self::P256),
            "P-384" => Some(Self::P384),
            "P-521" => Some(Self::P521),
            _ => None,
        }
    }

    /// JWK `kty` for keys on this curve.
    #[must_use]
    pub fn kty(self) -> &'static str {
        match self {
            Self::X25519 => "OKP",
            _ => "EC",
        }
    }

    /// Size of one coordinate (or of the whole key for X25519) in bytes.
    #[must_use]
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::X25519 | Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }
}

impl fmt::Display for EcdhCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! serde_via_str {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

serde_via_str!(KeyManagementAlgorithm);
serde_via_str!(ContentEncryptionAlgorithm);
