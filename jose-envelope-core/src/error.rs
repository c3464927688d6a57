//! Error types for the jose-envelope-core crate.
//!
//! The variants map one-to-one onto the failure kinds callers branch on.
//! `KeyManagement` and `Integrity` carry no detail about which sub-check
//! failed.

use std::fmt;

use thiserror::Error;

/// Reasons a key is refused before any cryptographic operation is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedKey {
    /// RSA key with more than two primes (JWK `oth`).
    MultiPrimeRsa,
    /// Elliptic curve (or OKP subtype) that no algorithm here can use.
    Curve(String),
    /// JWK `kty` that is not `oct`, `RSA`, `EC` or `OKP`.
    KeyType(String),
}

impl fmt::Display for UnsupportedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultiPrimeRsa => {
                write!(f, "RSA keys with \"oth\" (Other Primes Info) are not supported")
            }
            Self::Curve(crv) => write!(f, "unsupported \"crv\" (Curve) value: {crv}"),
            Self::KeyType(kty) => write!(f, "unsupported \"kty\" (Key Type) value: {kty}"),
        }
    }
}

/// Error type for the JOSE envelope engine
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed wire text or header parameter
    #[error("Invalid format: {0}")]
    Format(String),
    /// Header violates the caller-supplied policy
    #[error("Policy violation: {0}")]
    Policy(String),
    /// Key handle does not fit the requested algorithm
    #[error("Key type mismatch: {0}")]
    KeyType(String),
    /// Content encryption key could not be derived or recovered
    #[error("Key management failed")]
    KeyManagement,
    /// Authenticated decryption failed
    #[error("Decryption failed")]
    Integrity,
    /// JWS signature did not verify
    #[error("Signature verification failed")]
    SignatureVerification,
    /// Key shape is recognised but not supported
    #[error("Unsupported key: {0}")]
    UnsupportedKey(UnsupportedKey),
    /// Feature is recognised but not supported
    #[error("Not supported: {0}")]
    NotSupported(String),
    /// Remote JWK Set fetch exceeded its deadline
    #[error("Timed out fetching the JSON Web Key Set")]
    JwksTimeout,
    /// Remote JWK Set fetch or parse failure
    #[error("JOSE error: {0}")]
    Jose(String),
    /// No key in the JWK Set matched the selector
    #[error("No applicable key found in the JSON Web Key Set")]
    NoMatchingKey,
    /// More than one key in the JWK Set matched the selector
    #[error("Multiple matching keys found in the JSON Web Key Set")]
    MultipleMatchingKeys,
    /// Secure random source failed
    #[error("Secure random source failure")]
    Random,
    /// Serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<UnsupportedKey> for Error {
    fn from(reason: UnsupportedKey) -> Self {
        Self::UnsupportedKey(reason)
    }
}

/// Result type for the JOSE envelope engine
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = [
            (Error::Format("test".into()), "Invalid format: test"),
            (Error::Policy("test".into()), "Policy violation: test"),
            (Error::KeyType("test".into()), "Key type mismatch: test"),
            (Error::KeyManagement, "Key management failed"),
            (Error::Integrity, "Decryption failed"),
            (Error::JwksTimeout, "Timed out fetching the JSON Web Key Set"),
        ];

        for (error, expected) in &errors {
            assert_eq!(error.to_string(), *expected);
        }
    }

    #[test]
    fn test_unsupported_key_reasons_are_distinct() {
        let rsa = Error::from(UnsupportedKey::MultiPrimeRsa).to_string();
        let crv = Error::from(UnsupportedKey::Curve("secp256k1".into())).to_string();
        let kty = Error::from(UnsupportedKey::KeyType("AKP".into())).to_string();

        assert!(rsa.contains("oth"));
        assert!(crv.contains("secp256k1"));
        assert!(kty.contains("AKP"));
        assert_ne!(rsa, crv);
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        assert!(matches!(Error::from(json_err), Error::Json(_)));
    }
}
