//! RSAES-OAEP key encryption (`RSA-OAEP-256`, `RSA-OAEP-384`, `RSA-OAEP-512`).
//!
//! # Security Considerations
//!
//! Decryption uses the `rsa` crate, whose private-key operation is not
//! constant time (RUSTSEC-2023-0071, the "Marvin" timing side channel).
//! Unwrap failures are reported as a single `KeyManagement` error, but the
//! timing of the modular exponentiation itself can still leak. Avoid
//! exposing RSA-OAEP decryption as a remotely timed oracle.

use rand_core::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};

use super::key_management::primitive_calls;
use super::key_wrapping::ContentEncryptionKey;
use super::types::OaepDigest;
use crate::error::{Error, Result};

/// Smallest modulus accepted for RSA key management.
pub const MIN_MODULUS_BITS: usize = 2048;

fn padding(digest: OaepDigest) -> Oaep {
    match digest {
        OaepDigest::Sha256 => Oaep::new::<Sha256>(),
        OaepDigest::Sha384 => Oaep::new::<Sha384>(),
        OaepDigest::Sha512 => Oaep::new::<Sha512>(),
    }
}

/// Encrypts the CEK to an RSA public key.
///
/// # Errors
/// * `Error::KeyManagement` - If the CEK does not fit under the modulus
pub fn encrypt_key(digest: OaepDigest, key: &RsaPublicKey, cek: &[u8]) -> Result<Vec<u8>> {
    primitive_calls::hit();
    key.encrypt(&mut OsRng, padding(digest), cek)
        .map_err(|_| Error::KeyManagement)
}

/// Decrypts the CEK with an RSA private key.
///
/// # Errors
/// * `Error::KeyManagement` - On any failure
pub fn decrypt_key(
    digest: OaepDigest,
    key: &RsaPrivateKey,
    encrypted_key: &[u8],
) -> Result<ContentEncryptionKey> {
    primitive_calls::hit();
    key.decrypt(padding(digest), encrypted_key)
        .map(ContentEncryptionKey::new)
        .map_err(|_| Error::KeyManagement)
}

#[cfg(test)]
pub(crate) fn test_key() -> RsaPrivateKey {
    use std::sync::OnceLock;

    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, MIN_MODULUS_BITS).unwrap())
        .clone()
}
