//! PBES2 key derivation (RFC 7518 section 4.8).

use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use super::key_management::primitive_calls;
use super::types::{AesKeySize, KeyManagementAlgorithm};

/// Default `p2c` used when encrypting.
pub const DEFAULT_ITERATIONS: u32 = 2048;

/// Default length of a generated `p2s`.
pub const DEFAULT_SALT_LEN: usize = 16;

/// Shortest `p2s` accepted when decrypting.
pub const MIN_SALT_LEN: usize = 8;

/// Derives the key-wrapping key from a password.
///
/// The salt is `alg || 0x00 || p2s`; the PRF and key length follow `size`.
#[must_use]
pub fn derive_kek(
    size: AesKeySize,
    password: &[u8],
    p2s: &[u8],
    p2c: u32,
) -> Zeroizing<Vec<u8>> {
    primitive_calls::hit();
    let alg = KeyManagementAlgorithm::Pbes2(size).as_str();
    let mut salt = Vec::with_capacity(alg.len() + 1 + p2s.len());
    salt.extend_from_slice(alg.as_bytes());
    salt.push(0);
    salt.extend_from_slice(p2s);

    let mut kek = Zeroizing::new(vec![0u8; size.key_len()]);
    match size {
        AesKeySize::A128 => pbkdf2::pbkdf2_hmac::<Sha256>(password, &salt, p2c, &mut kek),
        AesKeySize::A192 => pbkdf2::pbkdf2_hmac::<Sha384>(password, &salt, p2c, &mut kek),
        AesKeySize::A256 => pbkdf2::pbkdf2_hmac::<Sha512>(password, &salt, p2c, &mut kek),
    }
    kek
}
