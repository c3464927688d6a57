//! Key wrapping algorithms for JWE.
//!
//! AES Key Wrap (RFC 3394) backs `A*KW`, `ECDH-ES+A*KW` and `PBES2-*`.
//! AES-GCM key wrapping backs `A*GCMKW`.

use std::fmt;

use aes::cipher::consts::{U16, U24, U32};
use aes::cipher::generic_array::GenericArray;
use aes_kw::{KekAes128, KekAes192, KekAes256};
use zeroize::Zeroizing;

use super::algorithms::{open, seal_with_iv};
use super::key_management::primitive_calls;
use super::types::AesKeySize;
use super::ContentEncryptionAlgorithm;
use crate::error::{Error, Result};
use crate::utils::random_bytes;

/// A content encryption key.
#[derive(Clone)]
pub struct ContentEncryptionKey(Zeroizing<Vec<u8>>);

impl ContentEncryptionKey {
    /// Creates a new content encryption key.
    #[must_use]
    pub fn new(key: Vec<u8>) -> Self {
        Self(Zeroizing::new(key))
    }

    /// Generates a random key of the length `enc` requires.
    ///
    /// # Errors
    /// * `Error::Random` - If the random source fails
    pub fn generate(enc: ContentEncryptionAlgorithm) -> Result<Self> {
        random_bytes(enc.cek_len()).map(Self::new)
    }

    /// Gets the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ContentEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentEncryptionKey({} bytes)", self.0.len())
    }
}

/// Output of AES-GCM key wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcmWrapped {
    /// The wrapped key
    pub encrypted_key: Vec<u8>,
    /// The 96-bit IV
    pub iv: Vec<u8>,
    /// The 128-bit tag
    pub tag: Vec<u8>,
}

fn gcm_for(size: AesKeySize) -> ContentEncryptionAlgorithm {
    match size {
        AesKeySize::A128 => ContentEncryptionAlgorithm::A128Gcm,
        AesKeySize::A192 => ContentEncryptionAlgorithm::A192Gcm,
        AesKeySize::A256 => ContentEncryptionAlgorithm::A256Gcm,
    }
}

/// Wraps `cek` under `kek` with AES Key Wrap.
///
/// # Errors
/// * `Error::KeyType` - If `kek` is not 16, 24 or 32 bytes
/// * `Error::KeyManagement` - If `cek` is not a multiple of 8 bytes
pub fn wrap_key(kek: &[u8], cek: &[u8]) -> Result<Vec<u8>> {
    primitive_calls::hit();
    let mut wrapped = vec![0u8; cek.len() + 8];
    let result = match kek.len() {
        16 => KekAes128::from(GenericArray::<u8, U16>::clone_from_slice(kek)).wrap(cek, &mut wrapped),
        24 => KekAes192::from(GenericArray::<u8, U24>::clone_from_slice(kek)).wrap(cek, &mut wrapped),
        32 => KekAes256::from(GenericArray::<u8, U32>::clone_from_slice(kek)).wrap(cek, &mut wrapped),
        len => return Err(Error::KeyType(format!("invalid AES-KW key length {len}"))),
    };
    result.map_err(|_| Error::KeyManagement)?;
    Ok(wrapped)
}

/// Unwraps `wrapped` under `kek` with AES Key Wrap.
///
/// # Errors
/// * `Error::KeyManagement` - On any failure
pub fn unwrap_key(kek: &[u8], wrapped: &[u8]) -> Result<ContentEncryptionKey> {
    primitive_calls::hit();
    if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
        return Err(Error::KeyManagement);
    }
    let mut key = Zeroizing::new(vec![0u8; wrapped.len() - 8]);
    let result = match kek.len() {
        16 => KekAes128::from(GenericArray::<u8, U16>::clone_from_slice(kek)).unwrap(wrapped, &mut key),
        24 => KekAes192::from(GenericArray::<u8, U24>::clone_from_slice(kek)).unwrap(wrapped, &mut key),
        32 => KekAes256::from(GenericArray::<u8, U32>::clone_from_slice(kek)).unwrap(wrapped, &mut key),
        _ => return Err(Error::KeyManagement),
    };
    result.map_err(|_| Error::KeyManagement)?;
    Ok(ContentEncryptionKey::new(key.to_vec()))
}

/// Wraps `cek` under `kek` with AES-GCM, using `iv` or a fresh random one.
///
/// # Errors
/// * `Error::KeyType` - If `kek` has the wrong length for `size`
/// * `Error::Format` - If a supplied `iv` is not 12 bytes
pub fn gcm_wrap_key(
    size: AesKeySize,
    kek: &[u8],
    cek: &[u8],
    iv: Option<&[u8]>,
) -> Result<GcmWrapped> {
    primitive_calls::hit();
    let enc = gcm_for(size);
    let iv = match iv {
        Some(iv) => iv.to_vec(),
        None => random_bytes(enc.iv_len())?,
    };
    let sealed = seal_with_iv(enc, kek, &iv, cek, &[])?;
    Ok(GcmWrapped {
        encrypted_key: sealed.ciphertext,
        iv: sealed.iv,
        tag: sealed.tag,
    })
}

/// Unwraps a key wrapped with AES-GCM.
///
/// Malformed `iv` or `tag` lengths run the same decryption as a bad tag.
///
/// # Errors
/// * `Error::KeyManagement` - On any failure
pub fn gcm_unwrap_key(
    size: AesKeySize,
    kek: &[u8],
    encrypted_key: &[u8],
    iv: &[u8],
    tag: &[u8],
) -> Result<ContentEncryptionKey> {
    primitive_calls::hit();
    open(gcm_for(size), kek, encrypted_key, iv, tag, &[])
        .map(ContentEncryptionKey::new)
        .map_err(|_| Error::KeyManagement)
}
