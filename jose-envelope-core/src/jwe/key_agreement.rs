//! ECDH-ES key agreement for JWE.
//!
//! The shared secret `Z` is turned into key material with the Concat KDF of
//! NIST SP 800-56A using SHA-256, as profiled by RFC 7518 section 4.6.2.

use rand_core::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::key_management::primitive_calls;
use crate::error::{Error, Result};
use crate::key::{PrivateKeyMaterial, PublicKeyMaterial};

/// Maximum length of `apu` and `apv` after decoding.
pub const MAX_PARTY_INFO_LEN: usize = 512;

/// A key derived from an ECDH shared secret.
pub type DerivedKey = Zeroizing<Vec<u8>>;

/// Derives `key_len` bytes from the shared secret `z`.
///
/// `algorithm_id` is the `enc` value for direct agreement and the `alg`
/// value when the derived key wraps the CEK.
///
/// # Errors
/// * `Error::Format` - If `apu` or `apv` exceeds 512 bytes
pub fn concat_kdf(
    z: &[u8],
    algorithm_id: &str,
    key_len: usize,
    apu: &[u8],
    apv: &[u8],
) -> Result<DerivedKey> {
    if apu.len() > MAX_PARTY_INFO_LEN {
        return Err(Error::Format("APU too long (max 512 bytes)".into()));
    }
    if apv.len() > MAX_PARTY_INFO_LEN {
        return Err(Error::Format("APV too long (max 512 bytes)".into()));
    }

    let mut other_info = Vec::with_capacity(16 + algorithm_id.len() + apu.len() + apv.len());
    for field in [algorithm_id.as_bytes(), apu, apv] {
        other_info.extend_from_slice(&length_prefix(field.len()));
        other_info.extend_from_slice(field);
    }
    other_info.extend_from_slice(&length_prefix(key_len * 8));

    let rounds = key_len.div_ceil(32);
    let mut output = Zeroizing::new(Vec::with_capacity(rounds * 32));
    for counter in 1..=rounds {
        let mut hasher = Sha256::new();
        hasher.update(length_prefix(counter));
        hasher.update(z);
        hasher.update(&other_info);
        output.extend_from_slice(&hasher.finalize());
    }
    output.truncate(key_len);
    Ok(output)
}

fn length_prefix(len: usize) -> [u8; 4] {
    u32::try_from(len).unwrap_or(u32::MAX).to_be_bytes()
}

/// Generates an ephemeral key on the recipient's curve and agrees on `Z`.
///
/// Returns the ephemeral public key and the shared secret.
///
/// # Errors
/// * `Error::KeyType` - If the recipient key is RSA
/// * `Error::KeyManagement` - If an X25519 agreement is not contributory
pub fn ephemeral_agreement(
    recipient: &PublicKeyMaterial,
) -> Result<(PublicKeyMaterial, DerivedKey)> {
    primitive_calls::hit();
    match recipient {
        PublicKeyMaterial::P256(public) => {
            let secret = p256::ecdh::EphemeralSecret::random(&mut OsRng);
            let shared = secret.diffie_hellman(public);
            Ok((
                PublicKeyMaterial::P256(secret.public_key()),
                Zeroizing::new(shared.raw_secret_bytes().to_vec()),
            ))
        }
        PublicKeyMaterial::P384(public) => {
            let secret = p384::ecdh::EphemeralSecret::random(&mut OsRng);
            let shared = secret.diffie_hellman(public);
            Ok((
                PublicKeyMaterial::P384(secret.public_key()),
                Zeroizing::new(shared.raw_secret_bytes().to_vec()),
            ))
        }
        PublicKeyMaterial::P521(public) => {
            let secret = p521::ecdh::EphemeralSecret::random(&mut OsRng);
            let shared = secret.diffie_hellman(public);
            Ok((
                PublicKeyMaterial::P521(secret.public_key()),
                Zeroizing::new(shared.raw_secret_bytes().to_vec()),
            ))
        }
        PublicKeyMaterial::X25519(public) => {
            let secret = x25519_dalek::EphemeralSecret::random_from_rng(OsRng);
            let ephemeral = x25519_dalek::PublicKey::from(&secret);
            let shared = secret.diffie_hellman(public);
            if !shared.was_contributory() {
                return Err(Error::KeyManagement);
            }
            Ok((
                PublicKeyMaterial::X25519(ephemeral),
                Zeroizing::new(shared.as_bytes().to_vec()),
            ))
        }
        PublicKeyMaterial::Rsa(_) => Err(Error::KeyType(
            "ECDH-ES requires an EC or OKP public key".into(),
        )),
    }
}

/// Agrees on `Z` between a static private key and the sender's `epk`.
///
/// # Errors
/// * `Error::KeyType` - If the curves differ or either key is RSA
/// * `Error::KeyManagement` - If an X25519 agreement is not contributory
pub fn static_agreement(
    private: &PrivateKeyMaterial,
    epk: &PublicKeyMaterial,
) -> Result<DerivedKey> {
    primitive_calls::hit();
    let z = match (private, epk) {
        (PrivateKeyMaterial::P256(secret), PublicKeyMaterial::P256(public)) => {
            let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
            shared.raw_secret_bytes().to_vec()
        }
        (PrivateKeyMaterial::P384(secret), PublicKeyMaterial::P384(public)) => {
            let shared = p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
            shared.raw_secret_bytes().to_vec()
        }
        (PrivateKeyMaterial::P521(secret), PublicKeyMaterial::P521(public)) => {
            let shared = p521::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
            shared.raw_secret_bytes().to_vec()
        }
        (PrivateKeyMaterial::X25519(secret), PublicKeyMaterial::X25519(public)) => {
            let shared = secret.diffie_hellman(public);
            if !shared.was_contributory() {
                return Err(Error::KeyManagement);
            }
            shared.as_bytes().to_vec()
        }
        _ => {
            return Err(Error::KeyType(
                "\"epk\" is not on the same curve as the private key".into(),
            ))
        }
    };
    Ok(Zeroizing::new(z))
}
