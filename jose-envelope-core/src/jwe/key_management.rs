//! Key management dispatch.
//!
//! Every JWE key management mode funnels through two functions:
//! [`derive_for_encryption`] produces the CEK (and, for wrapping modes, the
//! encrypted key plus any header parameters the recipient needs), and
//! [`recover_for_decryption`] recovers the CEK from the encrypted key and the
//! joined header.
//!
//! Before any primitive runs, the key handle is checked against the
//! algorithm by [`check_key`]. A mismatch is always `Error::KeyType`.

use rsa::traits::PrivateKeyParts;
use serde_json::Value;
use tracing::debug;
use zeroize::Zeroizing;

use super::header::{EphemeralPublicKey, Header};
use super::key_agreement::{concat_kdf, ephemeral_agreement, static_agreement};
use super::key_wrapping::{gcm_unwrap_key, gcm_wrap_key, unwrap_key, wrap_key, ContentEncryptionKey};
use super::rsa_oaep::{self, MIN_MODULUS_BITS};
use super::types::{ContentEncryptionAlgorithm, KeyManagementAlgorithm};
use super::pbes2;
use crate::error::{Error, Result, UnsupportedKey};
use crate::key::{
    KeyFamily, KeyHandle, KeyKind, KeyMaterial, KeyUse, PrivateKeyMaterial, PublicKeyMaterial,
};
use crate::utils::{b64_encode, header_b64, random_bytes};

/// Default upper bound on `p2c` when decrypting.
pub const DEFAULT_MAX_PBES2_COUNT: u32 = 10_000;

/// Per-message inputs for key management on the sending side.
#[derive(Debug, Clone, Default)]
pub struct KeyManagementParams {
    /// Agreement PartyUInfo for ECDH-ES
    pub apu: Option<Vec<u8>>,
    /// Agreement PartyVInfo for ECDH-ES
    pub apv: Option<Vec<u8>>,
    /// PBES2 iteration count (default 2048)
    pub p2c: Option<u32>,
    /// PBES2 salt input (default 16 random bytes)
    pub p2s: Option<Vec<u8>>,
    /// AES-GCM key wrapping IV (default 12 random bytes)
    pub iv: Option<Vec<u8>>,
}

/// Limits applied on the receiving side.
#[derive(Debug, Clone)]
pub struct DecryptOptions {
    /// Largest PBES2 `p2c` that will be honoured
    pub max_pbes2_count: u32,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            max_pbes2_count: DEFAULT_MAX_PBES2_COUNT,
        }
    }
}

/// Output of [`derive_for_encryption`].
#[derive(Debug)]
pub struct KeyManagementResult {
    /// The content encryption key
    pub cek: ContentEncryptionKey,
    /// The encrypted key; `None` for direct modes
    pub encrypted_key: Option<Vec<u8>>,
    /// Header parameters the recipient needs (`epk`, `iv`, `p2s`, ...)
    pub header_additions: Header,
}

/// Which side of the exchange a key is being used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Producing an encrypted key
    Encrypt,
    /// Recovering a CEK
    Decrypt,
}

/// Checks that `key` can drive `alg` for `operation`.
///
/// This never touches a cryptographic primitive.
///
/// # Errors
/// * `Error::KeyType` - Family, kind, usage, binding or size mismatch
/// * `Error::UnsupportedKey` - A multi-prime RSA key
pub fn check_key(
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    key: &KeyHandle,
    operation: Operation,
) -> Result<()> {
    let family = key.family();
    if !alg.key_families().contains(&family) {
        return Err(Error::KeyType(format!(
            "{alg} cannot be used with a {} key",
            family.kty()
        )));
    }

    if key.key_use() == Some(KeyUse::Signature) {
        return Err(Error::KeyType(format!(
            "key is restricted to signatures and cannot be used for {alg}"
        )));
    }

    if let Some(bound) = key.algorithm() {
        let matches_binding = bound == alg.as_str()
            || (alg == KeyManagementAlgorithm::Dir && bound == enc.as_str());
        if !matches_binding {
            return Err(Error::KeyType(format!(
                "key is bound to {bound} and cannot be used for {alg}"
            )));
        }
    }

    if let KeyMaterial::Private(PrivateKeyMaterial::Rsa(rsa)) = key.material() {
        if rsa.primes().len() != 2 {
            return Err(UnsupportedKey::MultiPrimeRsa.into());
        }
    }

    let expected_kind = match (family, operation) {
        (KeyFamily::Oct, _) => KeyKind::Secret,
        (_, Operation::Encrypt) => KeyKind::Public,
        (_, Operation::Decrypt) => KeyKind::Private,
    };
    if key.kind() != expected_kind {
        return Err(Error::KeyType(format!(
            "{alg} {} requires a {expected_kind:?} key, got {:?}",
            match operation {
                Operation::Encrypt => "encryption",
                Operation::Decrypt => "decryption",
            },
            key.kind()
        )));
    }

    let required_len = match alg {
        KeyManagementAlgorithm::Dir => Some(enc.cek_len()),
        KeyManagementAlgorithm::AesKw(size) | KeyManagementAlgorithm::AesGcmKw(size) => {
            Some(size.key_len())
        }
        _ => None,
    };
    if let (Some(required), Some(secret)) = (required_len, key.secret_bytes()) {
        if secret.len() != required {
            return Err(Error::KeyType(format!(
                "{alg} requires a {required} byte key, got {}",
                secret.len()
            )));
        }
    }
    if matches!(alg, KeyManagementAlgorithm::Pbes2(_))
        && key.secret_bytes().map_or(true, <[u8]>::is_empty)
    {
        return Err(Error::KeyType("PBES2 requires a non-empty password".into()));
    }

    let modulus_bits = match key.material() {
        KeyMaterial::Public(public) => public.rsa_modulus_bits(),
        KeyMaterial::Private(private) => private.public_key().rsa_modulus_bits(),
        KeyMaterial::Secret(_) => None,
    };
    if let Some(bits) = modulus_bits {
        if bits < MIN_MODULUS_BITS {
            return Err(Error::KeyType(format!(
                "{alg} requires a modulus of at least {MIN_MODULUS_BITS} bits"
            )));
        }
    }

    Ok(())
}

/// Produces the CEK and, for wrapping modes, the encrypted key.
///
/// `provided_cek` replaces the random CEK for wrapping modes; it exists for
/// deterministic tests and is ignored by `dir` and `ECDH-ES`.
///
/// # Errors
/// * `Error::KeyType` / `Error::UnsupportedKey` - See [`check_key`]
/// * `Error::Format` - Invalid `params`
/// * `Error::KeyManagement` - A primitive failed
/// * `Error::Random` - The random source failed
pub fn derive_for_encryption(
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    key: &KeyHandle,
    provided_cek: Option<&[u8]>,
    params: &KeyManagementParams,
) -> Result<KeyManagementResult> {
    check_key(alg, enc, key, Operation::Encrypt)?;
    debug!(alg = %alg, enc = %enc, "deriving content encryption key");

    let mut header_additions = Header::new();
    let cek_for = |provided: Option<&[u8]>| -> Result<ContentEncryptionKey> {
        match provided {
            Some(cek) if cek.len() == enc.cek_len() => Ok(ContentEncryptionKey::new(cek.to_vec())),
            Some(_) => Err(Error::Format(format!(
                "provided CEK has the wrong length for {enc}"
            ))),
            None => ContentEncryptionKey::generate(enc),
        }
    };

    let (cek, encrypted_key) = match alg {
        KeyManagementAlgorithm::Dir => (ContentEncryptionKey::new(secret(key)?.to_vec()), None),
        KeyManagementAlgorithm::AesKw(_) => {
            let cek = cek_for(provided_cek)?;
            let wrapped = wrap_key(secret(key)?, cek.as_bytes())?;
            (cek, Some(wrapped))
        }
        KeyManagementAlgorithm::AesGcmKw(size) => {
            let cek = cek_for(provided_cek)?;
            let wrapped = gcm_wrap_key(size, secret(key)?, cek.as_bytes(), params.iv.as_deref())?;
            header_additions.insert("iv".into(), Value::String(b64_encode(&wrapped.iv)));
            header_additions.insert("tag".into(), Value::String(b64_encode(&wrapped.tag)));
            (cek, Some(wrapped.encrypted_key))
        }
        KeyManagementAlgorithm::EcdhEs | KeyManagementAlgorithm::EcdhEsAesKw(_) => {
            let recipient = public(key)?;
            let apu = params.apu.as_deref().unwrap_or_default();
            let apv = params.apv.as_deref().unwrap_or_default();
            let (epk, z) = ephemeral_agreement(recipient)?;
            header_additions.insert(
                "epk".into(),
                EphemeralPublicKey::from_public_key(&epk)?.to_value(),
            );
            if let Some(apu) = &params.apu {
                header_additions.insert("apu".into(), Value::String(b64_encode(apu)));
            }
            if let Some(apv) = &params.apv {
                header_additions.insert("apv".into(), Value::String(b64_encode(apv)));
            }

            if let KeyManagementAlgorithm::EcdhEsAesKw(size) = alg {
                let kek = concat_kdf(&z, alg.as_str(), size.key_len(), apu, apv)?;
                let cek = cek_for(provided_cek)?;
                let wrapped = wrap_key(&kek, cek.as_bytes())?;
                (cek, Some(wrapped))
            } else {
                let derived = concat_kdf(&z, enc.as_str(), enc.cek_len(), apu, apv)?;
                (ContentEncryptionKey::new(derived.to_vec()), None)
            }
        }
        KeyManagementAlgorithm::Pbes2(size) => {
            let p2s = match &params.p2s {
                Some(p2s) => p2s.clone(),
                None => random_bytes(pbes2::DEFAULT_SALT_LEN)?,
            };
            if p2s.len() < pbes2::MIN_SALT_LEN {
                return Err(Error::Format("PBES2 Salt Input must be 8 or more octets".into()));
            }
            let p2c = params.p2c.unwrap_or(pbes2::DEFAULT_ITERATIONS);
            if p2c == 0 {
                return Err(Error::Format("PBES2 Count must be a positive integer".into()));
            }

            let kek = pbes2::derive_kek(size, secret(key)?, &p2s, p2c);
            let cek = cek_for(provided_cek)?;
            let wrapped = wrap_key(&kek, cek.as_bytes())?;
            header_additions.insert("p2s".into(), Value::String(b64_encode(&p2s)));
            header_additions.insert("p2c".into(), Value::from(p2c));
            (cek, Some(wrapped))
        }
        KeyManagementAlgorithm::RsaOaep(digest) => {
            let PublicKeyMaterial::Rsa(rsa) = public(key)? else {
                return Err(Error::KeyType(format!("{alg} requires an RSA key")));
            };
            let cek = cek_for(provided_cek)?;
            let encrypted = rsa_oaep::encrypt_key(digest, rsa, cek.as_bytes())?;
            (cek, Some(encrypted))
        }
    };

    Ok(KeyManagementResult {
        cek,
        encrypted_key,
        header_additions,
    })
}

/// Recovers the CEK for decryption.
///
/// `header` is the joined JOSE Header for this recipient.
///
/// # Errors
/// * `Error::KeyType` / `Error::UnsupportedKey` - See [`check_key`]
/// * `Error::Format` - Missing or malformed header parameters or encrypted key
/// * `Error::Policy` - `p2c` above `options.max_pbes2_count`
/// * `Error::KeyManagement` - The CEK could not be recovered
pub fn recover_for_decryption(
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    key: &KeyHandle,
    encrypted_key: &[u8],
    header: &Header,
    options: &DecryptOptions,
) -> Result<ContentEncryptionKey> {
    check_key(alg, enc, key, Operation::Decrypt)?;
    debug!(alg = %alg, enc = %enc, "recovering content encryption key");

    if alg.is_direct() && !encrypted_key.is_empty() {
        return Err(Error::Format(format!(
            "encrypted key must be empty for {alg}"
        )));
    }
    if !alg.is_direct() && encrypted_key.is_empty() {
        return Err(Error::Format(format!("{alg} requires an encrypted key")));
    }

    let cek = match alg {
        KeyManagementAlgorithm::Dir => ContentEncryptionKey::new(secret(key)?.to_vec()),
        KeyManagementAlgorithm::AesKw(_) => unwrap_key(secret(key)?, encrypted_key)?,
        KeyManagementAlgorithm::AesGcmKw(size) => {
            let iv = header_b64(header, "iv")?
                .ok_or_else(|| Error::Format("missing \"iv\" header parameter".into()))?;
            let tag = header_b64(header, "tag")?
                .ok_or_else(|| Error::Format("missing \"tag\" header parameter".into()))?;
            gcm_unwrap_key(size, secret(key)?, encrypted_key, &iv, &tag)?
        }
        KeyManagementAlgorithm::EcdhEs | KeyManagementAlgorithm::EcdhEsAesKw(_) => {
            let private = private(key)?;
            let epk = EphemeralPublicKey::from_header(header)?;
            if Some(epk.crv) != private.curve() {
                return Err(Error::KeyType(format!(
                    "\"epk\" curve {} does not match the private key",
                    epk.crv
                )));
            }
            let epk = epk.to_public_key()?;
            let apu = header_b64(header, "apu")?.unwrap_or_default();
            let apv = header_b64(header, "apv")?.unwrap_or_default();
            let z = static_agreement(private, &epk)?;

            if let KeyManagementAlgorithm::EcdhEsAesKw(size) = alg {
                let kek = concat_kdf(&z, alg.as_str(), size.key_len(), &apu, &apv)?;
                unwrap_key(&kek, encrypted_key)?
            } else {
                let derived = concat_kdf(&z, enc.as_str(), enc.cek_len(), &apu, &apv)?;
                ContentEncryptionKey::new(derived.to_vec())
            }
        }
        KeyManagementAlgorithm::Pbes2(size) => {
            let p2c = pbes2_count(header, options)?;
            let p2s = header_b64(header, "p2s")?
                .ok_or_else(|| Error::Format("missing \"p2s\" header parameter".into()))?;
            if p2s.len() < pbes2::MIN_SALT_LEN {
                return Err(Error::Format("PBES2 Salt Input must be 8 or more octets".into()));
            }
            let kek: Zeroizing<Vec<u8>> = pbes2::derive_kek(size, secret(key)?, &p2s, p2c);
            unwrap_key(&kek, encrypted_key)?
        }
        KeyManagementAlgorithm::RsaOaep(digest) => {
            let PrivateKeyMaterial::Rsa(rsa) = private(key)? else {
                return Err(Error::KeyType(format!("{alg} requires an RSA key")));
            };
            rsa_oaep::decrypt_key(digest, rsa, encrypted_key)?
        }
    };

    if cek.as_bytes().len() != enc.cek_len() {
        return Err(Error::KeyManagement);
    }
    Ok(cek)
}

fn pbes2_count(header: &Header, options: &DecryptOptions) -> Result<u32> {
    let p2c = header
        .get("p2c")
        .ok_or_else(|| Error::Format("missing \"p2c\" header parameter".into()))?
        .as_u64()
        .filter(|&count| count > 0)
        .ok_or_else(|| Error::Format("PBES2 Count must be a positive integer".into()))?;
    if p2c > u64::from(options.max_pbes2_count) {
        return Err(Error::Policy(format!(
            "PBES2 Count {p2c} exceeds the maximum of {}",
            options.max_pbes2_count
        )));
    }
    u32::try_from(p2c).map_err(|_| Error::Policy("PBES2 Count is too large".into()))
}

fn secret(key: &KeyHandle) -> Result<&[u8]> {
    key.secret_bytes()
        .ok_or_else(|| Error::KeyType("expected a symmetric key".into()))
}

fn public(key: &KeyHandle) -> Result<&PublicKeyMaterial> {
    match key.material() {
        KeyMaterial::Public(public) => Ok(public),
        _ => Err(Error::KeyType("expected a public key".into())),
    }
}

fn private(key: &KeyHandle) -> Result<&PrivateKeyMaterial> {
    match key.material() {
        KeyMaterial::Private(private) => Ok(private),
        _ => Err(Error::KeyType("expected a private key".into())),
    }
}


#[cfg(not(test))]
pub(crate) mod primitive_calls {
    #[inline]
    pub(crate) fn hit() {}
}
