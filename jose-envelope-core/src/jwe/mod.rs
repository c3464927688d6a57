//! JWE (JSON Web Encryption) implementation.
//!
//! This module builds and opens JWE objects in all three serializations of
//! RFC 7516: compact, flattened JSON and general JSON.
//!
//! # Features
//!
//! - Direct encryption (`dir`)
//! - AES key wrapping (`A*KW`) and AES-GCM key wrapping (`A*GCMKW`)
//! - `ECDH-ES` and `ECDH-ES+A*KW` on `X25519`, `P-256`, `P-384` and `P-521`
//! - Password-based encryption (`PBES2-HS*+A*KW`)
//! - `RSA-OAEP-256`, `RSA-OAEP-384` and `RSA-OAEP-512`
//! - Content encryption with `A*CBC-HS*` and `A*GCM`
//! - Multiple recipients sharing one content encryption key
//! - APU/APV parameter support in key derivation
//!
//! # Examples
//!
//! ```rust
//! use jose_envelope_core::jwe::{
//!     decrypt_compact, encrypt_compact, ContentEncryptionAlgorithm, DecryptOptions,
//!     KeyManagementAlgorithm,
//! };
//! use jose_envelope_core::key::KeyHandle;
//! use jose_envelope_core::policy::JwePolicy;
//!
//! let key = KeyHandle::secret(vec![0u8; 32]);
//! let jwe = encrypt_compact(
//!     b"hello",
//!     KeyManagementAlgorithm::Dir,
//!     ContentEncryptionAlgorithm::A256Gcm,
//!     &key,
//! )
//! .unwrap();
//!
//! let policy = JwePolicy::new(
//!     [KeyManagementAlgorithm::Dir],
//!     [ContentEncryptionAlgorithm::A256Gcm],
//! );
//! let decrypted = decrypt_compact(&jwe, &key, &policy, &DecryptOptions::default()).unwrap();
//! assert_eq!(decrypted.plaintext, b"hello");
//! ```
//!
//! # Security Considerations
//!
//! - Headers are checked against a [`JwePolicy`] before any key is used
//! - Key handles are checked against the algorithm before any primitive runs
//! - Key management and content decryption failures carry no detail
//! - Compressed payloads (`zip`) are refused

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::key::{KeyHandle, KeyUse};
use crate::policy::{validate_jwe_header, JwePolicy, ValidatedJweHeader};
use crate::resolver::{KeyResolver, KeySelector};
use crate::utils::b64_encode;

pub mod algorithms;
pub mod header;
pub mod key_agreement;
pub mod key_management;
pub mod key_wrapping;
pub mod message;
pub mod pbes2;
pub mod rsa_oaep;
pub mod types;

// Re-export commonly used types
pub use self::algorithms::{open, seal, seal_with_iv, AeadResult};
pub use self::header::{join_headers, EphemeralPublicKey, Header};
pub use self::key_management::{
    derive_for_encryption, recover_for_decryption, DecryptOptions, KeyManagementParams,
    KeyManagementResult,
};
pub use self::key_wrapping::ContentEncryptionKey;
pub use self::message::{CompactJwe, DecodedJwe, DecodedRecipient, FlattenedJwe, GeneralJwe, JweRecipient};
pub use self::types::{
    AesKeySize, ContentEncryptionAlgorithm, EcdhCurve, KeyManagementAlgorithm, OaepDigest,
};

/// One recipient of a JWE being built.
#[derive(Debug, Clone)]
pub struct Recipient<'a> {
    alg: KeyManagementAlgorithm,
    key: &'a KeyHandle,
    header: Option<Header>,
    params: KeyManagementParams,
}

impl<'a> Recipient<'a> {
    /// Creates a recipient using `alg` with `key`.
    #[must_use]
    pub fn new(alg: KeyManagementAlgorithm, key: &'a KeyHandle) -> Self {
        Self {
            alg,
            key,
            header: None,
            params: KeyManagementParams::default(),
        }
    }

    /// Sets the per-recipient unprotected header (JSON serializations only).
    #[must_use]
    pub fn with_header(mut self, header: Header) -> Self {
        self.header = Some(header);
        self
    }

    /// Sets the key management parameters (`apu`, `apv`, `p2c`, `p2s`, `iv`).
    #[must_use]
    pub fn with_params(mut self, params: KeyManagementParams) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Compact,
    Flattened,
    General,
}

struct Sealed {
    protected: String,
    recipients: Vec<JweRecipient>,
    aad: Option<String>,
    iv: String,
    ciphertext: String,
    tag: String,
}

/// Builds JWE objects.
///
/// # Examples
///
/// ```rust
/// use jose_envelope_core::jwe::{
///     AesKeySize, ContentEncryptionAlgorithm, JweBuilder, KeyManagementAlgorithm, Recipient,
/// };
/// use jose_envelope_core::key::KeyHandle;
///
/// let alice = KeyHandle::secret(vec![1u8; 16]);
/// let bob = KeyHandle::secret(vec![2u8; 32]);
/// let jwe = JweBuilder::new(ContentEncryptionAlgorithm::A128CbcHs256)
///     .add_recipient(Recipient::new(KeyManagementAlgorithm::AesKw(AesKeySize::A128), &alice))
///     .add_recipient(Recipient::new(KeyManagementAlgorithm::AesKw(AesKeySize::A256), &bob))
///     .encrypt_general(b"for both")
///     .unwrap();
/// assert_eq!(jwe.recipients.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct JweBuilder<'a> {
    enc: ContentEncryptionAlgorithm,
    protected: Header,
    unprotected: Option<Header>,
    aad: Option<Vec<u8>>,
    recipients: Vec<Recipient<'a>>,
    cek: Option<Vec<u8>>,
    iv: Option<Vec<u8>>,
}

impl<'a> JweBuilder<'a> {
    /// Creates a builder encrypting content with `enc`.
    #[must_use]
    pub fn new(enc: ContentEncryptionAlgorithm) -> Self {
        Self {
            enc,
            protected: Header::new(),
            unprotected: None,
            aad: None,
            recipients: Vec::new(),
            cek: None,
            iv: None,
        }
    }

    /// Adds parameters to the protected header. `alg` and `enc` are always
    /// set by the builder.
    #[must_use]
    pub fn protected_header(mut self, header: Header) -> Self {
        self.protected.extend(header);
        self
    }

    /// Sets the shared unprotected header (JSON serializations only).
    #[must_use]
    pub fn shared_unprotected_header(mut self, header: Header) -> Self {
        self.unprotected = Some(header);
        self
    }

    /// Sets additional authenticated data (JSON serializations only).
    #[must_use]
    pub fn aad(mut self, aad: impl Into<Vec<u8>>) -> Self {
        self.aad = Some(aad.into());
        self
    }

    /// Adds a recipient.
    #[must_use]
    pub fn add_recipient(mut self, recipient: Recipient<'a>) -> Self {
        self.recipients.push(recipient);
        self
    }

    /// Uses a fixed content encryption key instead of a random one.
    ///
    /// Ignored when the only recipient uses `dir` or `ECDH-ES`.
    #[must_use]
    pub fn content_encryption_key(mut self, cek: impl Into<Vec<u8>>) -> Self {
        self.cek = Some(cek.into());
        self
    }

    /// Uses a fixed content encryption IV instead of a random one.
    #[must_use]
    pub fn iv(mut self, iv: impl Into<Vec<u8>>) -> Self {
        self.iv = Some(iv.into());
        self
    }

    /// Encrypts into the compact serialization.
    ///
    /// # Errors
    /// * `Error::Format` - Not exactly one recipient, or a header or `aad`
    ///   the compact form cannot carry
    /// * `Error::NotSupported` - A `zip` header parameter
    /// * Any key management or content encryption error
    pub fn encrypt_compact(&self, plaintext: &[u8]) -> Result<String> {
        let sealed = self.seal(plaintext, Layout::Compact)?;
        let encrypted_key = sealed
            .recipients
            .into_iter()
            .next()
            .and_then(|recipient| recipient.encrypted_key)
            .unwrap_or_default();
        Ok(CompactJwe {
            protected: sealed.protected,
            encrypted_key,
            iv: sealed.iv,
            ciphertext: sealed.ciphertext,
            tag: sealed.tag,
        }
        .to_string())
    }

    /// Encrypts into the flattened JSON serialization.
    ///
    /// # Errors
    /// See [`JweBuilder::encrypt_compact`].
    pub fn encrypt_flattened(&self, plaintext: &[u8]) -> Result<FlattenedJwe> {
        let sealed = self.seal(plaintext, Layout::Flattened)?;
        let recipient = sealed.recipients.into_iter().next();
        let (header, encrypted_key) =
            recipient.map_or((None, None), |recipient| (recipient.header, recipient.encrypted_key));
        Ok(FlattenedJwe {
            protected: Some(sealed.protected),
            unprotected: self.unprotected.clone(),
            header,
            encrypted_key,
            aad: sealed.aad,
            iv: Some(sealed.iv),
            ciphertext: sealed.ciphertext,
            tag: Some(sealed.tag),
        })
    }

    /// Encrypts into the general JSON serialization.
    ///
    /// # Errors
    /// * `Error::Format` - No recipients, or `dir`/`ECDH-ES` alongside
    ///   other recipients
    /// * `Error::NotSupported` - A `zip` header parameter
    /// * Any key management or content encryption error
    pub fn encrypt_general(&self, plaintext: &[u8]) -> Result<GeneralJwe> {
        let sealed = self.seal(plaintext, Layout::General)?;
        Ok(GeneralJwe {
            protected: Some(sealed.protected),
            unprotected: self.unprotected.clone(),
            recipients: sealed.recipients,
            aad: sealed.aad,
            iv: Some(sealed.iv),
            ciphertext: sealed.ciphertext,
            tag: Some(sealed.tag),
        })
    }

    fn check_layout(&self, layout: Layout) -> Result<()> {
        if self.recipients.is_empty() {
            return Err(Error::Format("JWE requires at least one recipient".into()));
        }
        if layout != Layout::General && self.recipients.len() != 1 {
            return Err(Error::Format(
                "compact and flattened JWE have exactly one recipient".into(),
            ));
        }
        if layout == Layout::Compact
            && (self.unprotected.is_some()
                || self.aad.is_some()
                || self.recipients.iter().any(|r| r.header.is_some()))
        {
            return Err(Error::Format(
                "compact JWE cannot carry unprotected headers or aad".into(),
            ));
        }
        if self.recipients.len() > 1 {
            if let Some(direct) = self.recipients.iter().find(|r| r.alg.is_direct()) {
                return Err(Error::Format(format!(
                    "{} cannot be used with multiple recipients",
                    direct.alg
                )));
            }
        }
        let zip = self.protected.contains_key("zip")
            || self.unprotected.as_ref().is_some_and(|h| h.contains_key("zip"))
            || self
                .recipients
                .iter()
                .any(|r| r.header.as_ref().is_some_and(|h| h.contains_key("zip")));
        if zip {
            return Err(Error::NotSupported("JWE \"zip\" (Compression Algorithm)".into()));
        }
        Ok(())
    }

    fn seal(&self, plaintext: &[u8], layout: Layout) -> Result<Sealed> {
        self.check_layout(layout)?;
        let enc = self.enc;

        let shared_cek = if self.recipients.len() == 1 && self.recipients[0].alg.is_direct() {
            None
        } else {
            match &self.cek {
                Some(cek) => Some(ContentEncryptionKey::new(cek.clone())),
                None => Some(ContentEncryptionKey::generate(enc)?),
            }
        };

        let mut protected = Header::new();
        if layout != Layout::General {
            protected.insert("alg".into(), Value::String(self.recipients[0].alg.as_str().into()));
        }
        protected.insert("enc".into(), Value::String(enc.as_str().into()));
        for (name, value) in &self.protected {
            if name != "alg" && name != "enc" {
                protected.insert(name.clone(), value.clone());
            }
        }

        let mut cek = None;
        let mut recipient_headers = Vec::with_capacity(self.recipients.len());
        let mut encrypted_keys = Vec::with_capacity(self.recipients.len());
        for recipient in &self.recipients {
            let result = derive_for_encryption(
                recipient.alg,
                enc,
                recipient.key,
                shared_cek.as_ref().map(ContentEncryptionKey::as_bytes),
                &recipient.params,
            )?;

            let mut header = recipient.header.clone();
            if layout == Layout::General {
                let mut per_recipient = Header::new();
                per_recipient.insert("alg".into(), Value::String(recipient.alg.as_str().into()));
                per_recipient.extend(result.header_additions);
                if let Some(extra) = header.take() {
                    for (name, value) in extra {
                        if name != "alg" {
                            per_recipient.insert(name, value);
                        }
                    }
                }
                header = Some(per_recipient);
            } else {
                protected.extend(result.header_additions);
            }

            recipient_headers.push(header);
            encrypted_keys.push(result.encrypted_key);
            cek.get_or_insert(result.cek);
        }
        let cek = cek.ok_or_else(|| Error::Format("JWE requires at least one recipient".into()))?;

        for header in &recipient_headers {
            join_headers(&[Some(&protected), self.unprotected.as_ref(), header.as_ref()])?;
        }

        let protected = b64_encode(serde_json::to_vec(&protected)?);
        let aad = self.aad.as_ref().map(b64_encode);
        let aad_bytes = message::additional_authenticated_data(&protected, aad.as_deref());
        let sealed = match &self.iv {
            Some(iv) => seal_with_iv(enc, cek.as_bytes(), iv, plaintext, &aad_bytes)?,
            None => seal(enc, cek.as_bytes(), plaintext, &aad_bytes)?,
        };
        debug!(enc = %enc, recipients = self.recipients.len(), "sealed JWE");

        Ok(Sealed {
            protected,
            recipients: recipient_headers
                .into_iter()
                .zip(encrypted_keys)
                .map(|(header, encrypted_key)| JweRecipient {
                    header,
                    encrypted_key: encrypted_key.map(b64_encode),
                })
                .collect(),
            aad,
            iv: b64_encode(sealed.iv),
            ciphertext: b64_encode(sealed.ciphertext),
            tag: b64_encode(sealed.tag),
        })
    }
}

/// Encrypts `plaintext` to a single key in the compact serialization.
///
/// # Errors
/// See [`JweBuilder::encrypt_compact`].
pub fn encrypt_compact(
    plaintext: &[u8],
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    key: &KeyHandle,
) -> Result<String> {
    JweBuilder::new(enc)
        .add_recipient(Recipient::new(alg, key))
        .encrypt_compact(plaintext)
}

/// Result of a successful decryption.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedJwe {
    /// The plaintext
    pub plaintext: Vec<u8>,
    /// The key management algorithm used
    pub alg: KeyManagementAlgorithm,
    /// The content encryption algorithm used
    pub enc: ContentEncryptionAlgorithm,
    /// The protected header
    pub protected_header: Option<Header>,
    /// Shared and per-recipient unprotected headers, joined
    pub unprotected_header: Option<Header>,
    /// The decoded `aad` member
    pub aad: Option<Vec<u8>>,
}

fn recipient_unprotected(
    decoded: &DecodedJwe,
    recipient: &DecodedRecipient,
) -> Result<Option<Header>> {
    match (&decoded.unprotected, &recipient.header) {
        (None, None) => Ok(None),
        (shared, own) => join_headers(&[shared.as_ref(), own.as_ref()]).map(Some),
    }
}

fn validate_recipient(
    decoded: &DecodedJwe,
    recipient: &DecodedRecipient,
    policy: &JwePolicy,
) -> Result<(ValidatedJweHeader, Option<Header>)> {
    let unprotected = recipient_unprotected(decoded, recipient)?;
    let validated = validate_jwe_header(
        decoded.protected_header.as_ref(),
        unprotected.as_ref(),
        policy,
    )?;
    if validated.header.contains_key("zip") {
        return Err(Error::NotSupported("JWE \"zip\" (Compression Algorithm)".into()));
    }
    Ok((validated, unprotected))
}

fn open_recipient(
    decoded: &DecodedJwe,
    recipient: &DecodedRecipient,
    key: &KeyHandle,
    policy: &JwePolicy,
    options: &DecryptOptions,
) -> Result<DecryptedJwe> {
    let (validated, unprotected) = validate_recipient(decoded, recipient, policy)?;
    let ValidatedJweHeader { alg, enc, header, .. } = validated;
    debug!(alg = %alg, enc = %enc, "decrypting JWE");

    let cek = recover_for_decryption(alg, enc, key, &recipient.encrypted_key, &header, options)?;
    let plaintext = open(
        enc,
        cek.as_bytes(),
        &decoded.ciphertext,
        &decoded.iv,
        &decoded.tag,
        &decoded.additional_authenticated_data(),
    )?;

    let aad = match &decoded.aad {
        Some(aad) => Some(crate::utils::b64_decode(aad, "aad")?),
        None => None,
    };
    Ok(DecryptedJwe {
        plaintext,
        alg,
        enc,
        protected_header: decoded.protected_header.clone(),
        unprotected_header: unprotected,
        aad,
    })
}

/// Decrypts an already decoded JWE with `key`.
///
/// Each recipient is tried in order; the first that decrypts wins. When
/// none does, the error from the last recipient is returned.
///
/// # Errors
/// * `Error::Format` - Malformed header parameters or encrypted key
/// * `Error::Policy` / `Error::NotSupported` - Header rejected
/// * `Error::KeyType` / `Error::UnsupportedKey` - `key` does not fit
/// * `Error::KeyManagement` - The CEK could not be recovered
/// * `Error::Integrity` - Content decryption failed
pub fn decrypt_decoded(
    decoded: &DecodedJwe,
    key: &KeyHandle,
    policy: &JwePolicy,
    options: &DecryptOptions,
) -> Result<DecryptedJwe> {
    let mut last_error = None;
    for recipient in &decoded.recipients {
        match open_recipient(decoded, recipient, key, policy, options) {
            Ok(decrypted) => return Ok(decrypted),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| Error::Format("JWE has no recipients".into())))
}

/// Decrypts a compact JWE.
///
/// # Errors
/// See [`decrypt_decoded`].
pub fn decrypt_compact(
    jwe: &str,
    key: &KeyHandle,
    policy: &JwePolicy,
    options: &DecryptOptions,
) -> Result<DecryptedJwe> {
    let decoded = CompactJwe::parse(jwe)?.decode()?;
    decrypt_decoded(&decoded, key, policy, options)
}

/// Decrypts a flattened JSON JWE.
///
/// # Errors
/// See [`decrypt_decoded`].
pub fn decrypt_flattened(
    jwe: &FlattenedJwe,
    key: &KeyHandle,
    policy: &JwePolicy,
    options: &DecryptOptions,
) -> Result<DecryptedJwe> {
    decrypt_decoded(&jwe.decode()?, key, policy, options)
}

/// Decrypts a general JSON JWE.
///
/// # Errors
/// See [`decrypt_decoded`].
pub fn decrypt_general(
    jwe: &GeneralJwe,
    key: &KeyHandle,
    policy: &JwePolicy,
    options: &DecryptOptions,
) -> Result<DecryptedJwe> {
    decrypt_decoded(&jwe.decode()?, key, policy, options)
}

/// Decrypts a compact JWE with a key found by `resolver`.
///
/// The header is validated against `policy` before the resolver is asked.
///
/// # Errors
/// See [`decrypt_decoded`], plus whatever the resolver returns.
pub async fn decrypt_compact_with<R>(
    jwe: &str,
    resolver: &R,
    policy: &JwePolicy,
    options: &DecryptOptions,
) -> Result<DecryptedJwe>
where
    R: KeyResolver + ?Sized,
{
    let decoded = CompactJwe::parse(jwe)?.decode()?;
    let recipient = decoded
        .recipients
        .first()
        .ok_or_else(|| Error::Format("JWE has no recipients".into()))?;
    let (validated, _) = validate_recipient(&decoded, recipient, policy)?;
    let selector =
        KeySelector::from_header(&validated.header, validated.alg.as_str(), KeyUse::Encryption);
    let key = resolver.resolve_key(&selector).await?;
    open_recipient(&decoded, recipient, &key, policy, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwe::rsa_oaep::test_key;
    use crate::utils::b64_decode;
    use pretty_assertions::assert_eq;
    use rand_core::OsRng;
    use serde_json::json;

    fn policy() -> JwePolicy {
        JwePolicy::new(KeyManagementAlgorithm::ALL, ContentEncryptionAlgorithm::ALL)
    }

    fn header(value: Value) -> Header {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_rfc7516_a3_decrypt() {
        let jwe = "eyJhbGciOiJBMTI4S1ciLCJlbmMiOiJBMTI4Q0JDLUhTMjU2In0.\
            6KB707dM9YTIgHtLvtgWQ8mKwboJW3of9locizkDTHzBC2IlrT1oOQ.\
            AxY8DCtDaGlsbGljb3RoZQ.\
            KDlTtXchhZTGufMYmOYGS4HffxPSUrfmqCHXaI9wOGY.\
            U0m_YmjN04DJvceFICbCVQ";
        let key = KeyHandle::secret(b64_decode("GawgguFyGrWKav7AX4VKUg", "k").unwrap());
        let decrypted = decrypt_compact(jwe, &key, &policy(), &DecryptOptions::default()).unwrap();
        assert_eq!(decrypted.plaintext, b"Live long and prosper.");
        assert_eq!(decrypted.alg, KeyManagementAlgorithm::AesKw(AesKeySize::A128));
        assert_eq!(decrypted.enc, ContentEncryptionAlgorithm::A128CbcHs256);
    }

    #[test]
    fn test_compact_round_trip_every_enc() {
        let key = KeyHandle::secret(vec![4; 32]);
        for enc in ContentEncryptionAlgorithm::ALL {
            let alg = KeyManagementAlgorithm::AesKw(AesKeySize::A256);
            let jwe = encrypt_compact(b"payload", alg, enc, &key).unwrap();
            let decrypted = decrypt_compact(&jwe, &key, &policy(), &DecryptOptions::default()).unwrap();
            assert_eq!(decrypted.plaintext, b"payload", "{enc}");
        }
    }

    /// (encryption key, decryption key) pairs usable with `alg` and `enc`.
    fn key_pairs(
        alg: KeyManagementAlgorithm,
        enc: ContentEncryptionAlgorithm,
    ) -> Vec<(KeyHandle, KeyHandle)> {
        let symmetric = |len: usize| {
            let key = KeyHandle::secret(vec![0x42; len]);
            vec![(key.clone(), key)]
        };
        let asymmetric = |private: KeyHandle| (private.to_public().unwrap(), private);
        match alg {
            KeyManagementAlgorithm::Dir => symmetric(enc.cek_len()),
            KeyManagementAlgorithm::AesKw(size) | KeyManagementAlgorithm::AesGcmKw(size) => {
                symmetric(size.key_len())
            }
            KeyManagementAlgorithm::Pbes2(_) => symmetric(12),
            KeyManagementAlgorithm::EcdhEs | KeyManagementAlgorithm::EcdhEsAesKw(_) => vec![
                asymmetric(KeyHandle::from(x25519_dalek::StaticSecret::random_from_rng(OsRng))),
                asymmetric(KeyHandle::from(p256::SecretKey::random(&mut OsRng))),
                asymmetric(KeyHandle::from(p384::SecretKey::random(&mut OsRng))),
                asymmetric(KeyHandle::from(p521::SecretKey::random(&mut OsRng))),
            ],
            KeyManagementAlgorithm::RsaOaep(_) => vec![asymmetric(KeyHandle::from(test_key()))],
        }
    }

    #[test]
    fn test_every_alg_enc_and_key_round_trips() {
        let mut combinations = 0;
        for alg in KeyManagementAlgorithm::ALL {
            for enc in ContentEncryptionAlgorithm::ALL {
                for (encrypt_key, decrypt_key) in key_pairs(alg, enc) {
                    let jwe = encrypt_compact(b"matrix", alg, enc, &encrypt_key)
                        .unwrap_or_else(|e| panic!("{alg} {enc} encrypt: {e}"));
                    let decrypted =
                        decrypt_compact(&jwe, &decrypt_key, &policy(), &DecryptOptions::default())
                            .unwrap_or_else(|e| panic!("{alg} {enc} decrypt: {e}"));
                    assert_eq!(decrypted.plaintext, b"matrix", "{alg} {enc}");
                    assert_eq!((decrypted.alg, decrypted.enc), (alg, enc));
                    combinations += 1;
                }
            }
        }
        assert_eq!(combinations, 174);
    }

    #[test]
    fn test_compact_protected_header_carries_additions() {
        let private = KeyHandle::from(p256::SecretKey::random(&mut OsRng));
        let public = private.to_public().unwrap();
        let mut extra = Header::new();
        extra.insert("kid".into(), json!("recipient-1"));
        let jwe = JweBuilder::new(ContentEncryptionAlgorithm::A128Gcm)
            .protected_header(extra)
            .add_recipient(Recipient::new(KeyManagementAlgorithm::EcdhEs, &public))
            .encrypt_compact(b"agreed")
            .unwrap();

        let decoded = CompactJwe::parse(&jwe).unwrap().decode().unwrap();
        let protected = decoded.protected_header.as_ref().unwrap();
        assert_eq!(protected["alg"], "ECDH-ES");
        assert_eq!(protected["kid"], "recipient-1");
        assert!(protected.contains_key("epk"));
        assert!(decoded.recipients[0].encrypted_key.is_empty());

        let decrypted = decrypt_compact(&jwe, &private, &policy(), &DecryptOptions::default()).unwrap();
        assert_eq!(decrypted.plaintext, b"agreed");
    }

    #[test]
    fn test_flattened_with_aad_and_unprotected() {
        let key = KeyHandle::secret(vec![8; 16]);
        let jwe = JweBuilder::new(ContentEncryptionAlgorithm::A128CbcHs256)
            .shared_unprotected_header(header(json!({"jku": "https://example.com/keys"})))
            .aad(b"extra".to_vec())
            .add_recipient(
                Recipient::new(KeyManagementAlgorithm::AesGcmKw(AesKeySize::A128), &key)
                    .with_header(header(json!({"kid": "7"}))),
            )
            .encrypt_flattened(b"flat")
            .unwrap();
        assert_eq!(jwe.header.as_ref().unwrap()["kid"], "7");
        assert_eq!(jwe.aad.as_deref(), Some("ZXh0cmE"));

        let parsed = FlattenedJwe::from_json(&jwe.to_json().unwrap()).unwrap();
        let decrypted = decrypt_flattened(&parsed, &key, &policy(), &DecryptOptions::default()).unwrap();
        assert_eq!(decrypted.plaintext, b"flat");
        assert_eq!(decrypted.aad.as_deref(), Some(&b"extra"[..]));
        let unprotected = decrypted.unprotected_header.unwrap();
        assert_eq!(unprotected["kid"], "7");
        assert_eq!(unprotected["jku"], "https://example.com/keys");

        let mut tampered = parsed;
        tampered.aad = Some(b64_encode(b"other"));
        assert!(matches!(
            decrypt_flattened(&tampered, &key, &policy(), &DecryptOptions::default()),
            Err(Error::Integrity)
        ));
    }

    #[test]
    fn test_general_multi_recipient_shares_cek() {
        let kw = KeyHandle::secret(vec![1; 16]);
        let rsa_private = KeyHandle::from(test_key());
        let rsa_public = rsa_private.to_public().unwrap();
        let ec_private = KeyHandle::from(x25519_dalek::StaticSecret::random_from_rng(OsRng));
        let ec_public = ec_private.to_public().unwrap();

        let jwe = JweBuilder::new(ContentEncryptionAlgorithm::A256Gcm)
            .add_recipient(Recipient::new(KeyManagementAlgorithm::AesKw(AesKeySize::A128), &kw))
            .add_recipient(Recipient::new(KeyManagementAlgorithm::RsaOaep(OaepDigest::Sha256), &rsa_public))
            .add_recipient(Recipient::new(KeyManagementAlgorithm::EcdhEsAesKw(AesKeySize::A256), &ec_public))
            .encrypt_general(b"shared")
            .unwrap();
        assert_eq!(jwe.recipients.len(), 3);
        assert_eq!(jwe.recipients[1].header.as_ref().unwrap()["alg"], "RSA-OAEP-256");

        let parsed = GeneralJwe::from_json(&jwe.to_json().unwrap()).unwrap();
        for key in [&kw, &rsa_private, &ec_private] {
            let decrypted = decrypt_general(&parsed, key, &policy(), &DecryptOptions::default()).unwrap();
            assert_eq!(decrypted.plaintext, b"shared");
        }

        let stranger = KeyHandle::secret(vec![2; 16]);
        assert!(decrypt_general(&parsed, &stranger, &policy(), &DecryptOptions::default()).is_err());
    }

    #[test]
    fn test_direct_modes_are_single_recipient() {
        let key = KeyHandle::secret(vec![1; 32]);
        let other = KeyHandle::secret(vec![2; 16]);
        let result = JweBuilder::new(ContentEncryptionAlgorithm::A256Gcm)
            .add_recipient(Recipient::new(KeyManagementAlgorithm::Dir, &key))
            .add_recipient(Recipient::new(KeyManagementAlgorithm::AesKw(AesKeySize::A128), &other))
            .encrypt_general(b"x");
        assert!(matches!(result, Err(Error::Format(_))));

        let result = JweBuilder::new(ContentEncryptionAlgorithm::A256Gcm)
            .add_recipient(Recipient::new(KeyManagementAlgorithm::AesKw(AesKeySize::A128), &other))
            .add_recipient(Recipient::new(KeyManagementAlgorithm::AesKw(AesKeySize::A128), &other))
            .encrypt_compact(b"x");
        assert!(matches!(result, Err(Error::Format(_))));

        let result = JweBuilder::new(ContentEncryptionAlgorithm::A256Gcm).encrypt_general(b"x");
        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn test_zip_is_not_supported() {
        let key = KeyHandle::secret(vec![1; 32]);
        let result = JweBuilder::new(ContentEncryptionAlgorithm::A256Gcm)
            .protected_header(header(json!({"zip": "DEF"})))
            .add_recipient(Recipient::new(KeyManagementAlgorithm::Dir, &key))
            .encrypt_compact(b"x");
        assert!(matches!(result, Err(Error::NotSupported(_))));

        // eyJhbGciOiJkaXIiLCJlbmMiOiJBMjU2R0NNIiwiemlwIjoiREVGIn0 = {"alg":"dir","enc":"A256GCM","zip":"DEF"}
        let jwe = "eyJhbGciOiJkaXIiLCJlbmMiOiJBMjU2R0NNIiwiemlwIjoiREVGIn0..AAAAAAAAAAAAAAAA.AA.AAAAAAAAAAAAAAAAAAAAAA";
        assert!(matches!(
            decrypt_compact(jwe, &key, &policy(), &DecryptOptions::default()),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_fixed_cek_and_iv() {
        let key = KeyHandle::secret(vec![3; 16]);
        let build = || {
            JweBuilder::new(ContentEncryptionAlgorithm::A128Gcm)
                .content_encryption_key(vec![7; 16])
                .iv(vec![0; 12])
                .add_recipient(Recipient::new(KeyManagementAlgorithm::AesKw(AesKeySize::A128), &key))
                .encrypt_compact(b"deterministic")
                .unwrap()
        };
        assert_eq!(build(), build());
    }

    #[tokio::test]
    async fn test_decrypt_with_resolver() {
        let key = KeyHandle::secret(vec![6; 32]);
        let jwe = encrypt_compact(
            b"resolved",
            KeyManagementAlgorithm::Dir,
            ContentEncryptionAlgorithm::A256Gcm,
            &key,
        )
        .unwrap();
        let decrypted = decrypt_compact_with(&jwe, &key, &policy(), &DecryptOptions::default())
            .await
            .unwrap();
        assert_eq!(decrypted.plaintext, b"resolved");
    }
}
