//! End-to-end tests across policy, key management, content encryption and
//! serialization.

use proptest::prelude::*;
use rand_core::OsRng;
use serde_json::json;

use crate::error::Error;
use crate::jwe::key_management::primitive_calls;
use crate::jwe::rsa_oaep::test_key;
use crate::jwe::{
    decrypt_compact, encrypt_compact, open, seal, AesKeySize, CompactJwe,
    ContentEncryptionAlgorithm, DecryptOptions, Header, JweBuilder, KeyManagementAlgorithm,
    KeyManagementParams, OaepDigest, Recipient,
};
use crate::key::{Jwk, KeyHandle};
use crate::policy::JwePolicy;
use crate::utils::b64_decode;

fn accept_all() -> JwePolicy {
    JwePolicy::new(KeyManagementAlgorithm::ALL, ContentEncryptionAlgorithm::ALL)
}

#[test]
fn test_dir_a256gcm_hello() {
    let key = KeyHandle::secret(vec![0x11; 32]);
    let jwe = encrypt_compact(
        b"hello",
        KeyManagementAlgorithm::Dir,
        ContentEncryptionAlgorithm::A256Gcm,
        &key,
    )
    .unwrap();
    assert_eq!(jwe.split('.').nth(1), Some(""));

    let policy = JwePolicy::new(
        [KeyManagementAlgorithm::Dir],
        [ContentEncryptionAlgorithm::A256Gcm],
    );
    let decrypted = decrypt_compact(&jwe, &key, &policy, &DecryptOptions::default()).unwrap();
    assert_eq!(decrypted.plaintext, b"hello");
}

#[test]
fn test_pbes2_password() {
    let alg = KeyManagementAlgorithm::Pbes2(AesKeySize::A256);
    let enc = ContentEncryptionAlgorithm::A256CbcHs512;
    let correct = KeyHandle::secret(b"correct".to_vec());
    let wrong = KeyHandle::secret(b"wrong".to_vec());
    let jwe = encrypt_compact(b"secret message", alg, enc, &correct).unwrap();

    let options = DecryptOptions {
        max_pbes2_count: 10_000_000,
    };
    let decrypted = decrypt_compact(&jwe, &correct, &accept_all(), &options).unwrap();
    assert_eq!(decrypted.plaintext, b"secret message");

    assert!(matches!(
        decrypt_compact(&jwe, &wrong, &accept_all(), &options),
        Err(Error::KeyManagement)
    ));
}

#[test]
fn test_pbes2_count_above_limit_is_refused_before_derivation() {
    let key = KeyHandle::secret(b"correct".to_vec());
    let jwe = JweBuilder::new(ContentEncryptionAlgorithm::A128Gcm)
        .add_recipient(
            Recipient::new(KeyManagementAlgorithm::Pbes2(AesKeySize::A128), &key).with_params(
                KeyManagementParams {
                    p2c: Some(10_001),
                    ..KeyManagementParams::default()
                },
            ),
        )
        .encrypt_compact(b"x")
        .unwrap();

    primitive_calls::reset();
    assert!(matches!(
        decrypt_compact(&jwe, &key, &accept_all(), &DecryptOptions::default()),
        Err(Error::Policy(_))
    ));
    assert_eq!(primitive_calls::calls(), 0);
}

#[test]
fn test_algorithm_confusion_through_envelope() {
    let rsa_private = KeyHandle::from(test_key());
    let rsa_public = rsa_private.to_public().unwrap();
    let ec_private = KeyHandle::from(p256::SecretKey::random(&mut OsRng));
    let ec_public = ec_private.to_public().unwrap();
    let enc = ContentEncryptionAlgorithm::A128Gcm;

    let to_rsa = encrypt_compact(b"x", KeyManagementAlgorithm::RsaOaep(OaepDigest::Sha256), enc, &rsa_public)
        .unwrap();
    let to_ec = encrypt_compact(b"x", KeyManagementAlgorithm::EcdhEs, enc, &ec_public).unwrap();

    primitive_calls::reset();
    assert!(matches!(
        decrypt_compact(&to_rsa, &ec_private, &accept_all(), &DecryptOptions::default()),
        Err(Error::KeyType(_))
    ));
    assert!(matches!(
        decrypt_compact(&to_ec, &rsa_private, &accept_all(), &DecryptOptions::default()),
        Err(Error::KeyType(_))
    ));
    assert!(matches!(
        encrypt_compact(b"x", KeyManagementAlgorithm::RsaOaep(OaepDigest::Sha256), enc, &ec_public),
        Err(Error::KeyType(_))
    ));
    assert!(matches!(
        encrypt_compact(b"x", KeyManagementAlgorithm::EcdhEs, enc, &rsa_public),
        Err(Error::KeyType(_))
    ));
    assert_eq!(primitive_calls::calls(), 0);
}

#[test]
fn test_unknown_critical_header_fails_closed() {
    let key = KeyHandle::secret(vec![0x22; 32]);
    let mut protected = Header::new();
    protected.insert("crit".into(), json!(["unknownField"]));
    protected.insert("unknownField".into(), json!("anything"));
    let jwe = JweBuilder::new(ContentEncryptionAlgorithm::A256Gcm)
        .protected_header(protected)
        .add_recipient(Recipient::new(KeyManagementAlgorithm::Dir, &key))
        .encrypt_compact(b"x")
        .unwrap();

    primitive_calls::reset();
    assert!(matches!(
        decrypt_compact(&jwe, &key, &accept_all(), &DecryptOptions::default()),
        Err(Error::Policy(_))
    ));
    assert_eq!(primitive_calls::calls(), 0);

    let policy = accept_all().with_critical("unknownField");
    assert!(decrypt_compact(&jwe, &key, &policy, &DecryptOptions::default()).is_ok());
}

#[test]
fn test_jwk_import_round_trip() {
    let jwk: Jwk = serde_json::from_value(json!({
        "kty": "oct",
        "kid": "7",
        "alg": "A128KW",
        "k": "GawgguFyGrWKav7AX4VKUg"
    }))
    .unwrap();
    let key = jwk.to_key().unwrap();
    assert!(!key.is_extractable());

    let jwe = encrypt_compact(
        b"bound",
        KeyManagementAlgorithm::AesKw(AesKeySize::A128),
        ContentEncryptionAlgorithm::A128CbcHs256,
        &key,
    )
    .unwrap();
    let decrypted = decrypt_compact(&jwe, &key, &accept_all(), &DecryptOptions::default()).unwrap();
    assert_eq!(decrypted.plaintext, b"bound");

    // bound to A128KW, so A128GCMKW is refused
    assert!(matches!(
        encrypt_compact(
            b"bound",
            KeyManagementAlgorithm::AesGcmKw(AesKeySize::A128),
            ContentEncryptionAlgorithm::A128CbcHs256,
            &key,
        ),
        Err(Error::KeyType(_))
    ));
}

#[test]
fn test_tampered_compact_parts() {
    let key = KeyHandle::secret(vec![0x33; 16]);
    let jwe = encrypt_compact(
        b"integrity",
        KeyManagementAlgorithm::AesKw(AesKeySize::A128),
        ContentEncryptionAlgorithm::A128CbcHs256,
        &key,
    )
    .unwrap();
    let parts = CompactJwe::parse(&jwe).unwrap();

    let mut tag = b64_decode(&parts.tag, "tag").unwrap();
    tag[0] ^= 0x80;
    let tampered = CompactJwe {
        tag: crate::utils::b64_encode(tag),
        ..parts.clone()
    };
    assert!(matches!(
        decrypt_compact(&tampered.to_string(), &key, &accept_all(), &DecryptOptions::default()),
        Err(Error::Integrity)
    ));

    let mut encrypted_key = b64_decode(&parts.encrypted_key, "encrypted_key").unwrap();
    encrypted_key[5] ^= 1;
    let tampered = CompactJwe {
        encrypted_key: crate::utils::b64_encode(encrypted_key),
        ..parts
    };
    assert!(matches!(
        decrypt_compact(&tampered.to_string(), &key, &accept_all(), &DecryptOptions::default()),
        Err(Error::KeyManagement)
    ));
}

fn enc_strategy() -> impl Strategy<Value = ContentEncryptionAlgorithm> {
    prop::sample::select(ContentEncryptionAlgorithm::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Flipping any single bit of ciphertext, tag, IV or AAD fails open.
    #[test]
    fn prop_bit_flip_is_detected(
        enc in enc_strategy(),
        plaintext in prop::collection::vec(any::<u8>(), 1..64),
        aad in prop::collection::vec(any::<u8>(), 1..32),
        field in 0usize..4,
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let cek = vec![0x5a; enc.cek_len()];
        let sealed = seal(enc, &cek, &plaintext, &aad).unwrap();
        let (mut ciphertext, mut iv, mut tag, mut aad) =
            (sealed.ciphertext, sealed.iv, sealed.tag, aad);

        let target = match field {
            0 => &mut ciphertext,
            1 => &mut tag,
            2 => &mut iv,
            _ => &mut aad,
        };
        let index = position.index(target.len());
        target[index] ^= 1 << bit;

        prop_assert!(matches!(
            open(enc, &cek, &ciphertext, &iv, &tag, &aad),
            Err(Error::Integrity)
        ));
    }
}
