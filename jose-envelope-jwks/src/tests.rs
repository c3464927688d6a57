//! End-to-end tests against a JWK Set served over HTTP.

use jose_envelope_core::jwe::{
    decrypt_compact_with, encrypt_compact, ContentEncryptionAlgorithm, DecryptOptions, Header,
    KeyManagementAlgorithm,
};
use jose_envelope_core::jws::{verify_compact_with, JwsBuilder, SignatureAlgorithm};
use jose_envelope_core::key::{Jwk, KeyHandle, KeyMaterial};
use jose_envelope_core::policy::{JwePolicy, JwsPolicy};
use jose_envelope_core::Error;
use pretty_assertions::assert_eq;
use rand_core::OsRng;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{RemoteKeySet, RemoteKeySetOptions};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn public_jwk(key: &KeyHandle, kid: &str, key_use: &str) -> Value {
    let Some(public) = key.to_public() else {
        panic!("asymmetric key expected");
    };
    let KeyMaterial::Public(material) = public.material() else {
        panic!("public key expected");
    };
    let mut jwk = Jwk::from_public_key(material).unwrap().with_kid(kid);
    jwk.key_use = Some(key_use.to_string());
    serde_json::to_value(jwk).unwrap()
}

async fn serve(keys: Vec<Value>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_verify_with_remote_key() {
    init_tracing();

    let signing_key = KeyHandle::from(p256::SecretKey::random(&mut OsRng));
    let other_key = KeyHandle::from(p256::SecretKey::random(&mut OsRng));
    let server = serve(vec![
        public_jwk(&signing_key, "current", "sig"),
        public_jwk(&other_key, "previous", "sig"),
    ])
    .await;

    let mut header = Header::new();
    header.insert("kid".into(), json!("current"));
    let token = JwsBuilder::new(SignatureAlgorithm::Es256)
        .protected_header(header)
        .sign_compact(b"remote payload", &signing_key)
        .unwrap();

    let key_set = RemoteKeySet::with_http(RemoteKeySetOptions::default()).unwrap();
    let resolver = key_set.resolver(format!("{}/.well-known/jwks.json", server.uri()));
    let policy = JwsPolicy::new([SignatureAlgorithm::Es256]);

    let verified = verify_compact_with(&token, &resolver, &policy).await.unwrap();
    assert_eq!(verified.payload, b"remote payload");
    assert_eq!(verified.alg, SignatureAlgorithm::Es256);
}

#[tokio::test]
async fn test_verify_without_kid_is_ambiguous() {
    init_tracing();

    let signing_key = KeyHandle::from(p256::SecretKey::random(&mut OsRng));
    let other_key = KeyHandle::from(p256::SecretKey::random(&mut OsRng));
    let server = serve(vec![
        public_jwk(&signing_key, "current", "sig"),
        public_jwk(&other_key, "previous", "sig"),
    ])
    .await;

    let token = JwsBuilder::new(SignatureAlgorithm::Es256)
        .sign_compact(b"remote payload", &signing_key)
        .unwrap();

    let key_set = RemoteKeySet::with_http(RemoteKeySetOptions::default()).unwrap();
    let resolver = key_set.resolver(format!("{}/.well-known/jwks.json", server.uri()));
    let policy = JwsPolicy::new([SignatureAlgorithm::Es256]);

    assert!(matches!(
        verify_compact_with(&token, &resolver, &policy).await,
        Err(Error::MultipleMatchingKeys)
    ));
}

#[tokio::test]
async fn test_decrypt_with_published_key_is_refused() {
    init_tracing();

    let recipient_key = KeyHandle::from(p256::SecretKey::random(&mut OsRng));
    let Some(encryption_key) = recipient_key.to_public() else {
        panic!("asymmetric key expected");
    };
    let token = encrypt_compact(
        b"for the key holder",
        KeyManagementAlgorithm::EcdhEs,
        ContentEncryptionAlgorithm::A256Gcm,
        &encryption_key,
    )
    .unwrap();

    // JWK Sets publish public halves, which cannot decrypt
    let server = serve(vec![public_jwk(&recipient_key, "enc-1", "enc")]).await;

    let key_set = RemoteKeySet::with_http(RemoteKeySetOptions::default()).unwrap();
    let resolver = key_set.resolver(format!("{}/.well-known/jwks.json", server.uri()));
    let policy = JwePolicy::new(
        [KeyManagementAlgorithm::EcdhEs],
        [ContentEncryptionAlgorithm::A256Gcm],
    );

    assert!(matches!(
        decrypt_compact_with(&token, &resolver, &policy, &DecryptOptions::default()).await,
        Err(Error::KeyType(_))
    ));
}

#[tokio::test]
async fn test_unreachable_issuer() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let key_set = RemoteKeySet::with_http(RemoteKeySetOptions::default()).unwrap();
    let token = JwsBuilder::new(SignatureAlgorithm::Hs256)
        .sign_compact(b"x", &KeyHandle::secret(vec![7; 32]))
        .unwrap();
    let policy = JwsPolicy::new([SignatureAlgorithm::Hs256]);

    assert!(matches!(
        verify_compact_with(&token, &key_set.resolver(server.uri()), &policy).await,
        Err(Error::Jose(_))
    ));
}
