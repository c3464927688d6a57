//! Key selection inside a JWK Set.
//!
//! A JWK is a candidate when its `kty` (and `crv`, for ECDSA) fits the
//! requested algorithm, its `kid` matches the selector's, and its `alg`,
//! `use` and `key_ops`, when present, allow the operation. Exactly one
//! candidate must remain.

use jose_envelope_core::error::{Error, Result};
use jose_envelope_core::jwe::{EcdhCurve, KeyManagementAlgorithm};
use jose_envelope_core::jws::SignatureAlgorithm;
use jose_envelope_core::key::{ImportOptions, Jwk, KeyFamily, KeyHandle, KeyUse};
use jose_envelope_core::resolver::KeySelector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A JSON Web Key Set document (RFC 7517 section 5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwkSet {
    /// The keys
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Interprets a fetched JSON document as a JWK Set.
    ///
    /// Entries that are objects but not usable JWKs (no `kty`, wrongly
    /// typed members) are skipped so the remaining keys stay reachable.
    ///
    /// # Errors
    /// * `Error::Jose` - If the document is not `{"keys": [ {..}, .. ]}`
    pub fn from_value(value: Value) -> Result<Self> {
        let Some(Value::Array(entries)) = value.get("keys") else {
            return Err(Error::Jose("JSON Web Key Set malformed".into()));
        };
        if !entries.iter().all(Value::is_object) {
            return Err(Error::Jose("JSON Web Key Set malformed".into()));
        }

        let keys = entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match Jwk::deserialize(entry) {
                Ok(jwk) => Some(jwk),
                Err(e) => {
                    debug!(index, "skipping unusable JWK Set entry: {e}");
                    None
                }
            })
            .collect();
        Ok(Self { keys })
    }
}

struct Requirements {
    families: &'static [KeyFamily],
    curve: Option<EcdhCurve>,
    key_ops: &'static [&'static str],
    key_use: KeyUse,
}

fn requirements(selector: &KeySelector) -> Result<Requirements> {
    match selector.key_use {
        KeyUse::Signature => {
            let alg: SignatureAlgorithm = selector.alg.parse()?;
            let families: &'static [KeyFamily] = match alg.key_family() {
                KeyFamily::Oct => &[KeyFamily::Oct],
                _ => &[KeyFamily::Ec],
            };
            Ok(Requirements {
                families,
                curve: alg.curve(),
                key_ops: &["verify"],
                key_use: KeyUse::Signature,
            })
        }
        KeyUse::Encryption => {
            let alg: KeyManagementAlgorithm = selector.alg.parse()?;
            Ok(Requirements {
                families: alg.key_families(),
                curve: None,
                key_ops: &["decrypt", "unwrapKey", "deriveKey", "deriveBits"],
                key_use: KeyUse::Encryption,
            })
        }
    }
}

fn family_of(kty: &str) -> Option<KeyFamily> {
    match kty {
        "oct" => Some(KeyFamily::Oct),
        "RSA" => Some(KeyFamily::Rsa),
        "EC" => Some(KeyFamily::Ec),
        "OKP" => Some(KeyFamily::Okp),
        _ => None,
    }
}

fn is_candidate(jwk: &Jwk, selector: &KeySelector, required: &Requirements) -> bool {
    let family_fits = family_of(&jwk.kty).is_some_and(|family| required.families.contains(&family));
    let curve_fits = required
        .curve
        .map_or(true, |curve| jwk.crv.as_deref() == Some(curve.as_str()));
    let kid_fits = selector
        .kid
        .as_ref()
        .map_or(true, |kid| jwk.kid.as_ref() == Some(kid));
    let alg_fits = jwk.alg.as_ref().map_or(true, |alg| *alg == selector.alg);
    let use_fits = jwk.key_use.as_deref().map_or(true, |key_use| {
        key_use
            == match required.key_use {
                KeyUse::Signature => "sig",
                KeyUse::Encryption => "enc",
            }
    });
    let ops_fit = jwk.key_ops.as_ref().map_or(true, |ops| {
        ops.iter().any(|op| required.key_ops.contains(&op.as_str()))
    });

    family_fits && curve_fits && kid_fits && alg_fits && use_fits && ops_fit
}

/// Selects and imports the single key matching `selector`.
///
/// # Errors
/// * `Error::NotSupported` - The selector names an unknown algorithm
/// * `Error::NoMatchingKey` - No key matches
/// * `Error::MultipleMatchingKeys` - More than one key matches
/// * Any error from [`Jwk::import`]
pub fn select_key(jwks: &JwkSet, selector: &KeySelector) -> Result<KeyHandle> {
    let required = requirements(selector)?;
    let mut candidates = jwks
        .keys
        .iter()
        .filter(|jwk| is_candidate(jwk, selector, &required));

    let jwk = candidates.next().ok_or(Error::NoMatchingKey)?;
    if candidates.next().is_some() {
        return Err(Error::MultipleMatchingKeys);
    }
    debug!(kid = ?jwk.kid, alg = %selector.alg, "selected key from JWK Set");
    jwk.import(&ImportOptions::for_jwk(jwk).with_algorithm(selector.alg.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn jwks() -> JwkSet {
        JwkSet::from_value(json!({
            "keys": [
                {
                    "kty": "EC",
                    "kid": "p256-sig",
                    "use": "sig",
                    "crv": "P-256",
                    "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
                    "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"
                },
                {
                    "kty": "oct",
                    "kid": "hmac",
                    "alg": "HS256",
                    "k": "AyM1SysPpbyDfgZld3umj1qzKObwVMkoqQ-EstJQLr_T-1qS0gZH75aKtMN3Yj0iPS4hcgUuTwjAzZr1Z9CAow"
                },
                {
                    "kty": "oct",
                    "kid": "wrap-1",
                    "use": "enc",
                    "k": "GawgguFyGrWKav7AX4VKUg"
                },
                {
                    "kty": "oct",
                    "kid": "wrap-2",
                    "use": "enc",
                    "key_ops": ["unwrapKey"],
                    "k": "GawgguFyGrWKav7AX4VKUg"
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_malformed_documents() {
        for value in [json!([]), json!({}), json!({"keys": {}}), json!({"keys": [1]})] {
            assert!(matches!(JwkSet::from_value(value), Err(Error::Jose(_))));
        }
    }

    #[test]
    fn test_unusable_entries_are_skipped() {
        let set = JwkSet::from_value(json!({
            "keys": [
                {"kty": "oct", "kid": "wrap", "use": "enc", "k": "GawgguFyGrWKav7AX4VKUg"},
                {"kid": "future", "x5c": ["MIIB"]},
                {"kty": "oct", "kid": "odd", "ext": "yes", "k": "AAAA"}
            ]
        }))
        .unwrap();
        assert_eq!(set.keys.len(), 1);

        let key = select_key(&set, &KeySelector::new("A128KW", KeyUse::Encryption).with_kid("wrap"))
            .unwrap();
        assert_eq!(key.algorithm(), Some("A128KW"));
    }

    #[test]
    fn test_select_by_algorithm() {
        let key = select_key(&jwks(), &KeySelector::new("ES256", KeyUse::Signature)).unwrap();
        assert_eq!(key.family(), KeyFamily::Ec);
        assert_eq!(key.curve(), Some(EcdhCurve::P256));
        assert_eq!(key.algorithm(), Some("ES256"));

        let key = select_key(&jwks(), &KeySelector::new("HS256", KeyUse::Signature)).unwrap();
        assert_eq!(key.family(), KeyFamily::Oct);
    }

    #[test]
    fn test_curve_must_match() {
        assert!(matches!(
            select_key(&jwks(), &KeySelector::new("ES384", KeyUse::Signature)),
            Err(Error::NoMatchingKey)
        ));
    }

    #[test]
    fn test_kid_disambiguates() {
        let selector = KeySelector::new("A128KW", KeyUse::Encryption);
        assert!(matches!(
            select_key(&jwks(), &selector),
            Err(Error::MultipleMatchingKeys)
        ));

        let key = select_key(&jwks(), &selector.clone().with_kid("wrap-2")).unwrap();
        assert_eq!(key.algorithm(), Some("A128KW"));

        assert!(matches!(
            select_key(&jwks(), &selector.with_kid("missing")),
            Err(Error::NoMatchingKey)
        ));
    }

    #[test]
    fn test_use_and_alg_filter() {
        // the HS256 key is bound to HS256 and excluded for HS512
        assert!(matches!(
            select_key(&jwks(), &KeySelector::new("HS512", KeyUse::Signature)),
            Err(Error::NoMatchingKey)
        ));

        // "use": "sig" keys never serve decryption
        assert!(matches!(
            select_key(&jwks(), &KeySelector::new("ECDH-ES", KeyUse::Encryption)),
            Err(Error::NoMatchingKey)
        ));
    }

    #[test]
    fn test_key_ops_filter() {
        let set = JwkSet::from_value(json!({
            "keys": [{"kty": "oct", "key_ops": ["sign"], "k": "GawgguFyGrWKav7AX4VKUg"}]
        }))
        .unwrap();
        assert!(matches!(
            select_key(&set, &KeySelector::new("A128KW", KeyUse::Encryption)),
            Err(Error::NoMatchingKey)
        ));
    }

    #[test]
    fn test_unknown_algorithm() {
        assert!(matches!(
            select_key(&jwks(), &KeySelector::new("RS256", KeyUse::Signature)),
            Err(Error::NotSupported(_))
        ));
    }
}
