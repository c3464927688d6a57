//! JSON Web Key import and public key export.

use std::fmt;

use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{KeyHandle, KeyUse, PrivateKeyMaterial, PublicKeyMaterial};
use crate::error::{Error, Result, UnsupportedKey};
use crate::jwe::EcdhCurve;
use crate::utils::{b64_decode, b64_encode};

/// A JSON Web Key (RFC 7517).
///
/// Every parameter except `kty` is optional on the wire; which ones are
/// required depends on the key type and is checked by [`Jwk::import`].
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type
    pub kty: String,
    /// Key ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Algorithm the key is intended for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Public key use
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Key operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
    /// Extractable flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    /// Curve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate or OKP public key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// RSA modulus
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA public exponent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// Private exponent or scalar
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    /// RSA first prime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    /// RSA second prime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// RSA first CRT exponent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    /// RSA second CRT exponent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    /// RSA CRT coefficient
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    /// RSA other primes info
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oth: Option<Value>,
    /// Symmetric key value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("use", &self.key_use)
            .field("crv", &self.crv)
            .field("private", &(self.d.is_some() || self.k.is_some()))
            .finish_non_exhaustive()
    }
}

/// Options for [`Jwk::import`].
///
/// Build it with [`ImportOptions::for_jwk`] so the defaults are resolved
/// against the key being imported.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Produce a non-extractable handle for `oct` keys.
    pub force_key_object_for_symmetric: bool,
    /// Bind the handle to this algorithm instead of the JWK's `alg`.
    pub algorithm_override: Option<String>,
}

impl ImportOptions {
    /// Default options for `jwk`: symmetric keys are non-extractable unless
    /// the JWK says `"ext": true`.
    #[must_use]
    pub fn for_jwk(jwk: &Jwk) -> Self {
        Self {
            force_key_object_for_symmetric: jwk.ext != Some(true),
            algorithm_override: None,
        }
    }

    /// Binds imported handles to `alg`.
    #[must_use]
    pub fn with_algorithm(mut self, alg: impl Into<String>) -> Self {
        self.algorithm_override = Some(alg.into());
        self
    }
}

impl Jwk {
    /// Imports the JWK as a key handle.
    ///
    /// # Errors
    /// * `Error::UnsupportedKey` - Multi-prime RSA, an unknown curve or an unknown `kty`
    /// * `Error::Format` - Missing or malformed parameters
    pub fn import(&self, options: &ImportOptions) -> Result<KeyHandle> {
        let key_use = match self.key_use.as_deref() {
            None => None,
            Some("sig") => Some(KeyUse::Signature),
            Some("enc") => Some(KeyUse::Encryption),
            Some(other) => {
                return Err(Error::Format(format!("invalid \"use\" value: {other}")));
            }
        };

        let mut handle = match self.kty.as_str() {
            "oct" => {
                let k = self.required("k")?;
                let bytes = b64_decode(k, "JWK \"k\"")?;
                if bytes.is_empty() {
                    return Err(Error::Format("JWK \"k\" must not be empty".into()));
                }
                KeyHandle::secret(bytes).with_extractable(!options.force_key_object_for_symmetric)
            }
            "RSA" => self.import_rsa()?,
            "EC" => self.import_ec()?,
            "OKP" => self.import_okp()?,
            other => return Err(UnsupportedKey::KeyType(other.to_string()).into()),
        };

        if let Some(key_use) = key_use {
            handle = handle.with_use(key_use);
        }
        if let Some(alg) = options.algorithm_override.as_ref().or(self.alg.as_ref()) {
            handle = handle.with_algorithm(alg.clone());
        }
        debug!(kty = %self.kty, kid = ?self.kid, "imported JWK");
        Ok(handle)
    }

    /// Exports a public key as a JWK.
    ///
    /// # Errors
    /// * `Error::UnsupportedKey` - If an EC key has no SEC1 encoding on a
    ///   known curve
    pub fn from_public_key(key: &PublicKeyMaterial) -> Result<Self> {
        match key {
            PublicKeyMaterial::Rsa(rsa) => Ok(Self {
                kty: "RSA".into(),
                n: Some(b64_encode(rsa.n().to_bytes_be())),
                e: Some(b64_encode(rsa.e().to_bytes_be())),
                ..Self::default()
            }),
            PublicKeyMaterial::X25519(public) => Ok(Self {
                kty: "OKP".into(),
                crv: Some(EcdhCurve::X25519.to_string()),
                x: Some(b64_encode(public.as_bytes())),
                ..Self::default()
            }),
            PublicKeyMaterial::P256(_) | PublicKeyMaterial::P384(_) | PublicKeyMaterial::P521(_) => {
                // to_raw is 0x04 || x || y
                let (Some(curve), Some(raw)) = (key.curve(), key.to_raw()) else {
                    return Err(UnsupportedKey::Curve("unnamed EC curve".into()).into());
                };
                let len = curve.coordinate_len();
                if raw.len() != 1 + 2 * len {
                    return Err(UnsupportedKey::Curve(curve.to_string()).into());
                }
                Ok(Self {
                    kty: "EC".into(),
                    crv: Some(curve.to_string()),
                    x: Some(b64_encode(&raw[1..=len])),
                    y: Some(b64_encode(&raw[1 + len..])),
                    ..Self::default()
                })
            }
        }
    }

    /// Imports the JWK with [`ImportOptions::for_jwk`].
    ///
    /// # Errors
    /// See [`Jwk::import`].
    pub fn to_key(&self) -> Result<KeyHandle> {
        self.import(&ImportOptions::for_jwk(self))
    }

    /// Sets the key ID.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    fn required(&self, name: &str) -> Result<&str> {
        let value = match name {
            "k" => self.k.as_deref(),
            "n" => self.n.as_deref(),
            "e" => self.e.as_deref(),
            "d" => self.d.as_deref(),
            "p" => self.p.as_deref(),
            "q" => self.q.as_deref(),
            "x" => self.x.as_deref(),
            "y" => self.y.as_deref(),
            "crv" => self.crv.as_deref(),
            _ => None,
        };
        value.ok_or_else(|| Error::Format(format!("JWK is missing the \"{name}\" parameter")))
    }

    fn big_uint(&self, name: &str) -> Result<BigUint> {
        let bytes = b64_decode(self.required(name)?, &format!("JWK \"{name}\""))?;
        Ok(BigUint::from_bytes_be(&bytes))
    }

    fn import_rsa(&self) -> Result<KeyHandle> {
        if self.oth.is_some() {
            return Err(UnsupportedKey::MultiPrimeRsa.into());
        }
        let n = self.big_uint("n")?;
        let e = self.big_uint("e")?;

        if self.d.is_none() {
            let key = RsaPublicKey::new(n, e)
                .map_err(|e| Error::Format(format!("invalid RSA public key: {e}")))?;
            return Ok(KeyHandle::public(PublicKeyMaterial::Rsa(key)));
        }

        let d = self.big_uint("d")?;
        let primes = vec![self.big_uint("p")?, self.big_uint("q")?];
        let key = RsaPrivateKey::from_components(n, e, d, primes)
            .map_err(|e| Error::Format(format!("invalid RSA private key: {e}")))?;
        key.validate()
            .map_err(|e| Error::Format(format!("invalid RSA private key: {e}")))?;
        Ok(KeyHandle::private(PrivateKeyMaterial::Rsa(key)))
    }

    fn curve(&self) -> Result<EcdhCurve> {
        let crv = self.required("crv")?;
        EcdhCurve::from_jwk_name(crv)
            .filter(|curve| curve.kty() == self.kty)
            .ok_or_else(|| UnsupportedKey::Curve(crv.to_string()).into())
    }

    fn coordinate(&self, name: &str, curve: EcdhCurve) -> Result<Vec<u8>> {
        let bytes = b64_decode(self.required(name)?, &format!("JWK \"{name}\""))?;
        if bytes.len() != curve.coordinate_len() {
            return Err(Error::Format(format!(
                "JWK \"{name}\" has the wrong length for {curve}"
            )));
        }
        Ok(bytes)
    }

    fn import_ec(&self) -> Result<KeyHandle> {
        let curve = self.curve()?;
        let mut sec1 = vec![0x04];
        sec1.extend(self.coordinate("x", curve)?);
        sec1.extend(self.coordinate("y", curve)?);
        let public = PublicKeyMaterial::from_raw(curve, &sec1)?;

        if self.d.is_none() {
            return Ok(KeyHandle::public(public));
        }

        let d = self.coordinate("d", curve)?;
        let invalid = |_| Error::Format(format!("invalid {curve} private key"));
        let private = match curve {
            EcdhCurve::P256 => p256::SecretKey::from_slice(&d)
                .map(PrivateKeyMaterial::P256)
                .map_err(invalid)?,
            EcdhCurve::P384 => p384::SecretKey::from_slice(&d)
                .map(PrivateKeyMaterial::P384)
                .map_err(invalid)?,
            EcdhCurve::P521 => p521::SecretKey::from_slice(&d)
                .map(PrivateKeyMaterial::P521)
                .map_err(invalid)?,
            EcdhCurve::X25519 => return Err(UnsupportedKey::Curve(curve.to_string()).into()),
        };
        Self::check_pair(&private, &public)?;
        Ok(KeyHandle::private(private))
    }

    fn import_okp(&self) -> Result<KeyHandle> {
        let curve = self.curve()?;
        let x: [u8; 32] = self
            .coordinate("x", curve)?
            .try_into()
            .map_err(|_| Error::Format("invalid X25519 public key".into()))?;
        let public = PublicKeyMaterial::X25519(x25519_dalek::PublicKey::from(x));

        if self.d.is_none() {
            return Ok(KeyHandle::public(public));
        }

        let d: [u8; 32] = self
            .coordinate("d", curve)?
            .try_into()
            .map_err(|_| Error::Format("invalid X25519 private key".into()))?;
        let private = PrivateKeyMaterial::X25519(x25519_dalek::StaticSecret::from(d));
        Self::check_pair(&private, &public)?;
        Ok(KeyHandle::private(private))
    }

    fn check_pair(private: &PrivateKeyMaterial, public: &PublicKeyMaterial) -> Result<()> {
        if private.public_key() != *public {
            return Err(Error::Format(
                "JWK private key does not match its public parameters".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeyFamily, KeyKind, KeyMaterial};
    use pretty_assertions::assert_eq;
    use rand_core::OsRng;
    use serde_json::json;

    fn jwk(value: Value) -> Jwk {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_import_oct_defaults_to_non_extractable() {
        let key = jwk(json!({"kty": "oct", "k": "AAECAwQFBgcICQoLDA0ODw"}));
        let handle = key.to_key().unwrap();
        assert_eq!(handle.family(), KeyFamily::Oct);
        assert!(!handle.is_extractable());

        let key = jwk(json!({"kty": "oct", "k": "AAECAwQFBgcICQoLDA0ODw", "ext": true}));
        let handle = key.to_key().unwrap();
        assert!(handle.is_extractable());
        assert_eq!(handle.export_secret().unwrap().len(), 16);

        let options = ImportOptions {
            force_key_object_for_symmetric: true,
            ..ImportOptions::for_jwk(&key)
        };
        assert!(!key.import(&options).unwrap().is_extractable());
    }

    #[test]
    fn test_import_binds_use_and_algorithm() {
        let key = jwk(json!({"kty": "oct", "k": "AAECAwQFBgcICQoLDA0ODw", "use": "enc", "alg": "A128KW"}));
        let handle = key.to_key().unwrap();
        assert_eq!(handle.key_use(), Some(KeyUse::Encryption));
        assert_eq!(handle.algorithm(), Some("A128KW"));

        let options = ImportOptions::for_jwk(&key).with_algorithm("A128GCMKW");
        assert_eq!(key.import(&options).unwrap().algorithm(), Some("A128GCMKW"));
    }

    #[test]
    fn test_unsupported_keys_are_distinguished() {
        let multi_prime = jwk(json!({"kty": "RSA", "n": "AQAB", "e": "AQAB", "oth": []}));
        assert!(matches!(
            multi_prime.to_key(),
            Err(Error::UnsupportedKey(UnsupportedKey::MultiPrimeRsa))
        ));

        let curve = jwk(json!({"kty": "EC", "crv": "secp256k1", "x": "AA", "y": "AA"}));
        assert!(matches!(
            curve.to_key(),
            Err(Error::UnsupportedKey(UnsupportedKey::Curve(crv))) if crv == "secp256k1"
        ));

        let ed = jwk(json!({"kty": "OKP", "crv": "Ed25519", "x": "AA"}));
        assert!(matches!(
            ed.to_key(),
            Err(Error::UnsupportedKey(UnsupportedKey::Curve(_)))
        ));

        let kty = jwk(json!({"kty": "AKP"}));
        assert!(matches!(
            kty.to_key(),
            Err(Error::UnsupportedKey(UnsupportedKey::KeyType(kty))) if kty == "AKP"
        ));
    }

    #[test]
    fn test_missing_parameter_is_format_error() {
        let key = jwk(json!({"kty": "EC", "crv": "P-256", "x": "AA"}));
        assert!(matches!(
            key.to_key(),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_ec_public_export_and_import() {
        let secret = p384::SecretKey::random(&mut OsRng);
        let public = PublicKeyMaterial::P384(secret.public_key());
        let exported = Jwk::from_public_key(&public).unwrap().with_kid("k1");
        assert_eq!(exported.kty, "EC");
        assert_eq!(exported.crv.as_deref(), Some("P-384"));

        let handle = exported.to_key().unwrap();
        assert_eq!(handle.kind(), KeyKind::Public);
        assert!(matches!(handle.material(), KeyMaterial::Public(p) if *p == public));
    }

    #[test]
    fn test_ec_export_names_each_curve() {
        let keys = [
            (PublicKeyMaterial::P256(p256::SecretKey::random(&mut OsRng).public_key()), "P-256", 32),
            (PublicKeyMaterial::P384(p384::SecretKey::random(&mut OsRng).public_key()), "P-384", 48),
            (PublicKeyMaterial::P521(p521::SecretKey::random(&mut OsRng).public_key()), "P-521", 66),
        ];
        for (public, crv, len) in keys {
            let exported = Jwk::from_public_key(&public).unwrap();
            assert_eq!(exported.crv.as_deref(), Some(crv));
            let x = b64_decode(exported.x.as_deref().unwrap(), "x").unwrap();
            let y = b64_decode(exported.y.as_deref().unwrap(), "y").unwrap();
            assert_eq!((x.len(), y.len()), (len, len), "{crv}");

            let handle = exported.to_key().unwrap();
            assert!(matches!(handle.material(), KeyMaterial::Public(p) if *p == public));
        }
    }

    #[test]
    fn test_ec_private_must_match_public() {
        let a = p256::SecretKey::random(&mut OsRng);
        let b = p256::SecretKey::random(&mut OsRng);
        let mut key = Jwk::from_public_key(&PublicKeyMaterial::P256(a.public_key())).unwrap();
        key.d = Some(b64_encode(b.to_bytes()));
        assert!(matches!(
            key.to_key(),
            Err(Error::Format(_))
        ));

        key.d = Some(b64_encode(a.to_bytes()));
        let handle = key.to_key().unwrap();
        assert_eq!(handle.kind(), KeyKind::Private);
    }

    #[test]
    fn test_x25519_private_import() {
        let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let public = x25519_dalek::PublicKey::from(&secret);
        let key = jwk(json!({
            "kty": "OKP",
            "crv": "X25519",
            "x": b64_encode(public.as_bytes()),
            "d": b64_encode(secret.to_bytes()),
        }));
        let handle = key.to_key().unwrap();
        assert_eq!(handle.family(), KeyFamily::Okp);
        assert_eq!(handle.kind(), KeyKind::Private);
    }

    #[test]
    fn test_debug_hides_private_parameters() {
        let key = jwk(json!({"kty": "oct", "k": "c2VjcmV0LXZhbHVl"}));
        let debug = format!("{key:?}");
        assert!(!debug.contains("c2VjcmV0LXZhbHVl"));
    }
}
