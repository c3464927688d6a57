//! Header and algorithm policy.
//!
//! Both validators are pure functions of their inputs. They run before any
//! key is touched, so a header that fails here never reaches a primitive.
//!
//! # Examples
//!
//! ```rust
//! use jose_envelope_core::jwe::{ContentEncryptionAlgorithm, KeyManagementAlgorithm};
//! use jose_envelope_core::policy::{validate_jwe_header, JwePolicy};
//! use serde_json::json;
//!
//! let policy = JwePolicy::new(
//!     [KeyManagementAlgorithm::Dir],
//!     [ContentEncryptionAlgorithm::A256Gcm],
//! );
//! let protected = json!({"alg": "dir", "enc": "A256GCM"});
//! let validated = validate_jwe_header(protected.as_object(), None, &policy).unwrap();
//! assert_eq!(validated.alg, KeyManagementAlgorithm::Dir);
//! ```

use serde_json::Value;

use crate::error::{Error, Result};
use crate::jwe::header::{join_headers, Header};
use crate::jwe::{ContentEncryptionAlgorithm, KeyManagementAlgorithm};
use crate::jws::SignatureAlgorithm;

/// Header parameters registered for JWE (RFC 7516 section 4.1, RFC 7518 section 4).
const JWE_REGISTERED: &[&str] = &[
    "alg", "enc", "zip", "jku", "jwk", "kid", "x5u", "x5c", "x5t", "x5t#S256", "typ", "cty",
    "crit", "epk", "apu", "apv", "iv", "tag", "p2s", "p2c",
];

/// Header parameters registered for JWS (RFC 7515 section 4.1).
const JWS_REGISTERED: &[&str] = &[
    "alg", "jku", "jwk", "kid", "x5u", "x5c", "x5t", "x5t#S256", "typ", "cty", "crit",
];

/// Policy applied to JWE headers.
///
/// The default policy has empty allow-lists and therefore rejects every
/// header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JwePolicy {
    /// Accepted `alg` values
    pub key_management_algorithms: Vec<KeyManagementAlgorithm>,
    /// Accepted `enc` values
    pub content_encryption_algorithms: Vec<ContentEncryptionAlgorithm>,
    /// Extension parameters this caller understands when listed in `crit`
    pub recognized_critical: Vec<String>,
    /// Expected `typ`, compared after normalization
    pub typ: Option<String>,
}

impl JwePolicy {
    /// Creates a policy accepting the given algorithms.
    pub fn new(
        algs: impl IntoIterator<Item = KeyManagementAlgorithm>,
        encs: impl IntoIterator<Item = ContentEncryptionAlgorithm>,
    ) -> Self {
        Self {
            key_management_algorithms: algs.into_iter().collect(),
            content_encryption_algorithms: encs.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Adds a recognized `crit` extension.
    #[must_use]
    pub fn with_critical(mut self, name: impl Into<String>) -> Self {
        self.recognized_critical.push(name.into());
        self
    }

    /// Requires a `typ` value.
    #[must_use]
    pub fn with_typ(mut self, typ: impl Into<String>) -> Self {
        self.typ = Some(typ.into());
        self
    }
}

/// Policy applied to JWS headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JwsPolicy {
    /// Accepted `alg` values
    pub algorithms: Vec<SignatureAlgorithm>,
    /// Extension parameters this caller understands when listed in `crit`
    pub recognized_critical: Vec<String>,
    /// Expected `typ`, compared after normalization
    pub typ: Option<String>,
}

impl JwsPolicy {
    /// Creates a policy accepting the given algorithms.
    pub fn new(algs: impl IntoIterator<Item = SignatureAlgorithm>) -> Self {
        Self {
            algorithms: algs.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Adds a recognized `crit` extension.
    #[must_use]
    pub fn with_critical(mut self, name: impl Into<String>) -> Self {
        self.recognized_critical.push(name.into());
        self
    }

    /// Requires a `typ` value.
    #[must_use]
    pub fn with_typ(mut self, typ: impl Into<String>) -> Self {
        self.typ = Some(typ.into());
        self
    }
}

/// A JWE header that passed [`validate_jwe_header`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedJweHeader {
    /// Key management algorithm
    pub alg: KeyManagementAlgorithm,
    /// Content encryption algorithm
    pub enc: ContentEncryptionAlgorithm,
    /// The joined JOSE Header
    pub header: Header,
    /// Names listed in `crit`
    pub critical: Vec<String>,
}

/// A JWS header that passed [`validate_jws_header`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedJwsHeader {
    /// Signature algorithm
    pub alg: SignatureAlgorithm,
    /// The joined JOSE Header
    pub header: Header,
    /// Names listed in `crit`
    pub critical: Vec<String>,
}

/// Validates a JWE header against `policy`.
///
/// # Errors
/// * `Error::Format` - Missing or non-string `alg`/`enc`
/// * `Error::NotSupported` - `alg` or `enc` names an unknown algorithm
/// * `Error::Policy` - Allow-list, `crit`, `typ` or disjointness violation
pub fn validate_jwe_header(
    protected: Option<&Header>,
    unprotected: Option<&Header>,
    policy: &JwePolicy,
) -> Result<ValidatedJweHeader> {
    let header = join_headers(&[protected, unprotected])?;

    let alg: KeyManagementAlgorithm = required_str(&header, "alg")?.parse()?;
    if !policy.key_management_algorithms.contains(&alg) {
        return Err(Error::Policy(format!("\"alg\" (Algorithm) value {alg} is not allowed")));
    }
    let enc: ContentEncryptionAlgorithm = required_str(&header, "enc")?.parse()?;
    if !policy.content_encryption_algorithms.contains(&enc) {
        return Err(Error::Policy(format!(
            "\"enc\" (Encryption Algorithm) value {enc} is not allowed"
        )));
    }

    let critical = validate_crit(
        protected,
        unprotected,
        &header,
        JWE_REGISTERED,
        &policy.recognized_critical,
    )?;
    check_typ(&header, policy.typ.as_deref())?;

    Ok(ValidatedJweHeader {
        alg,
        enc,
        header,
        critical,
    })
}

/// Validates a JWS header against `policy`.
///
/// # Errors
/// * `Error::Format` - Missing or non-string `alg`
/// * `Error::NotSupported` - `alg` names an unknown algorithm
/// * `Error::Policy` - Allow-list, `crit`, `typ` or disjointness violation
pub fn validate_jws_header(
    protected: Option<&Header>,
    unprotected: Option<&Header>,
    policy: &JwsPolicy,
) -> Result<ValidatedJwsHeader> {
    let header = join_headers(&[protected, unprotected])?;

    let alg: SignatureAlgorithm = required_str(&header, "alg")?.parse()?;
    if !policy.algorithms.contains(&alg) {
        return Err(Error::Policy(format!("\"alg\" (Algorithm) value {alg} is not allowed")));
    }

    let critical = validate_crit(
        protected,
        unprotected,
        &header,
        JWS_REGISTERED,
        &policy.recognized_critical,
    )?;
    check_typ(&header, policy.typ.as_deref())?;

    Ok(ValidatedJwsHeader {
        alg,
        header,
        critical,
    })
}

fn required_str<'a>(header: &'a Header, name: &str) -> Result<&'a str> {
    match header.get(name) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(Error::Format(format!("\"{name}\" header parameter must be a string"))),
        None => Err(Error::Format(format!("missing \"{name}\" header parameter"))),
    }
}

fn validate_crit(
    protected: Option<&Header>,
    unprotected: Option<&Header>,
    joined: &Header,
    registered: &[&str],
    recognized: &[String],
) -> Result<Vec<String>> {
    if unprotected.is_some_and(|header| header.contains_key("crit")) {
        return Err(Error::Policy(
            "\"crit\" (Critical) header parameter must be integrity protected".into(),
        ));
    }
    let Some(crit) = joined.get("crit") else {
        return Ok(Vec::new());
    };

    let names: Vec<String> = match crit {
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned))
            .collect::<Option<_>>()
            .ok_or_else(|| {
                Error::Policy("\"crit\" (Critical) must be an array of strings".into())
            })?,
        _ => {
            return Err(Error::Policy(
                "\"crit\" (Critical) must be a non-empty array of strings".into(),
            ))
        }
    };

    for name in &names {
        if registered.contains(&name.as_str()) {
            return Err(Error::Policy(format!(
                "\"crit\" (Critical) must not list the registered parameter \"{name}\""
            )));
        }
        if !recognized.contains(name) {
            return Err(Error::Policy(format!(
                "Extension Header Parameter \"{name}\" is not recognized"
            )));
        }
        if !joined.contains_key(name) {
            return Err(Error::Policy(format!(
                "Extension Header Parameter \"{name}\" is missing"
            )));
        }
        if !protected.is_some_and(|header| header.contains_key(name)) {
            return Err(Error::Policy(format!(
                "Extension Header Parameter \"{name}\" must be integrity protected"
            )));
        }
    }
    Ok(names)
}

fn normalize_typ(typ: &str) -> String {
    let lower = typ.to_ascii_lowercase();
    match lower.strip_prefix("application/") {
        Some(rest) => rest.to_owned(),
        None => lower,
    }
}

fn check_typ(header: &Header, expected: Option<&str>) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = match header.get("typ") {
        Some(Value::String(typ)) => typ,
        _ => return Err(Error::Policy("\"typ\" header parameter is missing".into())),
    };
    if normalize_typ(actual) != normalize_typ(expected) {
        return Err(Error::Policy(format!(
            "unexpected \"typ\" header parameter value {actual}"
        )));
    }
    Ok(())
}
