//! Key resolution by header.
//!
//! Decryption and verification can take a [`KeyResolver`] instead of a key.
//! The resolver sees a [`KeySelector`] built from the validated header and
//! returns the key to use.

use async_trait::async_trait;

use crate::error::Result;
use crate::jwe::header::Header;
use crate::key::{KeyHandle, KeyUse};

/// What a resolver is asked to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySelector {
    /// The header `alg`
    pub alg: String,
    /// The header `kid`, if any
    pub kid: Option<String>,
    /// Whether the key will verify signatures or decrypt
    pub key_use: KeyUse,
}

impl KeySelector {
    /// Creates a selector for `alg` and `key_use`.
    pub fn new(alg: impl Into<String>, key_use: KeyUse) -> Self {
        Self {
            alg: alg.into(),
            kid: None,
            key_use,
        }
    }

    /// Restricts the selector to a key ID.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub(crate) fn from_header(header: &Header, alg: &str, key_use: KeyUse) -> Self {
        Self {
            alg: alg.to_owned(),
            kid: header.get("kid").and_then(|kid| kid.as_str()).map(str::to_owned),
            key_use,
        }
    }
}

/// Supplies keys for decryption and verification.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Finds the key matching `selector`.
    ///
    /// # Errors
    /// * `Error::NoMatchingKey` - Nothing matches
    /// * `Error::MultipleMatchingKeys` - The selector is ambiguous
    async fn resolve_key(&self, selector: &KeySelector) -> Result<KeyHandle>;
}

#[async_trait]
impl KeyResolver for KeyHandle {
    async fn resolve_key(&self, _selector: &KeySelector) -> Result<KeyHandle> {
        Ok(self.clone())
    }
}
