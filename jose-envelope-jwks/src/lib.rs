//! Remote JSON Web Key Set cache.
//!
//! This crate resolves verification and decryption keys from JWK Sets
//! published at a URL. It:
//! - Fetches documents through an injected [`JwksFetcher`]
//! - Shares one in-flight fetch between concurrent lookups of a URL
//! - Re-fetches once when a key is missing, then cools down
//! - Re-fetches documents older than `max_age`
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//! - `select`: JWK Set parsing and key selection
//! - `fetch`: The fetcher trait and its HTTP implementation
//! - `cache`: The per-URL cache and its [`KeyResolver`] binding
//!
//! Errors are the core crate's [`Error`]: `JwksTimeout`, `Jose`,
//! `NoMatchingKey` and `MultipleMatchingKeys`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jose_envelope_core::prelude::*;
//! use jose_envelope_jwks::{RemoteKeySet, RemoteKeySetOptions};
//!
//! async fn open(token: &str) -> Result<DecryptedJwe> {
//!     let key_set = RemoteKeySet::with_http(RemoteKeySetOptions::default())?;
//!     let resolver = key_set.resolver("https://example.com/.well-known/jwks.json");
//!     let policy = JwePolicy::new(
//!         [KeyManagementAlgorithm::EcdhEs],
//!         [ContentEncryptionAlgorithm::A256Gcm],
//!     );
//!     decrypt_compact_with(token, &resolver, &policy, &DecryptOptions::default()).await
//! }
//! ```
//!
//! [`KeyResolver`]: jose_envelope_core::resolver::KeyResolver

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod fetch;
pub mod select;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use cache::{RemoteKeyResolver, RemoteKeySet, RemoteKeySetOptions};
pub use fetch::{HttpFetcher, JwksFetcher};
pub use jose_envelope_core::error::{Error, Result};
pub use select::{select_key, JwkSet};
