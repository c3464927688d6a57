//! Core JOSE envelope engine.
//!
//! This crate builds, validates and opens JWS and JWE objects. It is
//! stateless: every operation is a function of its inputs and the caller's
//! keys, and nothing is cached between calls.
//!
//! # Features
//!
//! - Header policy validation with algorithm allow-lists, `crit` and `typ`
//!   checks
//! - A key management dispatcher covering direct, key wrapping, key
//!   agreement, password-based and RSA modes
//! - AES-CBC-HMAC and AES-GCM content encryption
//! - Compact, flattened JSON and general JSON serializations
//! - JWK import into opaque key handles
//! - A [`resolver::KeyResolver`] seam for looking keys up by header
//!
//! # Architecture
//!
//! The crate is organized into these main modules:
//! - `policy`: Header and algorithm policy
//! - `key`: Key handles and JWK import
//! - `jwe`: JSON Web Encryption
//! - `jws`: JSON Web Signature
//! - `resolver`: Key lookup by header
//! - `error`: Error types and handling
//!
//! # Examples
//!
//! ```rust
//! use jose_envelope_core::prelude::*;
//!
//! let key = Jwk {
//!     kty: "oct".into(),
//!     k: Some("GawgguFyGrWKav7AX4VKUg".into()),
//!     ..Jwk::default()
//! }
//! .to_key()
//! .unwrap();
//!
//! let alg = KeyManagementAlgorithm::AesKw(AesKeySize::A128);
//! let enc = ContentEncryptionAlgorithm::A128CbcHs256;
//! let jwe = encrypt_compact(b"Live long and prosper.", alg, enc, &key).unwrap();
//!
//! let policy = JwePolicy::new([alg], [enc]);
//! let decrypted = decrypt_compact(&jwe, &key, &policy, &DecryptOptions::default()).unwrap();
//! assert_eq!(decrypted.plaintext, b"Live long and prosper.");
//! ```
//!
//! # Security Considerations
//!
//! - Allow-lists are explicit: the default policies accept nothing
//! - Key material is zeroized on drop and redacted from `Debug` output
//! - Decryption failures do not say which step failed

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod jwe;
pub mod jws;
pub mod key;
pub mod policy;
pub mod prelude;
pub mod resolver;
pub mod utils;

#[cfg(test)]
pub(crate) mod tests;

pub use error::{Error, Result, UnsupportedKey};
