//! Prelude module for commonly used types and traits.
//!
//! Import everything from this module with
//! `use jose_envelope_core::prelude::*`.

// Re-export error types
pub use crate::error::{Error, Result, UnsupportedKey};

// Re-export key types
pub use crate::key::{ImportOptions, Jwk, KeyFamily, KeyHandle, KeyKind, KeyUse};

// Re-export policy types
pub use crate::policy::{JwePolicy, JwsPolicy};

// Re-export core traits
pub use crate::resolver::{KeyResolver, KeySelector};

// Re-export JWE types and functions
pub use crate::jwe::{
    decrypt_compact, decrypt_compact_with, decrypt_flattened, decrypt_general, encrypt_compact,
    AesKeySize, ContentEncryptionAlgorithm, DecryptOptions, DecryptedJwe, EcdhCurve, Header,
    JweBuilder, KeyManagementAlgorithm, KeyManagementParams, OaepDigest, Recipient,
};

// Re-export JWS types and functions
pub use crate::jws::{
    verify_compact, verify_compact_with, verify_flattened, JwsBuilder, SignatureAlgorithm,
    VerifiedJws,
};
