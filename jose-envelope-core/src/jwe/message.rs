//! JWE serializations (RFC 7516 section 7).
//!
//! The wire structs keep every member as transmitted. Decoding into a
//! [`DecodedJwe`] validates the base64url members and parses the protected
//! header, while keeping the exact protected text for the AAD.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::header::{parse_protected, Header};
use crate::error::{Error, Result};
use crate::utils::b64_decode;

/// Computes the AAD for content encryption.
///
/// `protected` is the base64url protected header exactly as transmitted and
/// `aad` the base64url JSON `aad` member, if any.
#[must_use]
pub fn additional_authenticated_data(protected: &str, aad: Option<&str>) -> Vec<u8> {
    match aad {
        Some(aad) => format!("{protected}.{aad}").into_bytes(),
        None => protected.as_bytes().to_vec(),
    }
}

/// A JWE in compact serialization, split into its five parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactJwe {
    /// The protected header (base64url-encoded)
    pub protected: String,
    /// The encrypted key (base64url-encoded, may be empty)
    pub encrypted_key: String,
    /// The initialization vector (base64url-encoded)
    pub iv: String,
    /// The ciphertext (base64url-encoded)
    pub ciphertext: String,
    /// The authentication tag (base64url-encoded)
    pub tag: String,
}

impl CompactJwe {
    /// Splits a compact JWE into its parts.
    ///
    /// # Errors
    /// * `Error::Format` - If there are not exactly five parts or the
    ///   protected header is empty
    pub fn parse(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.split('.').collect();
        let [protected, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
            return Err(Error::Format(format!(
                "compact JWE must have 5 parts, found {}",
                parts.len()
            )));
        };
        if protected.is_empty() {
            return Err(Error::Format("protected header must not be empty".into()));
        }
        Ok(Self {
            protected: (*protected).to_owned(),
            encrypted_key: (*encrypted_key).to_owned(),
            iv: (*iv).to_owned(),
            ciphertext: (*ciphertext).to_owned(),
            tag: (*tag).to_owned(),
        })
    }

    /// Decodes every part.
    ///
    /// # Errors
    /// * `Error::Format` - If a part is not base64url or the protected
    ///   header is not a JSON object
    pub fn decode(&self) -> Result<DecodedJwe> {
        let (protected, protected_header) = decode_protected(Some(&self.protected))?;
        Ok(DecodedJwe {
            protected,
            protected_header,
            unprotected: None,
            aad: None,
            iv: b64_decode(&self.iv, "iv")?,
            ciphertext: b64_decode(&self.ciphertext, "ciphertext")?,
            tag: b64_decode(&self.tag, "tag")?,
            recipients: vec![DecodedRecipient {
                header: None,
                encrypted_key: b64_decode(&self.encrypted_key, "encrypted_key")?,
            }],
        })
    }
}

impl fmt::Display for CompactJwe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}",
            self.protected, self.encrypted_key, self.iv, self.ciphertext, self.tag
        )
    }
}

/// One entry of the general serialization's `recipients` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JweRecipient {
    /// Per-recipient unprotected header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Header>,
    /// The encrypted key (base64url-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<String>,
}

/// A JWE in flattened JSON serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedJwe {
    /// The protected header (base64url-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<String>,
    /// Shared unprotected header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unprotected: Option<Header>,
    /// Per-recipient unprotected header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Header>,
    /// The encrypted key (base64url-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<String>,
    /// Additional authenticated data (base64url-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad: Option<String>,
    /// The initialization vector (base64url-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// The ciphertext (base64url-encoded)
    pub ciphertext: String,
    /// The authentication tag (base64url-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl FlattenedJwe {
    /// Parses the flattened JSON serialization.
    ///
    /// # Errors
    /// * `Error::Format` - If the input is not a flattened JWE object
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input)
            .map_err(|e| Error::Format(format!("invalid flattened JWE: {e}")))
    }

    /// Serializes to JSON text.
    ///
    /// # Errors
    /// * `Error::Json` - If serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes every member.
    ///
    /// # Errors
    /// * `Error::Format` - If a member is malformed
    pub fn decode(&self) -> Result<DecodedJwe> {
        if self.protected.is_none() && self.unprotected.is_none() && self.header.is_none() {
            return Err(Error::Format("JWE has no header".into()));
        }
        let recipient = DecodedRecipient {
            header: self.header.clone(),
            encrypted_key: optional_b64(self.encrypted_key.as_deref(), "encrypted_key")?,
        };
        decode_json(
            self.protected.as_deref(),
            self.unprotected.as_ref(),
            self.aad.as_deref(),
            self.iv.as_deref(),
            &self.ciphertext,
            self.tag.as_deref(),
            vec![recipient],
        )
    }
}

/// A JWE in general JSON serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralJwe {
    /// The protected header (base64url-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<String>,
    /// Shared unprotected header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unprotected: Option<Header>,
    /// The recipients
    pub recipients: Vec<JweRecipient>,
    /// Additional authenticated data (base64url-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad: Option<String>,
    /// The initialization vector (base64url-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// The ciphertext (base64url-encoded)
    pub ciphertext: String,
    /// The authentication tag (base64url-encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl GeneralJwe {
    /// Parses the general JSON serialization.
    ///
    /// # Errors
    /// * `Error::Format` - If the input is not a general JWE object
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input)
            .map_err(|e| Error::Format(format!("invalid general JWE: {e}")))
    }

    /// Serializes to JSON text.
    ///
    /// # Errors
    /// * `Error::Json` - If serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes every member.
    ///
    /// # Errors
    /// * `Error::Format` - If a member is malformed or `recipients` is empty
    pub fn decode(&self) -> Result<DecodedJwe> {
        if self.recipients.is_empty() {
            return Err(Error::Format("JWE \"recipients\" must not be empty".into()));
        }
        let recipients = self
            .recipients
            .iter()
            .map(|recipient| {
                if self.protected.is_none() && self.unprotected.is_none() && recipient.header.is_none() {
                    return Err(Error::Format("JWE recipient has no header".into()));
                }
                Ok(DecodedRecipient {
                    header: recipient.header.clone(),
                    encrypted_key: optional_b64(recipient.encrypted_key.as_deref(), "encrypted_key")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        decode_json(
            self.protected.as_deref(),
            self.unprotected.as_ref(),
            self.aad.as_deref(),
            self.iv.as_deref(),
            &self.ciphertext,
            self.tag.as_deref(),
            recipients,
        )
    }
}

/// A recipient after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecipient {
    /// Per-recipient unprotected header
    pub header: Option<Header>,
    /// The encrypted key; empty when absent
    pub encrypted_key: Vec<u8>,
}

/// A JWE with every member decoded, independent of its serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedJwe {
    /// The protected header text exactly as transmitted (empty when absent)
    pub protected: String,
    /// The parsed protected header
    pub protected_header: Option<Header>,
    /// Shared unprotected header
    pub unprotected: Option<Header>,
    /// The `aad` member as transmitted
    pub aad: Option<String>,
    /// The initialization vector
    pub iv: Vec<u8>,
    /// The ciphertext
    pub ciphertext: Vec<u8>,
    /// The authentication tag
    pub tag: Vec<u8>,
    /// The recipients; compact and flattened forms have exactly one
    pub recipients: Vec<DecodedRecipient>,
}

impl DecodedJwe {
    /// The AAD this JWE was sealed with.
    #[must_use]
    pub fn additional_authenticated_data(&self) -> Vec<u8> {
        additional_authenticated_data(&self.protected, self.aad.as_deref())
    }
}

fn decode_protected(protected: Option<&str>) -> Result<(String, Option<Header>)> {
    match protected {
        None => Ok((String::new(), None)),
        Some("") => Err(Error::Format("protected header must not be empty".into())),
        Some(text) => {
            let bytes = b64_decode(text, "protected header")?;
            Ok((text.to_owned(), Some(parse_protected(&bytes)?)))
        }
    }
}

fn optional_b64(value: Option<&str>, what: &str) -> Result<Vec<u8>> {
    value.map_or_else(|| Ok(Vec::new()), |value| b64_decode(value, what))
}

fn decode_json(
    protected: Option<&str>,
    unprotected: Option<&Header>,
    aad: Option<&str>,
    iv: Option<&str>,
    ciphertext: &str,
    tag: Option<&str>,
    recipients: Vec<DecodedRecipient>,
) -> Result<DecodedJwe> {
    let (protected, protected_header) = decode_protected(protected)?;
    if let Some(aad) = aad {
        b64_decode(aad, "aad")?;
    }
    Ok(DecodedJwe {
        protected,
        protected_header,
        unprotected: unprotected.cloned(),
        aad: aad.map(str::to_owned),
        iv: optional_b64(iv, "iv")?,
        ciphertext: b64_decode(ciphertext, "ciphertext")?,
        tag: optional_b64(tag, "tag")?,
        recipients,
    })
}
