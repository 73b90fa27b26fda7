//! Encrypted wallet envelope
//!
//! A wallet blob is standard base64 wrapping a JSON object:
//!
//! ```text
//! {"iv":"…","v":1,"iter":1000,"ks":256,"ts":64,"mode":"ccm",
//!  "adata":"","cipher":"aes","salt":"…","ct":"…"}
//! ```
//!
//! `iv`, `salt` and `ct` are themselves base64. `adata` is stored
//! percent-escaped and must be unescaped before it is authenticated.
//! The ciphertext has the CCM tag appended.

use std::fmt;

use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{Engine, alphabet};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, ErrorKind, RecoverError, Result};

/// Standard alphabet, padded on output, padding optional on input.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Block cipher mode named by an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CipherMode {
    Ccm,
    Cbc,
    Other(String),
}

impl From<String> for CipherMode {
    fn from(mode: String) -> Self {
        match mode.as_str() {
            "ccm" => CipherMode::Ccm,
            "cbc" => CipherMode::Cbc,
            _ => CipherMode::Other(mode),
        }
    }
}

impl From<CipherMode> for String {
    fn from(mode: CipherMode) -> Self {
        match mode {
            CipherMode::Ccm => "ccm".to_string(),
            CipherMode::Cbc => "cbc".to_string(),
            CipherMode::Other(mode) => mode,
        }
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherMode::Ccm => f.write_str("ccm"),
            CipherMode::Cbc => f.write_str("cbc"),
            CipherMode::Other(mode) => f.write_str(mode),
        }
    }
}

/// Block cipher named by an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CipherName {
    Aes,
    Other(String),
}

impl From<String> for CipherName {
    fn from(name: String) -> Self {
        if name == "aes" {
            CipherName::Aes
        } else {
            CipherName::Other(name)
        }
    }
}

impl From<CipherName> for String {
    fn from(name: CipherName) -> Self {
        match name {
            CipherName::Aes => "aes".to_string(),
            CipherName::Other(name) => name,
        }
    }
}

impl fmt::Display for CipherName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherName::Aes => f.write_str("aes"),
            CipherName::Other(name) => f.write_str(name),
        }
    }
}

/// A decoded wallet envelope. Parsed once and then only read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Nonce source; CCM uses a prefix of it.
    #[serde(with = "base64_field")]
    pub iv: Vec<u8>,
    #[serde(rename = "v")]
    pub version: u32,
    /// PBKDF2 iteration count.
    #[serde(rename = "iter")]
    pub iterations: u32,
    #[serde(rename = "ks")]
    pub key_size_bits: u32,
    #[serde(rename = "ts")]
    pub tag_size_bits: u32,
    pub mode: CipherMode,
    /// Percent-escaped associated data, see [`Envelope::associated_data`].
    #[serde(rename = "adata", default)]
    pub additional_data: String,
    pub cipher: CipherName,
    #[serde(with = "base64_field")]
    pub salt: Vec<u8>,
    /// Ciphertext followed by the authentication tag.
    #[serde(rename = "ct", with = "base64_field")]
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Decode wallet text into an envelope.
    ///
    /// ASCII whitespace anywhere in the text is ignored, so line-wrapped
    /// wallet files and trailing newlines are accepted.
    pub fn decode(text: &str) -> Result<Self> {
        let compact: String = text
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let json = BASE64.decode(compact.as_bytes()).map_err(|e| {
            RecoverError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::EnvelopeFormat,
                format!("wallet base64 decoding failed: {}", e),
                e,
            )
        })?;
        let envelope: Envelope = serde_json::from_slice(&json).map_err(|e| {
            RecoverError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::EnvelopeFormat,
                format!("wallet JSON is not a valid envelope: {}", e),
                e,
            )
        })?;

        tracing::trace!(
            iv = %hex::encode(&envelope.iv),
            salt = %hex::encode(&envelope.salt),
            ciphertext_len = envelope.ciphertext.len(),
            "decoded wallet envelope"
        );
        Ok(envelope)
    }

    /// Encode the envelope back to wallet text (JSON, then base64).
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| {
            RecoverError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "failed to serialize envelope",
                e,
            )
        })?;
        Ok(BASE64.encode(json))
    }

    /// The envelope as indented JSON, binary fields still in base64.
    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            RecoverError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "failed to serialize envelope",
                e,
            )
        })
    }

    /// The associated data as authenticated by the cipher: `adata` with
    /// `%XX` escapes decoded. Malformed escapes are kept literally.
    ///
    /// This is deliberately not query-string decoding: `+` stays `+`. The
    /// client escapes spaces as `%20`, so a `+` in `adata` is a literal plus,
    /// and decoding it as a space would break authentication.
    pub fn associated_data(&self) -> Vec<u8> {
        percent_encoding::percent_decode_str(&self.additional_data).collect()
    }
}

mod base64_field {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer, de};

    use super::BASE64;

    pub fn serialize<S, T>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        BASE64.decode(text.as_bytes()).map_err(de::Error::custom)
    }
}
