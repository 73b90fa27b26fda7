//! Decrypted wallet contents

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorCategory, ErrorKind, RecoverError, Result};

/// The all-zero seed. A wallet holding it controls nothing of value.
pub const ZERO_SEED: &str = "sp6JS7f14BuwFY8Mw6bTtLKWauoUs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(alias = "Name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(alias = "Address", default, deserialize_with = "null_as_default")]
    pub address: String,
    /// Fields this tool does not interpret, kept for re-encoding.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Plaintext of a wallet blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletPayload {
    pub master_seed: String,
    /// Derivable from `master_seed`; stored alongside it by the client.
    pub account_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contacts: Vec<Contact>,
    /// Currency code to issuer address.
    #[serde(default, deserialize_with = "null_as_default")]
    pub preferred_issuer: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub preferred_second_issuer: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Optional sections may be written as `null` instead of being left out.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl WalletPayload {
    /// Parse decrypted bytes. Anything other than a JSON object with string
    /// `master_seed` and `account_id` fields is a [`ErrorKind::PayloadFormat`]
    /// error.
    pub fn decode(plaintext: &[u8]) -> Result<Self> {
        serde_json::from_slice(plaintext).map_err(|e| {
            RecoverError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::PayloadFormat,
                format!("decrypted data is not a wallet payload: {}", e),
                e,
            )
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            RecoverError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "failed to serialize wallet payload",
                e,
            )
        })
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            RecoverError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "failed to serialize wallet payload",
                e,
            )
        })
    }
}
