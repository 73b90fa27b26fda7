//! Key derivation from wallet credentials
//!
//! Both schemes stretch UTF-8 key material with PBKDF2-HMAC-SHA256 using the
//! envelope's salt and iteration count. They differ only in how the name and
//! passphrase are joined:
//!
//! - legacy: `name ++ passphrase`
//! - versioned: `len(name) ++ "|" ++ name ++ passphrase`, where `len` is the
//!   decimal byte length of the name
//!
//! Legacy material cannot tell `("ab", "c")` from `("a", "bc")`. It is still
//! tried because older wallets were sealed with it.

use std::fmt;

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::envelope::Envelope;
use crate::error::{ErrorCategory, ErrorKind, RecoverError, Result};

/// How the name and passphrase are combined into key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Legacy,
    Versioned,
}

impl Scheme {
    /// Every scheme, in the order a search tries them.
    pub const ALL: [Scheme; 2] = [Scheme::Legacy, Scheme::Versioned];

    /// The bytes fed to PBKDF2 for this credential pair.
    pub fn key_material(self, name: &str, passphrase: &str) -> Zeroizing<Vec<u8>> {
        let mut material = Zeroizing::new(Vec::with_capacity(name.len() + passphrase.len() + 8));
        if self == Scheme::Versioned {
            material.extend_from_slice(name.len().to_string().as_bytes());
            material.push(b'|');
        }
        material.extend_from_slice(name.as_bytes());
        material.extend_from_slice(passphrase.as_bytes());
        material
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Legacy => f.write_str("legacy"),
            Scheme::Versioned => f.write_str("versioned"),
        }
    }
}

/// Validated PBKDF2 parameters, shared by every derivation against one envelope.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams<'a> {
    salt: &'a [u8],
    iterations: u32,
    key_len: usize,
}

impl<'a> KdfParams<'a> {
    pub fn new(salt: &'a [u8], iterations: u32, key_len: usize) -> Result<Self> {
        if iterations == 0 {
            return Err(RecoverError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidParameters,
                "PBKDF2 iteration count must be positive",
            ));
        }
        if key_len == 0 {
            return Err(RecoverError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidParameters,
                "derived key length must be positive",
            ));
        }
        Ok(Self {
            salt,
            iterations,
            key_len,
        })
    }

    /// Parameters from the envelope's `salt`, `iter` and `ks` fields.
    pub fn for_envelope(envelope: &'a Envelope) -> Result<Self> {
        if envelope.key_size_bits % 8 != 0 {
            return Err(RecoverError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidParameters,
                format!(
                    "bad key size ks={}, not a multiple of 8",
                    envelope.key_size_bits
                ),
            ));
        }
        Self::new(
            &envelope.salt,
            envelope.iterations,
            (envelope.key_size_bits / 8) as usize,
        )
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn derive(&self, name: &str, passphrase: &str, scheme: Scheme) -> Zeroizing<Vec<u8>> {
        let material = scheme.key_material(name, passphrase);
        let mut key = Zeroizing::new(vec![0u8; self.key_len]);
        pbkdf2_hmac::<Sha256>(&material, self.salt, self.iterations, &mut key);
        key
    }
}

/// Derive a `key_len`-byte key for one credential pair under `scheme`.
pub fn derive_key(
    name: &str,
    passphrase: &str,
    scheme: Scheme,
    salt: &[u8],
    iterations: u32,
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    Ok(KdfParams::new(salt, iterations, key_len)?.derive(name, passphrase, scheme))
}

/// The identifier the wallet client stores a blob under: lowercase hex
/// SHA-256 of `name ++ passphrase`.
pub fn blob_id(name: &str, passphrase: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(passphrase.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &[u8] = b"saltsalt";

    fn derive_hex(name: &str, passphrase: &str, scheme: Scheme) -> String {
        hex::encode(&*derive_key(name, passphrase, scheme, SALT, 10, 32).unwrap())
    }

    #[test]
    fn test_key_material_layout() {
        assert_eq!(
            &*Scheme::Legacy.key_material("alice", "pw"),
            b"alicepw".as_slice()
        );
        assert_eq!(
            &*Scheme::Versioned.key_material("alice", "pw"),
            b"5|alicepw".as_slice()
        );
        assert_eq!(
            &*Scheme::Versioned.key_material("", "pw"),
            b"0|pw".as_slice()
        );
    }

    #[test]
    fn test_versioned_prefix_counts_bytes() {
        // "é" is one character but two UTF-8 bytes.
        assert_eq!(
            &*Scheme::Versioned.key_material("é", "x"),
            "2|éx".as_bytes()
        );
    }

    #[test]
    fn test_known_answers() {
        assert_eq!(
            derive_hex("ab", "c", Scheme::Legacy),
            "84f5427cab1e779489cd9171baa71ee779a9f778b0cf9b630493707efca732f5"
        );
        assert_eq!(
            derive_hex("ab", "c", Scheme::Versioned),
            "87852f61229d02e38876b6eb5efea84a2104d4dc87e8b50f3a4404f174bfeddf"
        );
        assert_eq!(
            derive_hex("a", "bc", Scheme::Versioned),
            "fca0fe8b406449f5885f7e460874614c7e8782571e0042b8b7dd0cca8e999ff2"
        );
    }

    #[test]
    fn test_legacy_boundary_is_ambiguous() {
        assert_eq!(
            derive_hex("ab", "c", Scheme::Legacy),
            derive_hex("a", "bc", Scheme::Legacy)
        );
        assert_ne!(
            derive_hex("ab", "c", Scheme::Versioned),
            derive_hex("a", "bc", Scheme::Versioned)
        );
    }

    #[test]
    fn test_key_length_follows_request() {
        let key = derive_key("a", "b", Scheme::Versioned, SALT, 1, 16).unwrap();
        assert_eq!(key.len(), 16);
        let longer = derive_key("a", "b", Scheme::Versioned, SALT, 1, 24).unwrap();
        // PBKDF2 output is a prefix-stable stream of blocks.
        assert_eq!(&longer[..16], &key[..]);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let err = derive_key("a", "b", Scheme::Legacy, SALT, 0, 32).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::InvalidParameters));
    }

    #[test]
    fn test_zero_key_length_rejected() {
        let err = derive_key("a", "b", Scheme::Legacy, SALT, 1, 0).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::InvalidParameters));
    }

    #[test]
    fn test_blob_id() {
        assert_eq!(
            blob_id("rippler", "correct horse battery"),
            "f5c222e3f88615047898b5144d2a1c72d7cb806b673112ba1768fb717934e8e2"
        );
    }
}
