//! wallet-recover - Credential recovery for AES-CCM encrypted wallet blobs

#![forbid(unsafe_code)]

pub mod blobcrypt;
pub mod candidates;
pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod passphrase;
pub mod payload;
pub mod search;

#[cfg(test)]
mod test_support;
