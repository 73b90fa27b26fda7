//! Helpers shared by unit tests.

use crate::blobcrypt;
use crate::envelope::{CipherMode, CipherName, Envelope};
use crate::kdf::{KdfParams, Scheme};

/// An AES-256/CCM envelope with a 64-bit tag, a 16-byte IV and a cheap
/// iteration count, sealing `plaintext` under `(name, passphrase, scheme)`.
pub(crate) fn sealed_envelope(
    name: &str,
    passphrase: &str,
    scheme: Scheme,
    plaintext: &[u8],
) -> Envelope {
    let template = Envelope {
        iv: vec![0u8; 16],
        version: 1,
        iterations: 2,
        key_size_bits: 256,
        tag_size_bits: 64,
        mode: CipherMode::Ccm,
        additional_data: String::new(),
        cipher: CipherName::Aes,
        salt: vec![0x5a; 8],
        // Replaced by the seal below; only needs to pass validation.
        ciphertext: vec![0u8; 32],
    };
    let key = KdfParams::for_envelope(&template)
        .unwrap()
        .derive(name, passphrase, scheme);
    blobcrypt::seal_with_iv(&template, &key, plaintext, (0x10..0x20).collect()).unwrap()
}

/// A minimal wallet payload for `seed`.
pub(crate) fn payload_json(seed: &str) -> Vec<u8> {
    format!(
        r#"{{"master_seed":"{}","account_id":"rAccount","contacts":[],"preferred_issuer":{{}},"preferred_second_issuer":{{}}}}"#,
        seed
    )
    .into_bytes()
}
