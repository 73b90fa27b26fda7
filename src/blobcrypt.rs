//! Authenticated decryption/encryption of wallet blobs using AES-CCM
//!
//! The envelope describes its own cipher parameters. [`CcmSuite`] checks
//! them once (cipher, mode, key/tag sizes, nonce length) so that opening
//! with a candidate key can only fail because the key is wrong.
//!
//! CCM spends the 15 bytes after its flags octet on the nonce and on a
//! big-endian message length field of `L` bytes (2 <= L <= 8). The nonce
//! used is therefore the prefix of the envelope IV that still leaves room
//! for the length of the message being sealed or opened.

use aes::cipher::{BlockCipher, BlockEncrypt, BlockSizeUser};
use aes::{Aes128, Aes192, Aes256};
use ccm::aead::generic_array::{ArrayLength, GenericArray};
use ccm::aead::{Aead, Payload};
use ccm::consts::{U4, U6, U7, U8, U9, U10, U11, U12, U13, U14, U16};
use ccm::{Ccm, KeyInit, NonceSize, TagSize};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::envelope::{CipherMode, CipherName, Envelope};
use crate::error::{ErrorCategory, ErrorKind, RecoverError, Result};

/// AES key lengths in bytes.
const AES_KEY_LENS: [usize; 3] = [16, 24, 32];

/// Tag lengths in bytes that CCM defines.
const CCM_TAG_LENS: [usize; 7] = [4, 6, 8, 10, 12, 14, 16];

/// Shortest CCM nonce (L = 8).
const CCM_MIN_NONCE_LEN: usize = 7;

/// Longest usable CCM nonce for a message of `message_len` bytes.
pub fn max_nonce_len(message_len: usize) -> usize {
    let len = message_len as u64;
    (2u32..8)
        .find(|l| len >> (8 * l) == 0)
        .map_or(CCM_MIN_NONCE_LEN, |l| 15 - l as usize)
}

/// Cipher parameters negotiated from one envelope.
#[derive(Debug, Clone)]
pub struct CcmSuite<'a> {
    key_len: usize,
    tag_len: usize,
    nonce: &'a [u8],
    ciphertext: &'a [u8],
    associated_data: Vec<u8>,
}

impl<'a> CcmSuite<'a> {
    /// Check the envelope's cipher parameters and fix the nonce.
    ///
    /// Every error returned here is fatal: no key can make the envelope
    /// decryptable.
    pub fn for_envelope(envelope: &'a Envelope) -> Result<Self> {
        if let CipherName::Other(name) = &envelope.cipher {
            return Err(RecoverError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnsupportedCipher,
                format!("blob encrypted with unsupported cipher {:?}", name),
            ));
        }
        match &envelope.mode {
            CipherMode::Ccm => {}
            CipherMode::Cbc => {
                return Err(RecoverError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::UnsupportedMode,
                    "blob encrypted with unsupported cipher mode \"cbc\" (CBC cannot authenticate the plaintext)",
                ));
            }
            CipherMode::Other(mode) => {
                return Err(RecoverError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::UnsupportedMode,
                    format!("blob encrypted with unsupported cipher mode {:?}", mode),
                ));
            }
        }

        let key_len = byte_len("key size ks", envelope.key_size_bits)?;
        if !AES_KEY_LENS.contains(&key_len) {
            return Err(invalid(format!(
                "bad key size ks={}, AES needs 128, 192 or 256",
                envelope.key_size_bits
            )));
        }
        let tag_len = byte_len("tag size ts", envelope.tag_size_bits)?;
        if !CCM_TAG_LENS.contains(&tag_len) {
            return Err(invalid(format!(
                "bad tag size ts={}, CCM allows 32 to 128 in steps of 16",
                envelope.tag_size_bits
            )));
        }
        if envelope.ciphertext.len() <= tag_len {
            return Err(invalid(format!(
                "ciphertext of {} bytes cannot hold a {}-byte tag and a message",
                envelope.ciphertext.len(),
                tag_len
            )));
        }

        let message_len = envelope.ciphertext.len() - tag_len;
        let nonce_len = nonce_len_for(envelope.iv.len(), message_len)?;
        let nonce = &envelope.iv[..nonce_len];
        let associated_data = envelope.associated_data();

        tracing::debug!(
            key_bits = key_len * 8,
            tag_len,
            iv_len = envelope.iv.len(),
            nonce_len,
            message_len,
            "negotiated AES-CCM parameters"
        );
        tracing::trace!(
            nonce = %hex::encode(nonce),
            adata = %hex::encode(&associated_data),
            "AES-CCM inputs"
        );

        Ok(Self {
            key_len,
            tag_len,
            nonce,
            ciphertext: &envelope.ciphertext,
            associated_data,
        })
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn tag_len(&self) -> usize {
        self.tag_len
    }

    /// The (possibly truncated) IV prefix used as the CCM nonce.
    pub fn nonce(&self) -> &[u8] {
        self.nonce
    }

    pub fn associated_data(&self) -> &[u8] {
        &self.associated_data
    }

    /// Decrypt and verify the envelope ciphertext under `key`.
    ///
    /// A tag mismatch is reported as [`ErrorKind::AuthenticationFailed`].
    pub fn open(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_key(key)?;
        apply(
            key,
            self.tag_len,
            self.nonce,
            Request {
                direction: Direction::Open,
                message: self.ciphertext,
                aad: &self.associated_data,
            },
        )
    }

    /// Encrypt `plaintext` under `key` with the same tag length and
    /// associated data, taking the nonce from the front of `iv`.
    ///
    /// Returns ciphertext with the tag appended.
    pub fn seal(&self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.check_key(key)?;
        let nonce_len = nonce_len_for(iv.len(), plaintext.len())?;
        apply(
            key,
            self.tag_len,
            &iv[..nonce_len],
            Request {
                direction: Direction::Seal,
                message: plaintext,
                aad: &self.associated_data,
            },
        )
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_len {
            return Err(RecoverError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                format!(
                    "derived key is {} bytes, envelope needs {}",
                    key.len(),
                    self.key_len
                ),
            ));
        }
        Ok(())
    }
}

/// Decrypt an envelope with an already derived key.
pub fn open(envelope: &Envelope, key: &[u8]) -> Result<Vec<u8>> {
    CcmSuite::for_envelope(envelope)?.open(key)
}

/// Re-seal `plaintext` under `key` as a copy of `envelope` with a fresh
/// random IV of the original IV's length.
pub fn seal(envelope: &Envelope, key: &[u8], plaintext: &[u8]) -> Result<Envelope> {
    let mut iv = vec![0u8; envelope.iv.len()];
    OsRng.try_fill_bytes(&mut iv).map_err(|e| {
        RecoverError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::EntropyUnavailable,
            "failed to generate a fresh IV",
            e,
        )
    })?;
    seal_with_iv(envelope, key, plaintext, iv)
}

/// Re-seal `plaintext` using the provided IV.
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// Never reuse an IV under the same key - use `seal()`.
pub fn seal_with_iv(
    envelope: &Envelope,
    key: &[u8],
    plaintext: &[u8],
    iv: Vec<u8>,
) -> Result<Envelope> {
    let ciphertext = CcmSuite::for_envelope(envelope)?.seal(key, &iv, plaintext)?;
    tracing::trace!(iv = %hex::encode(&iv), "sealed with fresh IV");
    Ok(Envelope {
        iv,
        ciphertext,
        ..envelope.clone()
    })
}

fn byte_len(what: &str, bits: u32) -> Result<usize> {
    if bits == 0 || bits % 8 != 0 {
        return Err(invalid(format!(
            "bad {}={}, not a positive multiple of 8",
            what, bits
        )));
    }
    Ok((bits / 8) as usize)
}

fn nonce_len_for(iv_len: usize, message_len: usize) -> Result<usize> {
    let nonce_len = iv_len.min(max_nonce_len(message_len));
    if nonce_len < CCM_MIN_NONCE_LEN {
        return Err(invalid(format!(
            "IV of {} bytes is shorter than the {}-byte minimum CCM nonce",
            iv_len, CCM_MIN_NONCE_LEN
        )));
    }
    Ok(nonce_len)
}

fn invalid(msg: String) -> RecoverError {
    RecoverError::with_kind(ErrorCategory::User, ErrorKind::InvalidParameters, msg)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Open,
    Seal,
}

#[derive(Clone, Copy)]
struct Request<'m> {
    direction: Direction,
    message: &'m [u8],
    aad: &'m [u8],
}

// `Ccm` fixes key, tag and nonce sizes at the type level, so the runtime
// sizes are resolved one parameter at a time.

fn apply(key: &[u8], tag_len: usize, nonce: &[u8], request: Request<'_>) -> Result<Vec<u8>> {
    match key.len() {
        16 => with_tag::<Aes128>(key, tag_len, nonce, request),
        24 => with_tag::<Aes192>(key, tag_len, nonce, request),
        32 => with_tag::<Aes256>(key, tag_len, nonce, request),
        n => Err(unreachable_size("key", n)),
    }
}

fn with_tag<C>(key: &[u8], tag_len: usize, nonce: &[u8], request: Request<'_>) -> Result<Vec<u8>>
where
    C: BlockCipher + BlockSizeUser<BlockSize = U16> + BlockEncrypt + KeyInit,
{
    match tag_len {
        4 => with_nonce::<C, U4>(key, nonce, request),
        6 => with_nonce::<C, U6>(key, nonce, request),
        8 => with_nonce::<C, U8>(key, nonce, request),
        10 => with_nonce::<C, U10>(key, nonce, request),
        12 => with_nonce::<C, U12>(key, nonce, request),
        14 => with_nonce::<C, U14>(key, nonce, request),
        16 => with_nonce::<C, U16>(key, nonce, request),
        n => Err(unreachable_size("tag", n)),
    }
}

fn with_nonce<C, M>(key: &[u8], nonce: &[u8], request: Request<'_>) -> Result<Vec<u8>>
where
    C: BlockCipher + BlockSizeUser<BlockSize = U16> + BlockEncrypt + KeyInit,
    M: ArrayLength<u8> + TagSize,
{
    match nonce.len() {
        7 => run::<C, M, U7>(key, nonce, request),
        8 => run::<C, M, U8>(key, nonce, request),
        9 => run::<C, M, U9>(key, nonce, request),
        10 => run::<C, M, U10>(key, nonce, request),
        11 => run::<C, M, U11>(key, nonce, request),
        12 => run::<C, M, U12>(key, nonce, request),
        13 => run::<C, M, U13>(key, nonce, request),
        n => Err(unreachable_size("nonce", n)),
    }
}

fn run<C, M, N>(key: &[u8], nonce: &[u8], request: Request<'_>) -> Result<Vec<u8>>
where
    C: BlockCipher + BlockSizeUser<BlockSize = U16> + BlockEncrypt + KeyInit,
    M: ArrayLength<u8> + TagSize,
    N: ArrayLength<u8> + NonceSize,
{
    let cipher = Ccm::<C, M, N>::new_from_slice(key).map_err(|_| {
        RecoverError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "failed to initialize AES-CCM",
        )
    })?;
    let nonce = GenericArray::from_slice(nonce);
    let payload = Payload {
        msg: request.message,
        aad: request.aad,
    };
    match request.direction {
        Direction::Open => cipher.decrypt(nonce, payload).map_err(|_| {
            RecoverError::with_kind(
                ErrorCategory::User,
                ErrorKind::AuthenticationFailed,
                "corrupt input, tampered-with data, or bad credentials",
            )
        }),
        Direction::Seal => cipher.encrypt(nonce, payload).map_err(|_| {
            RecoverError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidParameters,
                "message too long for the CCM nonce length",
            )
        }),
    }
}

fn unreachable_size(what: &str, len: usize) -> RecoverError {
    RecoverError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::InternalInvariant,
        format!("no AES-CCM variant for a {}-byte {}", len, what),
    )
}
