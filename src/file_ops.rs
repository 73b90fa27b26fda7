//! Wallet file operations
//!
//! Loading a wallet blob, unlocking it with a single known credential, and
//! writing a re-sealed stub copy whose seed has been replaced.

use crate::blobcrypt::{self, CcmSuite};
use crate::envelope::Envelope;
use crate::error::{ErrorCategory, ErrorKind, RecoverError, Result};
use crate::kdf::{KdfParams, Scheme};
use crate::passphrase::PassphraseReader;
use crate::payload::WalletPayload;
use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use zeroize::Zeroizing;

/// A wallet opened with a known credential.
pub struct Unlocked {
    pub scheme: Scheme,
    /// The derived key, kept so a stub can be sealed under it.
    pub key: Zeroizing<Vec<u8>>,
    pub payload: WalletPayload,
}

impl fmt::Debug for Unlocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unlocked")
            .field("scheme", &self.scheme)
            .field("key", &"<redacted>")
            .field("payload", &self.payload)
            .finish()
    }
}

/// Read and decode a wallet blob. `-` reads from stdin.
///
/// The blob is base64 text; line breaks and surrounding whitespace are
/// ignored.
pub fn load_envelope(path: &Path) -> Result<Envelope> {
    let bytes = if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf).map_err(|e| {
            RecoverError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to read wallet from stdin",
                e,
            )
        })?;
        buf
    } else {
        fs::read(path).map_err(|e| read_error(path, e))?
    };
    let text = String::from_utf8(bytes).map_err(|e| {
        RecoverError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::EnvelopeFormat,
            "wallet file is not valid UTF-8",
            e,
        )
    })?;
    Envelope::decode(&text)
        .map_err(|e| e.with_context(format!("failed to decode wallet {}", path.display())))
}

/// Unlock `envelope` with one credential, trying each scheme in turn.
///
/// Name and passphrase are trimmed like search candidates. If no scheme
/// authenticates the result is [`ErrorKind::AuthenticationFailed`].
pub fn decrypt_wallet(envelope: &Envelope, name: &str, passphrase: &str) -> Result<Unlocked> {
    let suite = CcmSuite::for_envelope(envelope)?;
    let kdf = KdfParams::for_envelope(envelope)?;
    let (name, passphrase) = (name.trim(), passphrase.trim());

    for scheme in Scheme::ALL {
        let key = kdf.derive(name, passphrase, scheme);
        let plaintext = match suite.open(&key) {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(e) if !e.is_fatal() => {
                tracing::debug!(%scheme, "scheme did not authenticate");
                continue;
            }
            Err(e) => return Err(e),
        };
        let payload = WalletPayload::decode(&plaintext)
            .map_err(|e| e.with_context(format!("wallet opened with {} scheme", scheme)))?;
        tracing::info!(%scheme, account_id = %payload.account_id, "wallet unlocked");
        return Ok(Unlocked {
            scheme,
            key,
            payload,
        });
    }

    Err(RecoverError::with_kind(
        ErrorCategory::User,
        ErrorKind::AuthenticationFailed,
        format!("wrong name or passphrase for name={}", name),
    ))
}

/// Unlock `envelope` with a passphrase obtained from `passphrase_reader`.
pub fn unlock_wallet(
    envelope: &Envelope,
    name: &str,
    passphrase_reader: &mut dyn PassphraseReader,
) -> Result<Unlocked> {
    let passphrase = passphrase_reader.read_passphrase()?;
    decrypt_wallet(envelope, name, &passphrase)
}

/// Write a stub copy of an unlocked wallet to `output_path`.
///
/// The stub carries `seed` in place of the real master seed and is sealed
/// under the same key with a fresh IV, so the original credential opens it.
/// Every other envelope and payload field is kept. The file is replaced
/// atomically (tempfile + fsync + rename) and is created with mode 0o600
/// on Unix systems.
pub fn write_stub(
    envelope: &Envelope,
    unlocked: &Unlocked,
    seed: &str,
    output_path: &Path,
) -> Result<Envelope> {
    let mut payload = unlocked.payload.clone();
    payload.master_seed = seed.to_string();
    let plaintext = Zeroizing::new(payload.encode()?);

    let stub = blobcrypt::seal(envelope, &unlocked.key, &plaintext)
        .map_err(|e| e.with_context("failed to seal stub"))?;
    let text = stub.encode()?;
    write_file_atomic(output_path, text.as_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;

    tracing::info!(path = %output_path.display(), "wrote stub wallet");
    Ok(stub)
}

fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        RecoverError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to create tempfile",
            e,
        )
    })?;

    temp_file.write_all(contents).map_err(|e| {
        RecoverError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to tempfile",
            e,
        )
    })?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file.flush().map_err(|e| {
        RecoverError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        RecoverError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| {
                RecoverError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to set tempfile permissions",
                    e,
                )
            })?;
    }
    temp_file.persist(path).map_err(|e| {
        RecoverError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

fn read_error(path: &Path, err: io::Error) -> RecoverError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    RecoverError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::CipherMode;
    use crate::passphrase::ConstantPassphraseReader;
    use crate::payload::ZERO_SEED;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn testdata(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name)
    }

    #[test]
    fn test_load_line_wrapped_wallet() {
        let text = fs::read_to_string(testdata("wallet-legacy.txt")).unwrap();
        let wrapped: String = text
            .trim()
            .as_bytes()
            .chunks(64)
            .map(|line| format!("{}\n", String::from_utf8_lossy(line)))
            .collect();

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wrapped.txt");
        fs::write(&path, wrapped).unwrap();

        let envelope = load_envelope(&path).unwrap();
        assert_eq!(envelope, load_envelope(&testdata("wallet-legacy.txt")).unwrap());
        assert_eq!(envelope.additional_data, "ripple%20wallet");
    }

    #[test]
    fn test_load_missing_wallet() {
        let temp_dir = TempDir::new().unwrap();
        let err = load_envelope(&temp_dir.path().join("nope.txt")).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::Io));
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    fn test_load_garbage_wallet() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("garbage.txt");
        fs::write(&path, "this is not base64!").unwrap();

        let err = load_envelope(&path).expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::EnvelopeFormat));
    }

    #[test]
    fn test_decrypt_versioned_wallet() {
        let envelope = load_envelope(&testdata("wallet-versioned.txt")).unwrap();
        let unlocked = decrypt_wallet(&envelope, "rippler", "correct horse battery").unwrap();

        assert_eq!(unlocked.scheme, Scheme::Versioned);
        assert_eq!(unlocked.payload.master_seed, "snoPBrXtMeMyMHUVTgbuqAfg1SUTb");
        assert_eq!(
            hex::encode(&*unlocked.key),
            "aef35e756d9a2588d84a9be6aba2d19250d94bbbe2a9ab91e871fb2bb08028c5"
        );
    }

    #[test]
    fn test_decrypt_legacy_wallet() {
        let envelope = load_envelope(&testdata("wallet-legacy.txt")).unwrap();
        let unlocked = decrypt_wallet(&envelope, " satoshi", "hunter2\n").unwrap();

        assert_eq!(unlocked.scheme, Scheme::Legacy);
        assert_eq!(unlocked.payload.account_id, "rMzJ7kNBsVCeR5S8MRNLHXMc8pBhUk7cnK");
    }

    #[test]
    fn test_decrypt_wrong_passphrase() {
        let envelope = load_envelope(&testdata("wallet-legacy.txt")).unwrap();
        let err = decrypt_wallet(&envelope, "satoshi", "hunter3").expect_err("expected error");

        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        assert!(!err.message().contains("hunter3"));
    }

    #[test]
    fn test_decrypt_cbc_wallet() {
        let envelope = load_envelope(&testdata("wallet-cbc.txt")).unwrap();
        assert_eq!(envelope.mode, CipherMode::Cbc);

        let err = decrypt_wallet(&envelope, "rippler", "correct horse battery")
            .expect_err("expected error");
        assert_eq!(err.kind, Some(ErrorKind::UnsupportedMode));
    }

    #[test]
    fn test_unlock_with_reader() {
        let envelope = load_envelope(&testdata("wallet-versioned.txt")).unwrap();
        let mut reader = ConstantPassphraseReader::new("correct horse battery\n");
        let unlocked = unlock_wallet(&envelope, "rippler", &mut reader).unwrap();
        assert_eq!(unlocked.scheme, Scheme::Versioned);
    }

    #[test]
    fn test_write_stub() {
        let temp_dir = TempDir::new().unwrap();
        let stub_path = temp_dir.path().join("stub.txt");
        let envelope = load_envelope(&testdata("wallet-legacy.txt")).unwrap();
        let unlocked = decrypt_wallet(&envelope, "satoshi", "hunter2").unwrap();

        let stub = write_stub(&envelope, &unlocked, ZERO_SEED, &stub_path).unwrap();
        assert_eq!(stub.iv.len(), envelope.iv.len());
        assert_ne!(stub.iv, envelope.iv);
        assert_eq!(stub.additional_data, envelope.additional_data);
        assert_eq!(stub.salt, envelope.salt);
        assert_eq!(stub.iterations, envelope.iterations);

        let reloaded = load_envelope(&stub_path).unwrap();
        assert_eq!(reloaded, stub);
        let reopened = decrypt_wallet(&reloaded, "satoshi", "hunter2").unwrap();
        assert_eq!(reopened.scheme, Scheme::Legacy);
        assert_eq!(reopened.payload.master_seed, ZERO_SEED);

        let mut expected = unlocked.payload.clone();
        expected.master_seed = ZERO_SEED.to_string();
        assert_eq!(reopened.payload, expected);
    }

    #[test]
    fn test_write_stub_replaces_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let stub_path = temp_dir.path().join("stub.txt");
        fs::write(&stub_path, "old contents").unwrap();

        let envelope = load_envelope(&testdata("wallet-versioned.txt")).unwrap();
        let unlocked = decrypt_wallet(&envelope, "rippler", "correct horse battery").unwrap();
        write_stub(&envelope, &unlocked, "sCustomSeed", &stub_path).unwrap();

        let reopened =
            decrypt_wallet(&load_envelope(&stub_path).unwrap(), "rippler", "correct horse battery")
                .unwrap();
        assert_eq!(reopened.payload.master_seed, "sCustomSeed");
    }

    #[test]
    #[cfg(unix)]
    fn test_stub_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let stub_path = temp_dir.path().join("stub.txt");
        let envelope = load_envelope(&testdata("wallet-versioned.txt")).unwrap();
        let unlocked = decrypt_wallet(&envelope, "rippler", "correct horse battery").unwrap();
        write_stub(&envelope, &unlocked, ZERO_SEED, &stub_path).unwrap();

        let metadata = fs::metadata(&stub_path).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_unlocked_debug_redacts_key() {
        let envelope = load_envelope(&testdata("wallet-versioned.txt")).unwrap();
        let unlocked = decrypt_wallet(&envelope, "rippler", "correct horse battery").unwrap();
        let rendered = format!("{:?}", unlocked);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("aef35e75"));
    }
}
