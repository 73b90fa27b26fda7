use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input (a malformed wallet, an unusable
    /// candidate list) or asked for something this tool cannot do.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The wallet envelope is malformed: bad base64, bad JSON, or a field
    /// that does not decode.
    EnvelopeFormat,
    /// The envelope names a block cipher other than AES.
    UnsupportedCipher,
    /// The envelope names a cipher mode other than CCM. CBC lands here too,
    /// since it cannot authenticate the plaintext.
    UnsupportedMode,
    /// Envelope parameters are out of range: key/tag sizes, iteration
    /// count, nonce length, or a tag longer than the ciphertext.
    InvalidParameters,
    /// Tag verification failed. For a search this only disqualifies the
    /// candidate that was tried.
    AuthenticationFailed,
    /// The tag verified but the plaintext is not a wallet payload.
    PayloadFormat,
    /// No usable name or passphrase candidates.
    CandidatesUnavailable,
    /// Passphrase could not be obtained from the configured reader.
    PassphraseUnavailable,
    /// The OS random number generator failed.
    EntropyUnavailable,
    /// Unexpected state reached within wallet-recover logic.
    InternalInvariant,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct RecoverError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl RecoverError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Whether this error ends a search. Only a failed tag check is
    /// recoverable; it rules out one candidate and nothing more.
    pub fn is_fatal(&self) -> bool {
        self.kind != Some(ErrorKind::AuthenticationFailed)
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RecoverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_kind_and_source() {
        let inner = RecoverError::with_kind(
            ErrorCategory::User,
            ErrorKind::UnsupportedMode,
            "unsupported cipher mode \"cbc\"",
        );
        let outer = inner.with_context("failed to prepare decryption");

        assert_eq!(outer.kind, Some(ErrorKind::UnsupportedMode));
        assert_eq!(outer.category, ErrorCategory::User);
        assert_eq!(outer.message(), "failed to prepare decryption");
        let source = outer.source_error().expect("expected wrapped source");
        assert_eq!(source.to_string(), "unsupported cipher mode \"cbc\"");
    }

    #[test]
    fn test_only_auth_failure_is_recoverable() {
        let auth = RecoverError::with_kind(
            ErrorCategory::User,
            ErrorKind::AuthenticationFailed,
            "tag mismatch",
        );
        assert!(!auth.is_fatal());
        assert!(!auth.with_context("candidate rejected").is_fatal());

        let payload =
            RecoverError::with_kind(ErrorCategory::User, ErrorKind::PayloadFormat, "bad json");
        assert!(payload.is_fatal());

        let untagged = RecoverError::new(ErrorCategory::Internal, "something else");
        assert!(untagged.is_fatal());
    }
}
