//! Candidate name/passphrase lists
//!
//! A list file holds whitespace-separated tokens, one candidate per token,
//! so a candidate can never contain whitespace. Candidates with spaces are
//! given inline instead.

use std::fs;
use std::path::Path;

use crate::error::{ErrorCategory, ErrorKind, RecoverError, Result};

/// Split list text into candidates, preserving order and duplicates.
pub fn parse(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Read and split a candidate list file.
pub fn read_file(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).map_err(|e| {
        RecoverError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::CandidatesUnavailable,
            format!("failed to read candidate list {}", path.display()),
            e,
        )
    })?;
    let text = String::from_utf8(bytes).map_err(|e| {
        RecoverError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::CandidatesUnavailable,
            format!("candidate list {} is not valid UTF-8", path.display()),
            e,
        )
    })?;
    let candidates = parse(&text);
    tracing::debug!(path = %path.display(), count = candidates.len(), "read candidate list");
    Ok(candidates)
}
