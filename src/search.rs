//! Credential search over name × passphrase × scheme
//!
//! Candidates are tried in a fixed canonical order: names in list order,
//! then passphrases in list order, then [`Scheme::ALL`]. The first
//! credential whose key authenticates the ciphertext and whose plaintext
//! decodes as a wallet payload wins, in both sequential and parallel runs.

use std::fmt;

use rayon::prelude::*;

use crate::blobcrypt::CcmSuite;
use crate::envelope::Envelope;
use crate::error::{ErrorCategory, ErrorKind, RecoverError, Result};
use crate::kdf::{KdfParams, Scheme};
use crate::payload::WalletPayload;

const PROGRESS_INTERVAL: usize = 1000;

/// A name/passphrase pair together with the scheme that joined them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub name: String,
    pub passphrase: String,
    pub scheme: Scheme,
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name={} ({})", self.name, self.scheme)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    pub credential: Credential,
    pub payload: WalletPayload,
    /// 1-based position of the winning credential in canonical order.
    pub attempt: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Box<Recovery>),
    /// Every candidate was tried and none matched.
    Exhausted { attempts: u64 },
}

/// What to do when a key authenticates but the plaintext is not a payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadErrorPolicy {
    /// Stop the search and report the payload error.
    #[default]
    Abort,
    /// Log a warning and treat the candidate as a non-match.
    Continue,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub parallel: bool,
    pub on_payload_error: PayloadErrorPolicy,
}

/// A search prepared against one parsed envelope.
///
/// Construction validates everything that does not depend on a credential,
/// so an unusable envelope fails before the first key is derived.
pub struct CandidateSearch<'a> {
    kdf: KdfParams<'a>,
    suite: CcmSuite<'a>,
    names: &'a [String],
    passphrases: &'a [String],
    total: usize,
    options: SearchOptions,
}

impl<'a> CandidateSearch<'a> {
    pub fn new(
        envelope: &'a Envelope,
        names: &'a [String],
        passphrases: &'a [String],
        options: SearchOptions,
    ) -> Result<Self> {
        let suite = CcmSuite::for_envelope(envelope)?;
        let kdf = KdfParams::for_envelope(envelope)?;

        if names.is_empty() {
            return Err(no_candidates("no name candidates supplied"));
        }
        if passphrases.is_empty() {
            return Err(no_candidates("no passphrase candidates supplied"));
        }
        let total = names
            .len()
            .checked_mul(passphrases.len())
            .and_then(|n| n.checked_mul(Scheme::ALL.len()))
            .ok_or_else(|| no_candidates("candidate space is too large to enumerate"))?;

        Ok(Self {
            kdf,
            suite,
            names,
            passphrases,
            total,
            options,
        })
    }

    /// Number of credentials the search tries if nothing matches.
    pub fn total_attempts(&self) -> u64 {
        self.total as u64
    }

    pub fn run(&self) -> Result<SearchOutcome> {
        tracing::info!(
            names = self.names.len(),
            passphrases = self.passphrases.len(),
            attempts = self.total,
            parallel = self.options.parallel,
            "starting search"
        );

        let found = if self.options.parallel {
            (0..self.total)
                .into_par_iter()
                .find_map_first(|index| self.attempt(index))
        } else {
            (0..self.total).find_map(|index| {
                if index > 0 && index % PROGRESS_INTERVAL == 0 {
                    tracing::debug!(tried = index, of = self.total, "search progress");
                }
                self.attempt(index)
            })
        };

        match found.transpose()? {
            Some(recovery) => {
                tracing::info!(
                    attempt = recovery.attempt,
                    scheme = %recovery.credential.scheme,
                    account_id = %recovery.payload.account_id,
                    "credential found"
                );
                Ok(SearchOutcome::Found(Box::new(recovery)))
            }
            None => {
                tracing::info!(attempts = self.total, "search exhausted without a match");
                Ok(SearchOutcome::Exhausted {
                    attempts: self.total_attempts(),
                })
            }
        }
    }

    /// Coordinates of the `index`-th credential in canonical order.
    fn coordinates(&self, index: usize) -> (&str, &str, Scheme) {
        let schemes = Scheme::ALL.len();
        let scheme = Scheme::ALL[index % schemes];
        let pair = index / schemes;
        let passphrase = &self.passphrases[pair % self.passphrases.len()];
        let name = &self.names[pair / self.passphrases.len()];
        (name.trim(), passphrase.trim(), scheme)
    }

    /// Try one credential. `None` means "not this one, keep going".
    fn attempt(&self, index: usize) -> Option<Result<Recovery>> {
        let (name, passphrase, scheme) = self.coordinates(index);
        let key = self.kdf.derive(name, passphrase, scheme);

        let plaintext = match self.suite.open(&key) {
            Ok(plaintext) => plaintext,
            Err(e) if !e.is_fatal() => {
                tracing::trace!(attempt = index + 1, %scheme, "tag mismatch");
                return None;
            }
            Err(e) => return Some(Err(e)),
        };

        let credential = Credential {
            name: name.to_string(),
            passphrase: passphrase.to_string(),
            scheme,
        };
        match WalletPayload::decode(&plaintext) {
            Ok(payload) => Some(Ok(Recovery {
                credential,
                payload,
                attempt: index as u64 + 1,
            })),
            Err(e) => match self.options.on_payload_error {
                PayloadErrorPolicy::Abort => Some(Err(e.with_context(format!(
                    "candidate {} authenticated but did not decode",
                    credential
                )))),
                PayloadErrorPolicy::Continue => {
                    tracing::warn!(
                        attempt = index + 1,
                        %credential,
                        error = %e,
                        "authenticated plaintext is not a wallet payload, continuing"
                    );
                    None
                }
            },
        }
    }
}

/// Search `envelope` with the given candidates.
pub fn search(
    envelope: &Envelope,
    names: &[String],
    passphrases: &[String],
    options: SearchOptions,
) -> Result<SearchOutcome> {
    CandidateSearch::new(envelope, names, passphrases, options)?.run()
}

fn no_candidates(msg: &str) -> RecoverError {
    RecoverError::with_kind(ErrorCategory::User, ErrorKind::CandidatesUnavailable, msg)
}
