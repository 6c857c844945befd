//! GBIF DOI issuance

use crate::error::{DoiError, DoiResult};
use rand::Rng;
use registry_storage::{DoiStore, StorageError};
use registry_types::{Doi, DoiKind, GbifPrefix};
use std::sync::Arc;

/// Characters used for random suffixes. Glyphs that are easily confused
/// (0/o, 1/l/i) are left out.
pub const SUFFIX_ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";

/// Length of the random part of a suffix
pub const RANDOM_LENGTH: usize = 6;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Attempts after which a collision streak is worth a warning
const WARN_AFTER_ATTEMPTS: u32 = 100;

/// Mints DOIs under the deployment prefix.
///
/// Uniqueness comes from the DOI store: a suffix is only handed out once the
/// store accepted it as a NEW record.
pub struct DoiIssuer {
    prefix: GbifPrefix,
    store: Arc<dyn DoiStore>,
    max_attempts: u32,
}

impl DoiIssuer {
    pub fn new(prefix: GbifPrefix, store: Arc<dyn DoiStore>, max_attempts: u32) -> Self {
        Self {
            prefix,
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn prefix(&self) -> &GbifPrefix {
        &self.prefix
    }

    /// True when `doi` was issued under this deployment's prefix
    pub fn is_gbif(&self, doi: &Doi) -> bool {
        self.prefix.owns(doi)
    }

    /// Reserve a fresh DOI of the given kind with status NEW.
    pub async fn new_doi(&self, kind: DoiKind) -> DoiResult<Doi> {
        for attempt in 1..=self.max_attempts {
            let doi = self.random_doi(kind)?;
            match self.store.create_doi(&doi, kind).await {
                Ok(()) => {
                    if attempt > WARN_AFTER_ATTEMPTS {
                        tracing::warn!(
                            doi = %doi,
                            attempts = attempt,
                            "Issued DOI after many collisions, consider a longer suffix"
                        );
                    }
                    tracing::debug!(doi = %doi, kind = %kind, "Issued new DOI");
                    return Ok(doi);
                }
                Err(StorageError::Conflict(_)) => {
                    tracing::debug!(doi = %doi, attempt, "DOI already taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(
            kind = %kind,
            attempts = self.max_attempts,
            "Failed to issue a unique DOI"
        );
        Err(DoiError::IssuanceExhausted {
            kind,
            attempts: self.max_attempts,
        })
    }

    fn random_doi(&self, kind: DoiKind) -> DoiResult<Doi> {
        let mut rng = rand::thread_rng();
        let mut suffix = String::with_capacity(kind.shoulder().len() + RANDOM_LENGTH);
        suffix.push_str(kind.shoulder());
        for _ in 0..RANDOM_LENGTH {
            let index = rng.gen_range(0..SUFFIX_ALPHABET.len());
            suffix.push(SUFFIX_ALPHABET[index] as char);
        }

        issued_doi(&self.prefix, &suffix)
    }
}

fn issued_doi(prefix: &GbifPrefix, suffix: &str) -> DoiResult<Doi> {
    prefix
        .doi(suffix)
        .map_err(|e| DoiError::Internal(format!("generated suffix {:?}: {}", suffix, e)))
}
