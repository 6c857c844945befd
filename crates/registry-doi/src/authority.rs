//! The DOI registration authority boundary (DataCite)

use async_trait::async_trait;
use registry_types::Doi;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

#[derive(Debug, Error)]
pub enum AuthorityError {
    /// Temporary failure; the command may be retried
    #[error("authority unavailable: {0}")]
    Unavailable(String),

    /// The authority refused the request
    #[error("authority rejected request: {0}")]
    Rejected(String),
}

impl AuthorityError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthorityError::Unavailable(_))
    }
}

/// Operations the registration worker needs from the authority
#[async_trait]
pub trait DoiAuthority: Send + Sync {
    async fn exists(&self, doi: &Doi) -> Result<bool, AuthorityError>;

    /// First registration of a DOI with its landing page and metadata
    async fn register(&self, doi: &Doi, target: &Url, metadata: &str)
        -> Result<(), AuthorityError>;

    /// Replace target and metadata of a registered DOI
    async fn update(&self, doi: &Doi, target: &Url, metadata: &str) -> Result<(), AuthorityError>;

    /// Remove a DOI that was reserved but never registered
    async fn delete(&self, doi: &Doi) -> Result<(), AuthorityError>;
}

/// A registration held by [`RecordingAuthority`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityEntry {
    pub target: Url,
    pub metadata: String,
}

/// In-process authority that records what it was asked to do.
///
/// Used by the daemon when no external authority is configured, and by tests.
#[derive(Debug, Default)]
pub struct RecordingAuthority {
    entries: RwLock<HashMap<Doi, AuthorityEntry>>,
    calls: AtomicU32,
    failures_left: AtomicU32,
}

impl RecordingAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` calls with [`AuthorityError::Unavailable`]
    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub async fn entry(&self, doi: &Doi) -> Option<AuthorityEntry> {
        self.entries.read().await.get(doi).cloned()
    }

    /// Number of calls received, failed ones included
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), AuthorityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        match injected {
            Ok(_) => Err(AuthorityError::Unavailable("injected failure".into())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl DoiAuthority for RecordingAuthority {
    async fn exists(&self, doi: &Doi) -> Result<bool, AuthorityError> {
        self.check_available()?;
        Ok(self.entries.read().await.contains_key(doi))
    }

    async fn register(
        &self,
        doi: &Doi,
        target: &Url,
        metadata: &str,
    ) -> Result<(), AuthorityError> {
        self.check_available()?;
        self.entries.write().await.insert(
            doi.clone(),
            AuthorityEntry {
                target: target.clone(),
                metadata: metadata.to_string(),
            },
        );
        Ok(())
    }

    async fn update(&self, doi: &Doi, target: &Url, metadata: &str) -> Result<(), AuthorityError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(doi)
            .ok_or_else(|| AuthorityError::Rejected(format!("DOI {} is not registered", doi)))?;
        entry.target = target.clone();
        entry.metadata = metadata.to_string();
        Ok(())
    }

    async fn delete(&self, doi: &Doi) -> Result<(), AuthorityError> {
        self.check_available()?;
        self.entries.write().await.remove(doi);
        Ok(())
    }
}
