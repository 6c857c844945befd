//! Registry entities that carry a DOI

use crate::doi::{Doi, DoiKind};
use crate::identifier::AlternateIdentifier;
use crate::ids::EntityKey;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

/// The registry entity kinds that take part in the DOI lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Dataset,
    Download,
    DerivedDataset,
}

impl EntityKind {
    /// Kind of DOI minted for this entity kind
    pub fn doi_kind(&self) -> DoiKind {
        match self {
            EntityKind::Dataset => DoiKind::Dataset,
            EntityKind::Download => DoiKind::Download,
            EntityKind::DerivedDataset => DoiKind::DerivedDataset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Dataset => "dataset",
            EntityKind::Download => "download",
            EntityKind::DerivedDataset => "derived_dataset",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The DOI-bearing view of a registry entity.
///
/// An entity owns exactly one active DOI (absent only while one is being
/// issued) and an ordered identifier history, oldest first.
pub trait Registrable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn entity_key(&self) -> EntityKey;

    fn doi(&self) -> Option<&Doi>;

    fn set_doi(&mut self, doi: Option<Doi>);

    fn identifiers(&self) -> &[AlternateIdentifier];

    fn identifiers_mut(&mut self) -> &mut Vec<AlternateIdentifier>;

    /// Stamp the entity as modified by `user` at `at`
    fn touch(&mut self, user: &str, at: DateTime<Utc>);

    /// Take creator and creation time over from the stored version
    fn keep_creation(&mut self, stored: &Self);
}

/// A registered dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default = "Uuid::new_v4")]
    pub key: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub publishing_organization: Option<String>,
    /// Parent dataset, e.g. for constituents of a checklist
    #[serde(default)]
    pub parent_dataset_key: Option<Uuid>,
    #[serde(default)]
    pub doi: Option<Doi>,
    #[serde(default)]
    pub identifiers: Vec<AlternateIdentifier>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub modified_by: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
}

impl Dataset {
    pub fn new(title: impl Into<String>, created_by: impl Into<String>) -> Self {
        let created_by = created_by.into();
        let now = Utc::now();
        Self {
            key: Uuid::new_v4(),
            title: title.into(),
            description: None,
            publishing_organization: None,
            parent_dataset_key: None,
            doi: None,
            identifiers: Vec::new(),
            modified_by: created_by.clone(),
            created_by,
            created: now,
            modified: now,
        }
    }

    pub fn with_doi(mut self, doi: Doi) -> Self {
        self.doi = Some(doi);
        self
    }
}

impl Registrable for Dataset {
    const KIND: EntityKind = EntityKind::Dataset;

    fn entity_key(&self) -> EntityKey {
        EntityKey::from_uuid(Self::KIND, self.key)
    }

    fn doi(&self) -> Option<&Doi> {
        self.doi.as_ref()
    }

    fn set_doi(&mut self, doi: Option<Doi>) {
        self.doi = doi;
    }

    fn identifiers(&self) -> &[AlternateIdentifier] {
        &self.identifiers
    }

    fn identifiers_mut(&mut self) -> &mut Vec<AlternateIdentifier> {
        &mut self.identifiers
    }

    fn touch(&mut self, user: &str, at: DateTime<Utc>) {
        self.modified_by = user.to_string();
        self.modified = at;
    }

    fn keep_creation(&mut self, stored: &Self) {
        self.created_by = stored.created_by.clone();
        self.created = stored.created;
    }
}

/// Status of an occurrence/event download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadStatus {
    Preparing,
    Running,
    Suspended,
    Succeeded,
    Cancelled,
    Killed,
    Failed,
    FileErased,
}

impl DownloadStatus {
    /// Killed, cancelled and failed downloads must not keep a resolvable DOI
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            DownloadStatus::Killed | DownloadStatus::Cancelled | DownloadStatus::Failed
        )
    }

    /// The download file can be fetched
    pub fn is_available(self) -> bool {
        self == DownloadStatus::Succeeded
    }

    /// The download finished successfully at some point
    pub fn has_succeeded(self) -> bool {
        matches!(self, DownloadStatus::Succeeded | DownloadStatus::FileErased)
    }
}

fn default_download_status() -> DownloadStatus {
    DownloadStatus::Preparing
}

/// An occurrence or event download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Download {
    pub key: String,
    #[serde(default = "default_download_status")]
    pub status: DownloadStatus,
    /// Query or predicate that produced the download (opaque)
    #[serde(default)]
    pub request: serde_json::Value,
    #[serde(default)]
    pub total_records: u64,
    #[serde(default)]
    pub doi: Option<Doi>,
    #[serde(default)]
    pub identifiers: Vec<AlternateIdentifier>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub modified_by: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
}

impl Download {
    pub fn new(key: impl Into<String>, created_by: impl Into<String>) -> Self {
        let created_by = created_by.into();
        let now = Utc::now();
        Self {
            key: key.into(),
            status: DownloadStatus::Preparing,
            request: serde_json::Value::Null,
            total_records: 0,
            doi: None,
            identifiers: Vec::new(),
            modified_by: created_by.clone(),
            created_by,
            created: now,
            modified: now,
        }
    }
}

impl Registrable for Download {
    const KIND: EntityKind = EntityKind::Download;

    fn entity_key(&self) -> EntityKey {
        EntityKey::new(Self::KIND, self.key.clone())
    }

    fn doi(&self) -> Option<&Doi> {
        self.doi.as_ref()
    }

    fn set_doi(&mut self, doi: Option<Doi>) {
        self.doi = doi;
    }

    fn identifiers(&self) -> &[AlternateIdentifier] {
        &self.identifiers
    }

    fn identifiers_mut(&mut self) -> &mut Vec<AlternateIdentifier> {
        &mut self.identifiers
    }

    fn touch(&mut self, user: &str, at: DateTime<Utc>) {
        self.modified_by = user.to_string();
        self.modified = at;
    }

    fn keep_creation(&mut self, stored: &Self) {
        self.created_by = stored.created_by.clone();
        self.created = stored.created;
    }
}

/// A derived dataset citing a set of source datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedDataset {
    #[serde(default = "Uuid::new_v4")]
    pub key: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Where the derived data is hosted; the DOI resolves here
    pub target: Url,
    #[serde(default)]
    pub related_datasets: Vec<Uuid>,
    #[serde(default)]
    pub doi: Option<Doi>,
    #[serde(default)]
    pub identifiers: Vec<AlternateIdentifier>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub modified_by: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
}

impl DerivedDataset {
    pub fn new(title: impl Into<String>, target: Url, created_by: impl Into<String>) -> Self {
        let created_by = created_by.into();
        let now = Utc::now();
        Self {
            key: Uuid::new_v4(),
            title: title.into(),
            description: None,
            target,
            related_datasets: Vec::new(),
            doi: None,
            identifiers: Vec::new(),
            modified_by: created_by.clone(),
            created_by,
            created: now,
            modified: now,
        }
    }
}

impl Registrable for DerivedDataset {
    const KIND: EntityKind = EntityKind::DerivedDataset;

    fn entity_key(&self) -> EntityKey {
        EntityKey::from_uuid(Self::KIND, self.key)
    }

    fn doi(&self) -> Option<&Doi> {
        self.doi.as_ref()
    }

    fn set_doi(&mut self, doi: Option<Doi>) {
        self.doi = doi;
    }

    fn identifiers(&self) -> &[AlternateIdentifier] {
        &self.identifiers
    }

    fn identifiers_mut(&mut self) -> &mut Vec<AlternateIdentifier> {
        &mut self.identifiers
    }

    fn touch(&mut self, user: &str, at: DateTime<Utc>) {
        self.modified_by = user.to_string();
        self.modified = at;
    }

    fn keep_creation(&mut self, stored: &Self) {
        self.created_by = stored.created_by.clone();
        self.created = stored.created;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_and_available_download_states() {
        assert!(DownloadStatus::Killed.is_failed());
        assert!(DownloadStatus::Cancelled.is_failed());
        assert!(DownloadStatus::Failed.is_failed());
        assert!(!DownloadStatus::FileErased.is_failed());

        assert!(DownloadStatus::Succeeded.is_available());
        assert!(!DownloadStatus::FileErased.is_available());
        assert!(DownloadStatus::FileErased.has_succeeded());
    }

    #[test]
    fn submitted_entities_fill_in_bookkeeping_fields() {
        let dataset: Dataset = serde_json::from_str(r#"{"title": "Birds"}"#).unwrap();
        assert!(dataset.doi.is_none());
        assert!(dataset.created_by.is_empty());

        let download: Download =
            serde_json::from_str(r#"{"key": "0000001-200101", "doi": "doi:10.5072/DL.ABC"}"#)
                .unwrap();
        assert_eq!(download.status, DownloadStatus::Preparing);
        assert_eq!(download.doi.unwrap().to_string(), "10.5072/dl.abc");
    }

    #[test]
    fn entity_keys_carry_their_kind() {
        let dataset = Dataset::new("Birds of Denmark", "alice");
        let download = Download::new("0001005-200612094004401", "bob");

        assert_eq!(dataset.entity_key().kind, EntityKind::Dataset);
        assert_eq!(
            download.entity_key().to_string(),
            "download:0001005-200612094004401"
        );
        assert_eq!(EntityKind::Download.doi_kind(), DoiKind::Download);
    }
}
