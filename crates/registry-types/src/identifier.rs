//! Alternate identifiers attached to registry entities

use crate::doi::Doi;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of an alternate identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierType {
    Doi,
    Url,
    Lsid,
    Handle,
    Uuid,
    Unknown,
}

impl IdentifierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierType::Doi => "DOI",
            IdentifierType::Url => "URL",
            IdentifierType::Lsid => "LSID",
            IdentifierType::Handle => "HANDLE",
            IdentifierType::Uuid => "UUID",
            IdentifierType::Unknown => "UNKNOWN",
        }
    }

    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "DOI" => IdentifierType::Doi,
            "URL" => IdentifierType::Url,
            "LSID" => IdentifierType::Lsid,
            "HANDLE" => IdentifierType::Handle,
            "UUID" => IdentifierType::Uuid,
            _ => IdentifierType::Unknown,
        }
    }
}

/// One entry of an entity's identifier history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternateIdentifier {
    /// Storage key; `None` until persisted
    #[serde(default)]
    pub key: Option<i64>,
    #[serde(rename = "type")]
    pub identifier_type: IdentifierType,
    pub identifier: String,
    pub created_by: String,
    pub created: DateTime<Utc>,
}

impl AlternateIdentifier {
    pub fn new(
        identifier_type: IdentifierType,
        identifier: impl Into<String>,
        created_by: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            key: None,
            identifier_type,
            identifier: identifier.into(),
            created_by: created_by.into(),
            created,
        }
    }

    /// A DOI-typed entry recording a superseded DOI
    pub fn doi(doi: &Doi, created_by: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self::new(IdentifierType::Doi, doi.doi_name(), created_by, created)
    }

    /// The DOI held by a DOI-typed entry, if it parses
    pub fn as_doi(&self) -> Option<Doi> {
        if self.identifier_type != IdentifierType::Doi {
            return None;
        }
        Doi::parse(&self.identifier).ok()
    }

    /// True when the value denotes `doi`, whatever the declared type
    pub fn has_doi_value(&self, doi: &Doi) -> bool {
        Doi::parse(&self.identifier).is_ok_and(|parsed| &parsed == doi)
    }
}
