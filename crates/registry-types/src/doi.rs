//! Digital Object Identifier values
//!
//! DOI names are case-insensitive, so both parts are normalized to lowercase
//! on construction and equality stays structural.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Resolver prefixes accepted in front of a DOI name
const RESOLVER_PREFIXES: [&str; 5] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// Errors raised while parsing a DOI
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DoiParseError {
    #[error("DOI must not be empty")]
    Empty,

    #[error("DOI {0} has no prefix/suffix separator")]
    MissingSeparator(String),

    #[error("DOI prefix {0} must begin with '10.'")]
    InvalidPrefix(String),

    #[error("DOI {0} has an empty suffix")]
    EmptySuffix(String),
}

/// An immutable DOI value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Doi {
    prefix: String,
    suffix: String,
}

impl Doi {
    /// Build a DOI from its two parts
    pub fn new(prefix: impl AsRef<str>, suffix: impl AsRef<str>) -> Result<Self, DoiParseError> {
        let prefix = prefix.as_ref().trim().to_lowercase();
        let suffix = suffix.as_ref().trim().to_lowercase();

        validate_prefix(&prefix)?;
        if suffix.is_empty() {
            return Err(DoiParseError::EmptySuffix(prefix));
        }

        Ok(Self { prefix, suffix })
    }

    /// Parse a DOI name, with or without a resolver prefix
    pub fn parse(value: &str) -> Result<Self, DoiParseError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DoiParseError::Empty);
        }

        let name = strip_resolver(trimmed);
        let (prefix, suffix) = name
            .split_once('/')
            .ok_or_else(|| DoiParseError::MissingSeparator(trimmed.to_string()))?;

        Self::new(prefix, suffix)
    }

    /// True when the value parses as a DOI
    pub fn is_parsable(value: &str) -> bool {
        Self::parse(value).is_ok()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The `prefix/suffix` name
    pub fn doi_name(&self) -> String {
        format!("{}/{}", self.prefix, self.suffix)
    }

    /// The resolvable `https://doi.org/...` form
    pub fn url(&self) -> String {
        format!("https://doi.org/{}/{}", self.prefix, self.suffix)
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.suffix)
    }
}

impl FromStr for Doi {
    type Err = DoiParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Doi {
    type Error = DoiParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Doi> for String {
    fn from(doi: Doi) -> Self {
        doi.doi_name()
    }
}

fn strip_resolver(value: &str) -> &str {
    for resolver in RESOLVER_PREFIXES {
        if let Some(head) = value.get(..resolver.len()) {
            if head.eq_ignore_ascii_case(resolver) {
                return &value[resolver.len()..];
            }
        }
    }
    value
}

fn validate_prefix(prefix: &str) -> Result<(), DoiParseError> {
    match prefix.strip_prefix("10.") {
        Some(rest) if !rest.is_empty() => Ok(()),
        _ => Err(DoiParseError::InvalidPrefix(prefix.to_string())),
    }
}

/// The registration prefix reserved for this deployment.
///
/// A DOI is GBIF-owned iff its prefix equals this one. The check is a pure
/// predicate and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GbifPrefix(String);

impl GbifPrefix {
    pub fn new(prefix: impl AsRef<str>) -> Result<Self, DoiParseError> {
        let prefix = prefix.as_ref().trim().to_lowercase();
        validate_prefix(&prefix)?;
        Ok(Self(prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the DOI was issued under this prefix
    pub fn owns(&self, doi: &Doi) -> bool {
        doi.prefix() == self.0
    }

    /// Build a DOI under this prefix
    pub fn doi(&self, suffix: &str) -> Result<Doi, DoiParseError> {
        Doi::new(&self.0, suffix)
    }
}

impl fmt::Display for GbifPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GbifPrefix {
    type Error = DoiParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GbifPrefix> for String {
    fn from(prefix: GbifPrefix) -> Self {
        prefix.0
    }
}

/// What a DOI is minted for. Each kind has its own suffix shoulder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DoiKind {
    Dataset,
    Download,
    DataPackage,
    DerivedDataset,
}

impl DoiKind {
    /// Suffix shoulder prepended to the random part
    pub fn shoulder(&self) -> &'static str {
        match self {
            DoiKind::Dataset => "",
            DoiKind::Download => "dl.",
            DoiKind::DataPackage => "dp.",
            DoiKind::DerivedDataset => "dd.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DoiKind::Dataset => "DATASET",
            DoiKind::Download => "DOWNLOAD",
            DoiKind::DataPackage => "DATA_PACKAGE",
            DoiKind::DerivedDataset => "DERIVED_DATASET",
        }
    }
}

impl fmt::Display for DoiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DoiKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "DATASET" => Ok(DoiKind::Dataset),
            "DOWNLOAD" => Ok(DoiKind::Download),
            "DATA_PACKAGE" => Ok(DoiKind::DataPackage),
            "DERIVED_DATASET" => Ok(DoiKind::DerivedDataset),
            other => Err(format!("Unknown DOI type: {}", other)),
        }
    }
}
