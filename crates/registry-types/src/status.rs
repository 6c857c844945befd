//! Persisted DOI registration state

use crate::doi::{Doi, DoiKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Registration status of a DOI
///
/// Transitions only move forward: `New -> Registered` and
/// `New | Registered -> Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DoiStatus {
    New,
    Registered,
    Deleted,
}

impl DoiStatus {
    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Staying in the same state is allowed so repeated notifications are
    /// harmless.
    pub fn can_transition_to(self, next: DoiStatus) -> bool {
        matches!(
            (self, next),
            (DoiStatus::New, _)
                | (DoiStatus::Registered, DoiStatus::Registered)
                | (DoiStatus::Registered, DoiStatus::Deleted)
                | (DoiStatus::Deleted, DoiStatus::Deleted)
        )
    }

    pub fn is_deleted(self) -> bool {
        self == DoiStatus::Deleted
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DoiStatus::New => "NEW",
            DoiStatus::Registered => "REGISTERED",
            DoiStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for DoiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DoiStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(DoiStatus::New),
            "REGISTERED" => Ok(DoiStatus::Registered),
            "DELETED" => Ok(DoiStatus::Deleted),
            other => Err(format!("Unknown DOI status: {}", other)),
        }
    }
}

/// Status plus the URL the DOI resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoiData {
    pub status: DoiStatus,
    #[serde(default)]
    pub target: Option<Url>,
}

impl DoiData {
    pub fn new(status: DoiStatus, target: Option<Url>) -> Self {
        Self { status, target }
    }

    /// State of a freshly issued DOI
    pub fn issued() -> Self {
        Self::new(DoiStatus::New, None)
    }
}

/// A DOI row as kept by the DOI store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoiRecord {
    pub doi: Doi,
    pub kind: DoiKind,
    pub data: DoiData,
    /// Last metadata document submitted for this DOI (opaque here)
    #[serde(default)]
    pub metadata: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl DoiRecord {
    pub fn new(doi: Doi, kind: DoiKind, created: DateTime<Utc>) -> Self {
        Self {
            doi,
            kind,
            data: DoiData::issued(),
            metadata: None,
            created,
            modified: created,
        }
    }

    pub fn status(&self) -> DoiStatus {
        self.data.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        use DoiStatus::*;

        assert!(New.can_transition_to(Registered));
        assert!(New.can_transition_to(Deleted));
        assert!(Registered.can_transition_to(Deleted));
        assert!(Registered.can_transition_to(Registered));

        assert!(!Registered.can_transition_to(New));
        assert!(!Deleted.can_transition_to(New));
        assert!(!Deleted.can_transition_to(Registered));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [DoiStatus::New, DoiStatus::Registered, DoiStatus::Deleted] {
            assert_eq!(status.as_str().parse::<DoiStatus>(), Ok(status));
        }
        assert_eq!(
            serde_json::to_string(&DoiStatus::Registered).unwrap(),
            "\"REGISTERED\""
        );
    }
}
