//! Strongly-typed key for registrable entities

use crate::entity::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Key of a registrable entity, unique within its kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub key: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }

    pub fn from_uuid(kind: EntityKind, uuid: Uuid) -> Self {
        Self::new(kind, uuid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.key)
    }
}
