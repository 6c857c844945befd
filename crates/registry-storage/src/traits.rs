use crate::StorageResult;
use async_trait::async_trait;
use registry_types::{AlternateIdentifier, Doi, DoiData, DoiKind, DoiRecord, EntityKey, Registrable};

/// Storage interface for one kind of registrable entity.
///
/// The identifier history travels inside the entity; `update` persists the
/// active DOI and the history atomically.
#[async_trait]
pub trait EntityStore<E: Registrable>: Send + Sync {
    /// Get one entity, identifiers included.
    async fn get(&self, key: &EntityKey) -> StorageResult<Option<E>>;

    /// Insert a new entity. Identifier keys are assigned by storage.
    async fn insert(&self, entity: E) -> StorageResult<E>;

    /// Replace an existing entity and its identifier history in one transaction.
    async fn update(&self, entity: E) -> StorageResult<E>;

    /// Delete an entity and its identifiers.
    async fn delete(&self, key: &EntityKey) -> StorageResult<bool>;

    /// Identifier history, oldest first.
    async fn list_identifiers(&self, key: &EntityKey) -> StorageResult<Vec<AlternateIdentifier>>;

    /// Append one identifier and return its storage key.
    async fn add_identifier(
        &self,
        key: &EntityKey,
        identifier: AlternateIdentifier,
    ) -> StorageResult<i64>;

    /// Remove one identifier by its storage key.
    async fn delete_identifier(&self, key: &EntityKey, identifier_key: i64) -> StorageResult<bool>;
}

/// Storage interface for DOI registration state.
#[async_trait]
pub trait DoiStore: Send + Sync {
    /// Reserve a DOI with status NEW. Fails with `Conflict` if it exists.
    async fn create_doi(&self, doi: &Doi, kind: DoiKind) -> StorageResult<()>;

    async fn get_doi(&self, doi: &Doi) -> StorageResult<Option<DoiRecord>>;

    /// Move a DOI to new state. Backward status transitions are rejected
    /// with `DoiStatusRegression`.
    async fn update_doi(
        &self,
        doi: &Doi,
        data: DoiData,
        metadata: Option<String>,
    ) -> StorageResult<()>;

    /// Remove the DOI row entirely.
    async fn delete_doi(&self, doi: &Doi) -> StorageResult<bool>;
}
