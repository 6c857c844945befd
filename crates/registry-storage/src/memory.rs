//! In-memory reference implementation of the registry storage traits.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use the PostgreSQL adapter as source of truth.

use crate::traits::{DoiStore, EntityStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use registry_types::{
    AlternateIdentifier, Dataset, DerivedDataset, Doi, DoiData, DoiKind, DoiRecord, Download,
    EntityKey, Registrable,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory store for one entity kind.
///
/// The entity and its identifier history sit in one map slot, so a single
/// write guard covers both.
#[derive(Debug)]
pub struct InMemoryEntityStore<E> {
    entities: RwLock<HashMap<String, E>>,
    identifier_sequence: AtomicI64,
}

impl<E> Default for InMemoryEntityStore<E> {
    fn default() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            identifier_sequence: AtomicI64::new(0),
        }
    }
}

impl<E: Registrable> InMemoryEntityStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_identifier_keys(&self, entity: &mut E) {
        for identifier in entity.identifiers_mut().iter_mut() {
            if identifier.key.is_none() {
                identifier.key = Some(self.next_identifier_key());
            }
        }
    }

    fn next_identifier_key(&self) -> i64 {
        self.identifier_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl<E: Registrable> EntityStore<E> for InMemoryEntityStore<E> {
    async fn get(&self, key: &EntityKey) -> StorageResult<Option<E>> {
        let entities = self.entities.read().await;
        Ok(entities.get(key.as_str()).cloned())
    }

    async fn insert(&self, mut entity: E) -> StorageResult<E> {
        let key = entity.entity_key();
        let mut entities = self.entities.write().await;
        if entities.contains_key(key.as_str()) {
            return Err(StorageError::Conflict(format!("{} already exists", key)));
        }

        self.assign_identifier_keys(&mut entity);
        entities.insert(key.key, entity.clone());
        Ok(entity)
    }

    async fn update(&self, mut entity: E) -> StorageResult<E> {
        let key = entity.entity_key();
        let mut entities = self.entities.write().await;
        let slot = entities
            .get_mut(key.as_str())
            .ok_or_else(|| StorageError::NotFound(format!("{} not found", key)))?;

        self.assign_identifier_keys(&mut entity);
        *slot = entity.clone();
        Ok(entity)
    }

    async fn delete(&self, key: &EntityKey) -> StorageResult<bool> {
        let mut entities = self.entities.write().await;
        Ok(entities.remove(key.as_str()).is_some())
    }

    async fn list_identifiers(&self, key: &EntityKey) -> StorageResult<Vec<AlternateIdentifier>> {
        let entities = self.entities.read().await;
        let entity = entities
            .get(key.as_str())
            .ok_or_else(|| StorageError::NotFound(format!("{} not found", key)))?;
        Ok(entity.identifiers().to_vec())
    }

    async fn add_identifier(
        &self,
        key: &EntityKey,
        mut identifier: AlternateIdentifier,
    ) -> StorageResult<i64> {
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(key.as_str())
            .ok_or_else(|| StorageError::NotFound(format!("{} not found", key)))?;

        let identifier_key = self.next_identifier_key();
        identifier.key = Some(identifier_key);
        entity.identifiers_mut().push(identifier);
        Ok(identifier_key)
    }

    async fn delete_identifier(&self, key: &EntityKey, identifier_key: i64) -> StorageResult<bool> {
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(key.as_str())
            .ok_or_else(|| StorageError::NotFound(format!("{} not found", key)))?;

        let identifiers = entity.identifiers_mut();
        let before = identifiers.len();
        identifiers.retain(|identifier| identifier.key != Some(identifier_key));
        Ok(identifiers.len() != before)
    }
}

/// In-memory DOI store.
#[derive(Debug, Default)]
pub struct InMemoryDoiStore {
    dois: RwLock<HashMap<Doi, DoiRecord>>,
}

impl InMemoryDoiStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DoiStore for InMemoryDoiStore {
    async fn create_doi(&self, doi: &Doi, kind: DoiKind) -> StorageResult<()> {
        let mut dois = self.dois.write().await;
        if dois.contains_key(doi) {
            return Err(StorageError::Conflict(format!("DOI {} already exists", doi)));
        }
        dois.insert(doi.clone(), DoiRecord::new(doi.clone(), kind, Utc::now()));
        Ok(())
    }

    async fn get_doi(&self, doi: &Doi) -> StorageResult<Option<DoiRecord>> {
        let dois = self.dois.read().await;
        Ok(dois.get(doi).cloned())
    }

    async fn update_doi(
        &self,
        doi: &Doi,
        data: DoiData,
        metadata: Option<String>,
    ) -> StorageResult<()> {
        let mut dois = self.dois.write().await;
        let record = dois
            .get_mut(doi)
            .ok_or_else(|| StorageError::NotFound(format!("DOI {} not found", doi)))?;

        if !record.data.status.can_transition_to(data.status) {
            return Err(StorageError::status_regression(
                doi,
                record.data.status,
                data.status,
            ));
        }

        record.data = data;
        if metadata.is_some() {
            record.metadata = metadata;
        }
        record.modified = Utc::now();
        Ok(())
    }

    async fn delete_doi(&self, doi: &Doi) -> StorageResult<bool> {
        let mut dois = self.dois.write().await;
        Ok(dois.remove(doi).is_some())
    }
}

/// All in-memory stores the registry needs, shareable as trait objects.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistryStorage {
    pub datasets: Arc<InMemoryEntityStore<Dataset>>,
    pub downloads: Arc<InMemoryEntityStore<Download>>,
    pub derived_datasets: Arc<InMemoryEntityStore<DerivedDataset>>,
    pub dois: Arc<InMemoryDoiStore>,
}

impl InMemoryRegistryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_types::{DoiStatus, IdentifierType};

    fn doi(value: &str) -> Doi {
        Doi::parse(value).unwrap()
    }

    #[tokio::test]
    async fn update_replaces_doi_and_history_together() {
        let store = InMemoryEntityStore::<Dataset>::new();
        let dataset = Dataset::new("Birds", "alice").with_doi(doi("10.5072/old"));
        let key = dataset.entity_key();
        store.insert(dataset.clone()).await.unwrap();

        let mut updated = dataset;
        updated.doi = Some(doi("10.1234/external"));
        updated
            .identifiers
            .push(AlternateIdentifier::doi(&doi("10.5072/old"), "alice", Utc::now()));
        store.update(updated).await.unwrap();

        let stored: Dataset = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.doi, Some(doi("10.1234/external")));
        assert_eq!(stored.identifiers.len(), 1);
        assert!(stored.identifiers[0].key.is_some());
    }

    #[tokio::test]
    async fn update_of_unknown_entity_is_not_found() {
        let store = InMemoryEntityStore::<Download>::new();
        let result = store.update(Download::new("0000001-1", "bob")).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn identifiers_can_be_added_and_removed_by_key() {
        let store = InMemoryEntityStore::<Dataset>::new();
        let dataset = Dataset::new("Fungi", "alice");
        let key = dataset.entity_key();
        store.insert(dataset).await.unwrap();

        let first = store
            .add_identifier(
                &key,
                AlternateIdentifier::new(IdentifierType::Url, "http://a", "alice", Utc::now()),
            )
            .await
            .unwrap();
        store
            .add_identifier(
                &key,
                AlternateIdentifier::doi(&doi("10.5072/x"), "alice", Utc::now()),
            )
            .await
            .unwrap();

        assert!(store.delete_identifier(&key, first).await.unwrap());
        assert!(!store.delete_identifier(&key, first).await.unwrap());

        let remaining = store.list_identifiers(&key).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].identifier, "10.5072/x");
    }

    #[tokio::test]
    async fn doi_create_conflicts_on_duplicates() {
        let store = InMemoryDoiStore::new();
        let value = doi("10.5072/dl.abc");
        store.create_doi(&value, DoiKind::Download).await.unwrap();

        let second = store.create_doi(&value, DoiKind::Download).await;
        assert!(matches!(second, Err(StorageError::Conflict(_))));

        let record = store.get_doi(&value).await.unwrap().unwrap();
        assert_eq!(record.status(), DoiStatus::New);
    }

    #[tokio::test]
    async fn doi_status_never_moves_backward() {
        let store = InMemoryDoiStore::new();
        let value = doi("10.5072/abc");
        store.create_doi(&value, DoiKind::Dataset).await.unwrap();

        store
            .update_doi(&value, DoiData::new(DoiStatus::Registered, None), Some("<xml/>".into()))
            .await
            .unwrap();
        store
            .update_doi(&value, DoiData::new(DoiStatus::Deleted, None), None)
            .await
            .unwrap();

        let back = store
            .update_doi(&value, DoiData::new(DoiStatus::Registered, None), None)
            .await;
        assert!(matches!(
            back,
            Err(StorageError::DoiStatusRegression {
                from: DoiStatus::Deleted,
                to: DoiStatus::Registered,
                ..
            })
        ));

        let record = store.get_doi(&value).await.unwrap().unwrap();
        assert_eq!(record.status(), DoiStatus::Deleted);
        assert_eq!(record.metadata.as_deref(), Some("<xml/>"));
    }
}
