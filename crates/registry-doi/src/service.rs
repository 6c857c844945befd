//! Entity update orchestration.
//!
//! Every mutating operation runs: authorize, load, reconcile, persist
//! (active DOI and history in one store call), then dispatch. Dispatch
//! happens after the write and never fails the operation.

use crate::dispatch::{EntityChange, RegistrationDispatcher};
use crate::error::{DoiError, DoiResult};
use crate::issuer::DoiIssuer;
use crate::ledger;
use crate::metadata::MetadataBuilder;
use crate::reconcile::{clears_active_doi, ActiveDoi, ReconcileInput, ReconciliationEngine};
use chrono::Utc;
use registry_storage::{DoiStore, EntityStore, InMemoryRegistryStorage};
use registry_types::{
    AlternateIdentifier, Dataset, DerivedDataset, Doi, DoiKind, DoiRecord, DoiStatus, Download,
    EntityKey, EntityKind, Registrable,
};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// Authenticated caller of a mutating operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    name: String,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn authorize(principal: Option<&Principal>) -> DoiResult<&str> {
    match principal {
        Some(principal) if !principal.name.trim().is_empty() => Ok(principal.name()),
        _ => Err(DoiError::UnauthorizedDoiOperation),
    }
}

/// The stores the service works against
#[derive(Clone)]
pub struct RegistryStores {
    pub datasets: Arc<dyn EntityStore<Dataset>>,
    pub downloads: Arc<dyn EntityStore<Download>>,
    pub derived_datasets: Arc<dyn EntityStore<DerivedDataset>>,
    pub dois: Arc<dyn DoiStore>,
}

impl RegistryStores {
    /// Use one backend for every table
    pub fn shared<S>(storage: Arc<S>) -> Self
    where
        S: EntityStore<Dataset>
            + EntityStore<Download>
            + EntityStore<DerivedDataset>
            + DoiStore
            + 'static,
    {
        Self {
            datasets: storage.clone(),
            downloads: storage.clone(),
            derived_datasets: storage.clone(),
            dois: storage,
        }
    }
}

impl From<&InMemoryRegistryStorage> for RegistryStores {
    fn from(storage: &InMemoryRegistryStorage) -> Self {
        Self {
            datasets: storage.datasets.clone(),
            downloads: storage.downloads.clone(),
            derived_datasets: storage.derived_datasets.clone(),
            dois: storage.dois.clone(),
        }
    }
}

/// DOI lifecycle for datasets, downloads and derived datasets
pub struct DoiLifecycleService {
    stores: RegistryStores,
    issuer: DoiIssuer,
    engine: ReconciliationEngine,
    metadata: Arc<dyn MetadataBuilder>,
    dispatcher: Arc<dyn RegistrationDispatcher>,
}

impl DoiLifecycleService {
    pub fn new(
        stores: RegistryStores,
        issuer: DoiIssuer,
        metadata: Arc<dyn MetadataBuilder>,
        dispatcher: Arc<dyn RegistrationDispatcher>,
    ) -> Self {
        let engine = ReconciliationEngine::new(issuer.prefix().clone());
        Self {
            stores,
            issuer,
            engine,
            metadata,
            dispatcher,
        }
    }

    pub fn issuer(&self) -> &DoiIssuer {
        &self.issuer
    }

    // Datasets

    pub async fn get_dataset(&self, key: Uuid) -> DoiResult<Dataset> {
        load(self.stores.datasets.as_ref(), &EntityKey::from_uuid(EntityKind::Dataset, key)).await
    }

    pub async fn create_dataset(
        &self,
        principal: Option<&Principal>,
        mut dataset: Dataset,
    ) -> DoiResult<Dataset> {
        let user = authorize(principal)?;
        dataset.created_by = user.to_string();
        let dataset = self.prepare_new(dataset, user).await?;

        let stored = self.stores.datasets.insert(dataset).await?;
        tracing::info!(entity = %stored.entity_key(), doi = ?stored.doi, "Dataset created");

        self.dispatcher.notify_changed(EntityChange::Dataset {
            dataset: &stored,
            previous_doi: None,
        });
        Ok(stored)
    }

    pub async fn update_dataset(
        &self,
        principal: Option<&Principal>,
        dataset: Dataset,
    ) -> DoiResult<Dataset> {
        let user = authorize(principal)?;
        let (updated, current) = self
            .reconcile_update(self.stores.datasets.as_ref(), dataset, user, true)
            .await?;

        let stored = self.stores.datasets.update(updated).await?;
        self.dispatcher.notify_changed(EntityChange::Dataset {
            dataset: &stored,
            previous_doi: current.doi(),
        });
        Ok(stored)
    }

    pub async fn delete_dataset(&self, principal: Option<&Principal>, key: Uuid) -> DoiResult<()> {
        authorize(principal)?;
        let key = EntityKey::from_uuid(EntityKind::Dataset, key);
        let current = self.delete_entity(self.stores.datasets.as_ref(), &key).await?;
        if let Some(doi) = current.doi() {
            self.dispatcher.notify_deleted(doi);
        }
        Ok(())
    }

    // Downloads

    pub async fn get_download(&self, key: &str) -> DoiResult<Download> {
        load(self.stores.downloads.as_ref(), &EntityKey::new(EntityKind::Download, key)).await
    }

    pub async fn create_download(
        &self,
        principal: Option<&Principal>,
        mut download: Download,
    ) -> DoiResult<Download> {
        let user = authorize(principal)?;
        download.created_by = user.to_string();
        let download = self.prepare_new(download, user).await?;

        let stored = self.stores.downloads.insert(download).await?;
        tracing::info!(entity = %stored.entity_key(), doi = ?stored.doi, "Download created");

        self.dispatcher.notify_changed(EntityChange::Download {
            download: &stored,
            previous_status: None,
        });
        Ok(stored)
    }

    /// Update a download. A download entering a failed state loses its
    /// active DOI, which is kept in history and deleted at the authority.
    pub async fn update_download(
        &self,
        principal: Option<&Principal>,
        download: Download,
    ) -> DoiResult<Download> {
        let user = authorize(principal)?;
        let failed = clears_active_doi(download.status);
        let (mut updated, current) = self
            .reconcile_update(self.stores.downloads.as_ref(), download, user, !failed)
            .await?;

        let mut cleared = None;
        if failed {
            if let Some(doi) = updated.doi.take() {
                updated.identifiers =
                    ledger::record_superseded(&updated.identifiers, &doi, user, Utc::now());
                cleared = Some(doi);
            }
        }

        let stored = self.stores.downloads.update(updated).await?;
        match cleared {
            Some(doi) => {
                tracing::info!(
                    entity = %stored.entity_key(),
                    doi = %doi,
                    status = ?stored.status,
                    "Failed download loses its DOI"
                );
                self.dispatcher.notify_deleted(&doi);
            }
            None => self.dispatcher.notify_changed(EntityChange::Download {
                download: &stored,
                previous_status: Some(current.status),
            }),
        }
        Ok(stored)
    }

    pub async fn delete_download(&self, principal: Option<&Principal>, key: &str) -> DoiResult<()> {
        authorize(principal)?;
        let key = EntityKey::new(EntityKind::Download, key);
        let current = self.delete_entity(self.stores.downloads.as_ref(), &key).await?;
        if let Some(doi) = current.doi() {
            self.dispatcher.notify_deleted(doi);
        }
        Ok(())
    }

    // Derived datasets

    pub async fn get_derived_dataset(&self, key: Uuid) -> DoiResult<DerivedDataset> {
        load(
            self.stores.derived_datasets.as_ref(),
            &EntityKey::from_uuid(EntityKind::DerivedDataset, key),
        )
        .await
    }

    pub async fn create_derived_dataset(
        &self,
        principal: Option<&Principal>,
        mut derived: DerivedDataset,
    ) -> DoiResult<DerivedDataset> {
        let user = authorize(principal)?;
        derived.created_by = user.to_string();
        let derived = self.prepare_new(derived, user).await?;

        let stored = self.stores.derived_datasets.insert(derived).await?;
        tracing::info!(entity = %stored.entity_key(), doi = ?stored.doi, "Derived dataset created");

        if let Some(doi) = stored.doi.as_ref() {
            let metadata = self.metadata.derived_dataset(&stored, doi);
            self.dispatcher
                .schedule_registration(doi, metadata, stored.target.clone());
        }
        Ok(stored)
    }

    pub async fn update_derived_dataset(
        &self,
        principal: Option<&Principal>,
        derived: DerivedDataset,
    ) -> DoiResult<DerivedDataset> {
        let user = authorize(principal)?;
        let (updated, current) = self
            .reconcile_update(self.stores.derived_datasets.as_ref(), derived, user, true)
            .await?;

        if updated.target != current.target && updated.doi == current.doi {
            if let Some(doi) = updated.doi.as_ref() {
                self.ensure_target_changeable(doi).await?;
            }
        }

        let stored = self.stores.derived_datasets.update(updated).await?;
        self.dispatcher
            .notify_changed(EntityChange::DerivedDataset { derived: &stored });
        Ok(stored)
    }

    /// Point the DOI of a derived dataset at a new location
    pub async fn update_derived_dataset_target(
        &self,
        principal: Option<&Principal>,
        key: Uuid,
        target: Url,
    ) -> DoiResult<DerivedDataset> {
        let user = authorize(principal)?;
        let mut derived = self.get_derived_dataset(key).await?;
        if let Some(doi) = derived.doi.as_ref() {
            self.ensure_target_changeable(doi).await?;
        }

        derived.target = target;
        derived.touch(user, Utc::now());
        let stored = self.stores.derived_datasets.update(derived).await?;
        tracing::info!(entity = %stored.entity_key(), target = %stored.target, "Derived dataset target changed");

        self.dispatcher
            .notify_changed(EntityChange::DerivedDataset { derived: &stored });
        Ok(stored)
    }

    // DOIs

    pub async fn generate_doi(&self, principal: Option<&Principal>, kind: DoiKind) -> DoiResult<Doi> {
        authorize(principal)?;
        self.issuer.new_doi(kind).await
    }

    pub async fn get_doi(&self, doi: &Doi) -> DoiResult<DoiRecord> {
        self.stores
            .dois
            .get_doi(doi)
            .await?
            .ok_or_else(|| DoiError::NotFound(format!("DOI {}", doi)))
    }

    /// Request deletion of a GBIF DOI. Already deleted DOIs are left alone.
    pub async fn delete_doi(&self, principal: Option<&Principal>, doi: &Doi) -> DoiResult<()> {
        authorize(principal)?;
        let record = self.get_doi(doi).await?;
        if record.status().is_deleted() {
            tracing::debug!(doi = %doi, "DOI already deleted");
            return Ok(());
        }
        self.dispatcher.notify_deleted(doi);
        Ok(())
    }

    // Shared steps

    /// Give a new entity its DOI and drop that DOI from its history
    async fn prepare_new<E: Registrable>(&self, mut entity: E, user: &str) -> DoiResult<E> {
        let doi = match entity.doi().cloned() {
            Some(doi) => {
                self.ensure_assignable(&doi).await?;
                doi
            }
            None => self.issuer.new_doi(E::KIND.doi_kind()).await?,
        };

        let identifiers = ledger::remove(entity.identifiers(), &doi);
        *entity.identifiers_mut() = identifiers;
        entity.set_doi(Some(doi));
        entity.touch(user, Utc::now());
        Ok(entity)
    }

    /// Reconcile a submitted entity against its persisted state.
    ///
    /// Returns the entity ready to persist and the state it replaces. With
    /// `allocate` false the entity is neither given a DOI from history nor
    /// a newly minted one.
    async fn reconcile_update<E: Registrable>(
        &self,
        store: &dyn EntityStore<E>,
        mut submitted: E,
        user: &str,
        allocate: bool,
    ) -> DoiResult<(E, E)> {
        let current = load(store, &submitted.entity_key()).await?;

        if let Some(doi) = submitted.doi() {
            if current.doi() != Some(doi) {
                self.ensure_assignable(doi).await?;
            }
        }

        let retired = self.retired_dois(current.identifiers()).await?;
        let now = Utc::now();
        let input = ReconcileInput {
            submitted: submitted.doi(),
            previous: current.doi(),
            identifiers: current.identifiers(),
            retired: &retired,
            user,
            now,
        };
        let outcome = if allocate {
            self.engine.reconcile(input)
        } else {
            self.engine.reconcile_without_allocation(input)
        };

        if let Some(doi) = &outcome.reactivated {
            tracing::info!(entity = %current.entity_key(), doi = %doi, "Reactivated DOI from history");
        }
        if let Some(doi) = &outcome.superseded {
            tracing::debug!(entity = %current.entity_key(), doi = %doi, "DOI superseded");
        }

        let active = match outcome.active {
            ActiveDoi::Assigned(doi) => Some(doi),
            ActiveDoi::Mint if allocate => Some(self.issuer.new_doi(E::KIND.doi_kind()).await?),
            ActiveDoi::Mint => None,
        };

        submitted.set_doi(active);
        *submitted.identifiers_mut() = outcome.identifiers;
        submitted.keep_creation(&current);
        submitted.touch(user, now);
        Ok((submitted, current))
    }

    /// Reject DOIs the store has marked DELETED
    async fn ensure_assignable(&self, doi: &Doi) -> DoiResult<()> {
        match self.stores.dois.get_doi(doi).await? {
            Some(record) if record.status().is_deleted() => {
                tracing::warn!(doi = %doi, "Refusing to reuse deleted DOI");
                Err(DoiError::InvalidDoiTransition(doi.clone()))
            }
            _ => Ok(()),
        }
    }

    async fn ensure_target_changeable(&self, doi: &Doi) -> DoiResult<()> {
        if !self.issuer.is_gbif(doi) {
            return Ok(());
        }
        let record = self.get_doi(doi).await?;
        if record.status() != DoiStatus::Registered {
            return Err(DoiError::InvalidInput(format!(
                "can change target only for registered DOI, {} is {}",
                doi,
                record.status()
            )));
        }
        Ok(())
    }

    /// GBIF DOIs in `identifiers` that the store reports as DELETED
    async fn retired_dois(&self, identifiers: &[AlternateIdentifier]) -> DoiResult<Vec<Doi>> {
        let mut retired = Vec::new();
        for doi in ledger::gbif_dois(identifiers, self.issuer.prefix()) {
            if let Some(record) = self.stores.dois.get_doi(&doi).await? {
                if record.status().is_deleted() {
                    retired.push(doi);
                }
            }
        }
        Ok(retired)
    }

    async fn delete_entity<E: Registrable>(
        &self,
        store: &dyn EntityStore<E>,
        key: &EntityKey,
    ) -> DoiResult<E> {
        let current = load(store, key).await?;
        store.delete(key).await?;
        tracing::info!(entity = %key, doi = ?current.doi(), "Entity deleted");
        Ok(current)
    }
}

async fn load<E: Registrable>(store: &dyn EntityStore<E>, key: &EntityKey) -> DoiResult<E> {
    store
        .get(key)
        .await?
        .ok_or_else(|| DoiError::NotFound(key.to_string()))
}
