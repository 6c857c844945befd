//! PostgreSQL adapter for registry storage.
//!
//! Entities are stored as JSONB documents keyed by `(kind, key)`; their
//! identifier history lives in a separate table ordered by its serial key,
//! which doubles as history order. `update` rewrites both inside one
//! transaction.

use crate::traits::{DoiStore, EntityStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use registry_types::{
    AlternateIdentifier, Doi, DoiData, DoiKind, DoiRecord, DoiStatus, EntityKey, IdentifierType,
    Registrable,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use url::Url;

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresRegistryStorage {
    pool: PgPool,
}

impl PostgresRegistryStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS registry_entities (
                kind TEXT NOT NULL,
                key TEXT NOT NULL,
                doi TEXT,
                body JSONB NOT NULL,
                PRIMARY KEY (kind, key)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS registry_identifiers (
                identifier_key BIGSERIAL PRIMARY KEY,
                kind TEXT NOT NULL,
                entity_key TEXT NOT NULL,
                type TEXT NOT NULL,
                identifier TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created TIMESTAMPTZ NOT NULL,
                FOREIGN KEY (kind, entity_key) REFERENCES registry_entities (kind, key) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS registry_dois (
                doi TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                target TEXT,
                metadata TEXT,
                created TIMESTAMPTZ NOT NULL,
                modified TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS registry_entities_doi_idx ON registry_entities (doi)",
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        tracing::debug!("Registry schema ready");
        Ok(())
    }

    async fn load_identifiers(
        &self,
        key: &EntityKey,
    ) -> StorageResult<Vec<AlternateIdentifier>> {
        let rows = sqlx::query(
            r#"
            SELECT identifier_key, type, identifier, created_by, created
              FROM registry_identifiers
             WHERE kind = $1 AND entity_key = $2
             ORDER BY identifier_key ASC
            "#,
        )
        .bind(key.kind.as_str())
        .bind(key.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(row_to_identifier).collect()
    }

    async fn entity_exists(&self, key: &EntityKey) -> StorageResult<bool> {
        let row = sqlx::query("SELECT 1 FROM registry_entities WHERE kind = $1 AND key = $2")
            .bind(key.kind.as_str())
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl<E: Registrable> EntityStore<E> for PostgresRegistryStorage {
    async fn get(&self, key: &EntityKey) -> StorageResult<Option<E>> {
        let row = sqlx::query("SELECT body FROM registry_entities WHERE kind = $1 AND key = $2")
            .bind(key.kind.as_str())
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let body: serde_json::Value = row.try_get("body").map_err(map_sqlx)?;
        let mut entity: E = serde_json::from_value(body)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        *entity.identifiers_mut() = self.load_identifiers(key).await?;
        Ok(Some(entity))
    }

    async fn insert(&self, entity: E) -> StorageResult<E> {
        let key = entity.entity_key();
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query("INSERT INTO registry_entities (kind, key, doi, body) VALUES ($1, $2, $3, $4)")
            .bind(key.kind.as_str())
            .bind(key.as_str())
            .bind(entity.doi().map(Doi::doi_name))
            .bind(entity_body(&entity)?)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_conflict)?;

        let mut stored = entity;
        for identifier in stored.identifiers_mut().iter_mut() {
            identifier.key = Some(insert_identifier(&mut tx, &key, identifier).await?);
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(stored)
    }

    async fn update(&self, entity: E) -> StorageResult<E> {
        let key = entity.entity_key();
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let result = sqlx::query(
            "UPDATE registry_entities SET doi = $3, body = $4 WHERE kind = $1 AND key = $2",
        )
        .bind(key.kind.as_str())
        .bind(key.as_str())
        .bind(entity.doi().map(Doi::doi_name))
        .bind(entity_body(&entity)?)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("{} not found", key)));
        }

        // Drop history rows that are no longer on the entity, then append new ones.
        let kept: Vec<i64> = entity
            .identifiers()
            .iter()
            .filter_map(|identifier| identifier.key)
            .collect();
        sqlx::query(
            r#"
            DELETE FROM registry_identifiers
             WHERE kind = $1 AND entity_key = $2 AND NOT (identifier_key = ANY($3))
            "#,
        )
        .bind(key.kind.as_str())
        .bind(key.as_str())
        .bind(kept)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let mut stored = entity;
        for identifier in stored.identifiers_mut().iter_mut() {
            if identifier.key.is_none() {
                identifier.key = Some(insert_identifier(&mut tx, &key, identifier).await?);
            }
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(stored)
    }

    async fn delete(&self, key: &EntityKey) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM registry_entities WHERE kind = $1 AND key = $2")
            .bind(key.kind.as_str())
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_identifiers(&self, key: &EntityKey) -> StorageResult<Vec<AlternateIdentifier>> {
        if !self.entity_exists(key).await? {
            return Err(StorageError::NotFound(format!("{} not found", key)));
        }
        self.load_identifiers(key).await
    }

    async fn add_identifier(
        &self,
        key: &EntityKey,
        identifier: AlternateIdentifier,
    ) -> StorageResult<i64> {
        if !self.entity_exists(key).await? {
            return Err(StorageError::NotFound(format!("{} not found", key)));
        }
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let identifier_key = insert_identifier(&mut tx, key, &identifier).await?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(identifier_key)
    }

    async fn delete_identifier(&self, key: &EntityKey, identifier_key: i64) -> StorageResult<bool> {
        let result = sqlx::query(
            "DELETE FROM registry_identifiers WHERE kind = $1 AND entity_key = $2 AND identifier_key = $3",
        )
        .bind(key.kind.as_str())
        .bind(key.as_str())
        .bind(identifier_key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DoiStore for PostgresRegistryStorage {
    async fn create_doi(&self, doi: &Doi, kind: DoiKind) -> StorageResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO registry_dois (doi, kind, status, target, metadata, created, modified)
            VALUES ($1, $2, $3, NULL, NULL, $4, $4)
            "#,
        )
        .bind(doi.doi_name())
        .bind(kind.as_str())
        .bind(DoiStatus::New.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn get_doi(&self, doi: &Doi) -> StorageResult<Option<DoiRecord>> {
        let row = sqlx::query(
            "SELECT doi, kind, status, target, metadata, created, modified FROM registry_dois WHERE doi = $1",
        )
        .bind(doi.doi_name())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.as_ref().map(row_to_doi_record).transpose()
    }

    async fn update_doi(
        &self,
        doi: &Doi,
        data: DoiData,
        metadata: Option<String>,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let row = sqlx::query("SELECT status FROM registry_dois WHERE doi = $1 FOR UPDATE")
            .bind(doi.doi_name())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| StorageError::NotFound(format!("DOI {} not found", doi)))?;

        let current: String = row.try_get("status").map_err(map_sqlx)?;
        let current = parse_status(&current)?;
        if !current.can_transition_to(data.status) {
            return Err(StorageError::status_regression(doi, current, data.status));
        }

        sqlx::query(
            r#"
            UPDATE registry_dois
               SET status = $2,
                   target = $3,
                   metadata = COALESCE($4, metadata),
                   modified = $5
             WHERE doi = $1
            "#,
        )
        .bind(doi.doi_name())
        .bind(data.status.as_str())
        .bind(data.target.as_ref().map(Url::to_string))
        .bind(metadata)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete_doi(&self, doi: &Doi) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM registry_dois WHERE doi = $1")
            .bind(doi.doi_name())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}

async fn insert_identifier(
    tx: &mut Transaction<'_, Postgres>,
    key: &EntityKey,
    identifier: &AlternateIdentifier,
) -> StorageResult<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO registry_identifiers (kind, entity_key, type, identifier, created_by, created)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING identifier_key
        "#,
    )
    .bind(key.kind.as_str())
    .bind(key.as_str())
    .bind(identifier.identifier_type.as_str())
    .bind(&identifier.identifier)
    .bind(&identifier.created_by)
    .bind(identifier.created)
    .fetch_one(&mut **tx)
    .await
    .map_err(map_sqlx)?;

    row.try_get("identifier_key").map_err(map_sqlx)
}

/// Entity document without its history; history rows are authoritative.
fn entity_body<E: Registrable>(entity: &E) -> StorageResult<serde_json::Value> {
    let mut body = entity.clone();
    body.identifiers_mut().clear();
    serde_json::to_value(&body).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn row_to_identifier(row: &PgRow) -> StorageResult<AlternateIdentifier> {
    let identifier_type: String = row.try_get("type").map_err(map_sqlx)?;
    Ok(AlternateIdentifier {
        key: Some(row.try_get("identifier_key").map_err(map_sqlx)?),
        identifier_type: IdentifierType::from_str_lossy(&identifier_type),
        identifier: row.try_get("identifier").map_err(map_sqlx)?,
        created_by: row.try_get("created_by").map_err(map_sqlx)?,
        created: row.try_get("created").map_err(map_sqlx)?,
    })
}

fn row_to_doi_record(row: &PgRow) -> StorageResult<DoiRecord> {
    let doi: String = row.try_get("doi").map_err(map_sqlx)?;
    let kind: String = row.try_get("kind").map_err(map_sqlx)?;
    let status: String = row.try_get("status").map_err(map_sqlx)?;
    let target: Option<String> = row.try_get("target").map_err(map_sqlx)?;
    let created: DateTime<Utc> = row.try_get("created").map_err(map_sqlx)?;
    let modified: DateTime<Utc> = row.try_get("modified").map_err(map_sqlx)?;

    let target = target
        .map(|value| Url::parse(&value))
        .transpose()
        .map_err(|e| StorageError::Serialization(format!("invalid DOI target: {e}")))?;

    Ok(DoiRecord {
        doi: Doi::parse(&doi).map_err(|e| StorageError::Serialization(e.to_string()))?,
        kind: kind.parse().map_err(StorageError::Serialization)?,
        data: DoiData::new(parse_status(&status)?, target),
        metadata: row.try_get("metadata").map_err(map_sqlx)?,
        created,
        modified,
    })
}

fn parse_status(value: &str) -> StorageResult<DoiStatus> {
    value.parse().map_err(StorageError::Serialization)
}

fn map_sqlx(err: sqlx::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StorageError::Conflict(db.message().to_string());
        }
    }
    map_sqlx(err)
}
