use chrono::{DateTime, Utc};
use uuid::Uuid;

use nildb_db::ops;

use crate::domain::error::Error;
use crate::domain::model::{Builder, CollectionRecord, CollectionType, IndexSpec};
use crate::domain::service::Service;

/// Index-name bounds from the catalog rules.
const INDEX_NAME_MIN: usize = 4;
const INDEX_NAME_MAX: usize = 50;

/// What `GET /v1/collections/:id` reports.
#[derive(Debug, Clone)]
pub struct CollectionMetadata {
    pub record: CollectionRecord,
    pub count: u64,
    pub size_bytes: i64,
    pub first_write: Option<DateTime<Utc>>,
    pub last_write: Option<DateTime<Utc>>,
    pub indexes: Vec<String>,
}

impl Service {
    /// Create a collection owned by the caller.
    ///
    /// The schema is checked as a JSON-Schema document once, here; every
    /// later ingest validates against it.
    ///
    /// # Errors
    /// `DataValidation` on an invalid schema or duplicate id.
    pub async fn create_collection(
        &self,
        caller: &Builder,
        id: Option<Uuid>,
        name: String,
        collection_type: CollectionType,
        schema: serde_json::Value,
    ) -> Result<CollectionRecord, Error> {
        if name.trim().is_empty() {
            return Err(Error::data_validation("collection name cannot be empty"));
        }
        if !schema.is_object() {
            return Err(Error::data_validation("schema must be a JSON object"));
        }
        jsonschema::validator_for(&schema)
            .map_err(|e| Error::data_validation(format!("invalid JSON schema: {e}")))?;

        let id = id.unwrap_or_else(Uuid::new_v4);
        if self.collections.find(id).await?.is_some() {
            return Err(Error::data_validation("collection id already exists"));
        }

        let now = Utc::now();
        let record = CollectionRecord {
            id,
            owner: caller.did,
            name,
            collection_type,
            schema,
            created_at: now,
            updated_at: now,
        };
        self.collections.insert(&record).await?;
        self.gateway.create_data_collection(&id).await?;
        self.builders.add_collection(caller.did, id, now).await?;
        self.builder_cache.taint(caller.did);
        tracing::info!(collection = %id, owner = %caller.did, "created collection");
        Ok(record)
    }

    /// List the caller's collections.
    ///
    /// # Errors
    /// Catalog failures.
    pub async fn list_collections(&self, caller: &Builder) -> Result<Vec<CollectionRecord>, Error> {
        self.collections.list_by_owner(caller.did).await
    }

    /// Read one collection's metadata: count, size, write bounds, indexes.
    ///
    /// # Errors
    /// `CollectionNotFound` when absent or not owned by the caller.
    pub async fn collection_metadata(
        &self,
        caller: &Builder,
        id: Uuid,
    ) -> Result<CollectionMetadata, Error> {
        let record = self.owned_collection(caller, id).await?;
        let stats = ops::collection_stats(&self.gateway.data_collection(&id)).await?;
        Ok(CollectionMetadata {
            record,
            count: stats.count,
            size_bytes: stats.size_bytes,
            first_write: stats.first_write.map(bson::DateTime::to_chrono),
            last_write: stats.last_write.map(bson::DateTime::to_chrono),
            indexes: stats.indexes,
        })
    }

    /// Delete a collection: drop its documents, purge user references,
    /// remove the record and the builder back-reference.
    ///
    /// # Errors
    /// `CollectionNotFound` when absent or foreign; the first store failure
    /// otherwise. Safe to retry.
    pub async fn delete_collection(&self, caller: &Builder, id: Uuid) -> Result<(), Error> {
        let record = self.owned_collection(caller, id).await?;
        self.gateway.drop_data_collection(&record.id).await?;
        self.users.purge_collection(record.id).await?;
        self.collections.delete(record.id).await?;
        self.builders
            .remove_collection(caller.did, record.id, Utc::now())
            .await?;
        self.builder_cache.taint(caller.did);
        tracing::info!(collection = %id, owner = %caller.did, "deleted collection");
        Ok(())
    }

    /// Create an index on a collection.
    ///
    /// # Errors
    /// `DataValidation` on bad names or empty keys; store index errors pass
    /// through with their own tags.
    pub async fn create_index(
        &self,
        caller: &Builder,
        collection: Uuid,
        spec: IndexSpec,
    ) -> Result<(), Error> {
        self.owned_collection(caller, collection).await?;
        if spec.name.len() < INDEX_NAME_MIN || spec.name.len() > INDEX_NAME_MAX {
            return Err(Error::data_validation(format!(
                "index name must be {INDEX_NAME_MIN}..{INDEX_NAME_MAX} characters"
            )));
        }
        if spec.keys.is_empty() {
            return Err(Error::data_validation("index must declare at least one key"));
        }
        let mut keys = bson::Document::new();
        for key in &spec.keys {
            if key.direction != 1 && key.direction != -1 {
                return Err(Error::data_validation(
                    "index key direction must be 1 or -1",
                ));
            }
            keys.insert(key.field.clone(), key.direction);
        }
        ops::create_index(
            &self.gateway.data_collection(&collection),
            keys,
            &spec.name,
            spec.unique,
            spec.ttl_seconds,
        )
        .await?;
        Ok(())
    }

    /// Drop an index by name.
    ///
    /// # Errors
    /// `IndexNotFound` for unknown names.
    pub async fn drop_index(
        &self,
        caller: &Builder,
        collection: Uuid,
        name: &str,
    ) -> Result<(), Error> {
        self.owned_collection(caller, collection).await?;
        ops::drop_index(&self.gateway.data_collection(&collection), name).await?;
        Ok(())
    }

    /// Catalog-level ownership gate: absent and foreign collections are
    /// indistinguishable.
    pub(crate) async fn owned_collection(
        &self,
        caller: &Builder,
        id: Uuid,
    ) -> Result<CollectionRecord, Error> {
        self.collections
            .find_owned(id, caller.did)
            .await?
            .ok_or_else(|| Error::CollectionNotFound(id.to_string()))
    }
}
