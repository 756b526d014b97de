use chrono::Utc;

use nildb_nuc::Did;

use crate::domain::error::Error;
use crate::domain::model::Builder;
use crate::domain::service::Service;

impl Service {
    /// Self-signed registration: create the builder record once.
    ///
    /// # Errors
    /// `DataValidation` on an empty name or an already-registered DID.
    pub async fn register_builder(&self, did: Did, name: String) -> Result<Builder, Error> {
        if name.trim().is_empty() {
            return Err(Error::data_validation("builder name cannot be empty"));
        }
        if self.builders.find(did).await?.is_some() {
            return Err(Error::data_validation("builder is already registered"));
        }

        let now = Utc::now();
        let builder = Builder {
            did,
            name,
            created_at: now,
            updated_at: now,
            collections: Vec::new(),
        };
        self.builders.insert(&builder).await?;
        tracing::info!(builder = %did, "registered builder");
        Ok(builder)
    }

    /// Update the caller's profile name.
    ///
    /// # Errors
    /// `DataValidation` on an empty name; catalog failures.
    pub async fn update_builder_name(&self, caller: &Builder, name: String) -> Result<(), Error> {
        if name.trim().is_empty() {
            return Err(Error::data_validation("builder name cannot be empty"));
        }
        self.builders
            .update_name(caller.did, &name, Utc::now())
            .await?;
        self.builder_cache.taint(caller.did);
        Ok(())
    }

    /// Delete the caller and cascade to every collection it owns.
    ///
    /// The cascade is best-effort sequential and idempotent by filter: a
    /// retry after a mid-cascade failure converges.
    ///
    /// # Errors
    /// The first store failure encountered.
    pub async fn delete_builder(&self, caller: &Builder) -> Result<(), Error> {
        let owned = self.collections.list_by_owner(caller.did).await?;
        for collection in &owned {
            self.gateway.drop_data_collection(&collection.id).await?;
            self.users.purge_collection(collection.id).await?;
            self.collections.delete(collection.id).await?;
        }
        self.queries.delete_by_owner(caller.did).await?;
        self.builders.delete(caller.did).await?;
        self.builder_cache.taint(caller.did);
        tracing::info!(builder = %caller.did, collections = owned.len(), "deleted builder");
        Ok(())
    }
}
