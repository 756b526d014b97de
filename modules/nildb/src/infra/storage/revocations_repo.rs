use bson::{doc, Document};
use chrono::{DateTime, Utc};

use nildb_db::{catalog, ops, DbGateway};

use crate::domain::error::Error;
use crate::infra::storage::fields;

/// The journal of revoked root-token ids.
#[derive(Debug, Clone)]
pub struct RevocationsRepo {
    gateway: DbGateway,
}

impl RevocationsRepo {
    pub fn new(gateway: DbGateway) -> Self {
        Self { gateway }
    }

    fn coll(&self) -> mongodb::Collection<Document> {
        self.gateway.primary_collection(catalog::REVOCATIONS)
    }

    /// Journal a revocation. Revoking twice is a no-op.
    pub async fn insert(&self, token_id: &str, revoked_at: DateTime<Utc>) -> Result<(), Error> {
        ops::upsert_one(
            &self.coll(),
            doc! { "_id": token_id },
            doc! { "$setOnInsert": { "revoked_at": fields::datetime_bson(revoked_at) } },
        )
        .await?;
        Ok(())
    }

    pub async fn contains(&self, token_id: &str) -> Result<bool, Error> {
        let hits = ops::count(&self.coll(), doc! { "_id": token_id }).await?;
        Ok(hits > 0)
    }
}
