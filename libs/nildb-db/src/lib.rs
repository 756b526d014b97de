//! Typed persistence gateway over MongoDB.
//!
//! A deployment owns two logical databases: `<base>_primary` carries the
//! catalogs (builders, collections, queries, runs, revocations, users) and
//! `<base>_data` holds one physical collection per builder-defined
//! collection, named by its UUID.
//!
//! Every filter passed to an op in [`ops`] runs through the [`coerce`]
//! pipeline first, so request-level string representations of UUIDs and
//! datetimes reach the store as native values. Request deadlines are
//! enforced above this layer; dropping an op future cancels the in-flight
//! driver call.

pub mod coerce;
pub mod error;
pub mod json;
pub mod ops;

use bson::Document;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};

pub use error::DbError;

/// Connection settings for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbOptions {
    /// MongoDB connection string.
    pub url: String,
    /// Base name; the gateway derives `<base>_primary` and `<base>_data`.
    #[serde(default = "default_base_name")]
    pub base_name: String,
}

fn default_base_name() -> String {
    "nildb".into()
}

/// Handle to the two logical databases.
#[derive(Debug, Clone)]
pub struct DbGateway {
    primary: Database,
    data: Database,
}

impl DbGateway {
    /// Connect and resolve both database handles.
    ///
    /// # Errors
    /// Fails when the connection string cannot be parsed or the initial
    /// topology handshake fails.
    pub async fn connect(options: &DbOptions) -> Result<Self, DbError> {
        let client = Client::with_uri_str(&options.url)
            .await
            .map_err(|e| DbError::Database(format!("cannot connect: {e}")))?;
        tracing::info!(base = %options.base_name, "connected to document store");
        Ok(Self {
            primary: client.database(&format!("{}_primary", options.base_name)),
            data: client.database(&format!("{}_data", options.base_name)),
        })
    }

    /// A catalog collection inside the primary database.
    #[must_use]
    pub fn primary_collection(&self, name: &str) -> Collection<Document> {
        self.primary.collection(name)
    }

    /// The physical collection backing a defined collection.
    #[must_use]
    pub fn data_collection(&self, id: &uuid::Uuid) -> Collection<Document> {
        self.data.collection(&id.to_string())
    }

    /// Explicitly create the physical collection for a new definition.
    ///
    /// # Errors
    /// Driver failures; creating an existing collection is an error the
    /// caller treats as a catalog inconsistency.
    pub async fn create_data_collection(&self, id: &uuid::Uuid) -> Result<(), DbError> {
        self.data
            .create_collection(id.to_string())
            .await
            .map_err(|e| DbError::from_driver(&e, &id.to_string()))
    }

    /// Drop the physical collection and all its documents. Dropping a
    /// collection that never materialised is a no-op, which keeps cascade
    /// deletes idempotent.
    ///
    /// # Errors
    /// Driver failures.
    pub async fn drop_data_collection(&self, id: &uuid::Uuid) -> Result<(), DbError> {
        self.data_collection(id)
            .drop()
            .await
            .map_err(|e| DbError::from_driver(&e, &id.to_string()))
    }

}

/// Catalog collection names inside the primary database.
pub mod catalog {
    pub const BUILDERS: &str = "builders";
    pub const COLLECTIONS: &str = "collections";
    pub const QUERIES: &str = "queries";
    pub const QUERY_RUNS: &str = "query_runs";
    pub const REVOCATIONS: &str = "revocations";
    pub const USERS: &str = "users";
}
