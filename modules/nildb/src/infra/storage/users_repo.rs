use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use nildb_db::{catalog, ops, DbGateway};
use nildb_nuc::Did;

use crate::domain::error::Error;
use crate::domain::model::{UserDataRef, UserRecord};
use crate::infra::storage::fields;

/// User records derived from owned-document references.
///
/// A user exists exactly as long as it holds references; every mutation here
/// is phrased as a filter so retries converge (`$addToSet` on create,
/// `$pull` plus size-filtered delete on removal).
#[derive(Debug, Clone)]
pub struct UsersRepo {
    gateway: DbGateway,
}

impl UsersRepo {
    pub fn new(gateway: DbGateway) -> Self {
        Self { gateway }
    }

    fn coll(&self) -> mongodb::Collection<Document> {
        self.gateway.primary_collection(catalog::USERS)
    }

    pub async fn find(&self, did: Did) -> Result<Option<UserRecord>, Error> {
        let found = ops::find_one(&self.coll(), doc! { "_id": did.to_string() }).await?;
        found.as_ref().map(from_doc).transpose()
    }

    /// Record references for newly created owned documents, creating the
    /// user record on first contact.
    pub async fn add_refs(
        &self,
        did: Did,
        refs: &[UserDataRef],
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let entries: Vec<Bson> = refs.iter().map(ref_bson).collect();
        ops::upsert_one(
            &self.coll(),
            doc! { "_id": did.to_string() },
            doc! {
                "$addToSet": { "data": { "$each": entries } },
                "$set": { "_updated": fields::datetime_bson(now) },
                "$setOnInsert": { "_created": fields::datetime_bson(now) },
            },
        )
        .await?;
        Ok(())
    }

    /// Remove one reference; the user record disappears with its last one.
    pub async fn remove_ref(
        &self,
        did: Did,
        data_ref: UserDataRef,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        ops::update_many(
            &self.coll(),
            doc! { "_id": did.to_string() },
            doc! {
                "$pull": { "data": ref_bson(&data_ref) },
                "$set": { "_updated": fields::datetime_bson(now) },
            },
        )
        .await?;
        self.delete_if_empty(did).await
    }

    /// Remove every reference into a collection, across all users. Used by
    /// collection and builder cascades; idempotent by construction.
    pub async fn purge_collection(&self, collection: Uuid) -> Result<(), Error> {
        ops::update_many(
            &self.coll(),
            doc! { "data.collection": fields::uuid_bson(collection) },
            doc! { "$pull": { "data": { "collection": fields::uuid_bson(collection) } } },
        )
        .await?;
        ops::delete_many(&self.coll(), doc! { "data": { "$size": 0 } }).await?;
        Ok(())
    }

    async fn delete_if_empty(&self, did: Did) -> Result<(), Error> {
        ops::delete_many(
            &self.coll(),
            doc! { "_id": did.to_string(), "data": { "$size": 0 } },
        )
        .await?;
        Ok(())
    }
}

fn ref_bson(data_ref: &UserDataRef) -> Bson {
    Bson::Document(doc! {
        "collection": fields::uuid_bson(data_ref.collection),
        "document": fields::uuid_bson(data_ref.document),
    })
}

fn from_doc(doc: &Document) -> Result<UserRecord, Error> {
    let data = match doc.get("data") {
        Some(Bson::Array(items)) => items
            .iter()
            .map(|item| match item {
                Bson::Document(entry) => Ok(UserDataRef {
                    collection: fields::req_uuid(entry, "collection")?,
                    document: fields::req_uuid(entry, "document")?,
                }),
                _ => Err(Error::Database("malformed user data reference".into())),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };
    Ok(UserRecord {
        did: fields::req_did(doc, "_id")?,
        created_at: fields::req_datetime(doc, "_created")?,
        updated_at: fields::req_datetime(doc, "_updated")?,
        data,
    })
}
