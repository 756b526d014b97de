use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use nildb_db::{catalog, ops, DbGateway};
use nildb_nuc::Did;

use crate::domain::error::Error;
use crate::domain::model::Builder;
use crate::infra::storage::fields;

/// Catalog of registered builders.
#[derive(Debug, Clone)]
pub struct BuildersRepo {
    gateway: DbGateway,
}

impl BuildersRepo {
    pub fn new(gateway: DbGateway) -> Self {
        Self { gateway }
    }

    fn coll(&self) -> mongodb::Collection<Document> {
        self.gateway.primary_collection(catalog::BUILDERS)
    }

    pub async fn insert(&self, builder: &Builder) -> Result<(), Error> {
        let doc = to_doc(builder);
        ops::insert_many(&self.coll(), vec![doc]).await?;
        Ok(())
    }

    pub async fn find(&self, did: Did) -> Result<Option<Builder>, Error> {
        let found = ops::find_one(&self.coll(), doc! { "_id": did.to_string() }).await?;
        found.as_ref().map(from_doc).transpose()
    }

    pub async fn update_name(
        &self,
        did: Did,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        ops::update_one_required(
            &self.coll(),
            doc! { "_id": did.to_string() },
            doc! { "$set": { "name": name, "_updated": fields::datetime_bson(now) } },
        )
        .await?;
        Ok(())
    }

    /// Maintain the collections back-reference.
    pub async fn add_collection(
        &self,
        did: Did,
        collection: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        ops::update_one_required(
            &self.coll(),
            doc! { "_id": did.to_string() },
            doc! {
                "$addToSet": { "collections": fields::uuid_bson(collection) },
                "$set": { "_updated": fields::datetime_bson(now) },
            },
        )
        .await?;
        Ok(())
    }

    pub async fn remove_collection(
        &self,
        did: Did,
        collection: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        ops::update_one_required(
            &self.coll(),
            doc! { "_id": did.to_string() },
            doc! {
                "$pull": { "collections": fields::uuid_bson(collection) },
                "$set": { "_updated": fields::datetime_bson(now) },
            },
        )
        .await?;
        Ok(())
    }

    pub async fn delete(&self, did: Did) -> Result<(), Error> {
        ops::delete_many(&self.coll(), doc! { "_id": did.to_string() }).await?;
        Ok(())
    }
}

fn to_doc(builder: &Builder) -> Document {
    let collections: Vec<Bson> = builder
        .collections
        .iter()
        .map(|id| fields::uuid_bson(*id))
        .collect();
    doc! {
        "_id": builder.did.to_string(),
        "name": &builder.name,
        "_created": fields::datetime_bson(builder.created_at),
        "_updated": fields::datetime_bson(builder.updated_at),
        "collections": collections,
    }
}

fn from_doc(doc: &Document) -> Result<Builder, Error> {
    let collections = match doc.get("collections") {
        Some(Bson::Array(items)) => items
            .iter()
            .map(|item| {
                fields::bson_uuid(Some(item))
                    .ok_or_else(|| Error::Database("malformed collections back-reference".into()))
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };
    Ok(Builder {
        did: fields::req_did(doc, "_id")?,
        name: fields::req_string(doc, "name")?,
        created_at: fields::req_datetime(doc, "_created")?,
        updated_at: fields::req_datetime(doc, "_updated")?,
        collections,
    })
}
