use bson::{doc, Document};
use uuid::Uuid;

use nildb_db::{catalog, json, ops, DbGateway};
use nildb_nuc::Did;

use crate::domain::error::Error;
use crate::domain::model::{CollectionRecord, CollectionType};
use crate::infra::storage::fields;

/// Catalog of collection definitions.
#[derive(Debug, Clone)]
pub struct CollectionsRepo {
    gateway: DbGateway,
}

impl CollectionsRepo {
    pub fn new(gateway: DbGateway) -> Self {
        Self { gateway }
    }

    fn coll(&self) -> mongodb::Collection<Document> {
        self.gateway.primary_collection(catalog::COLLECTIONS)
    }

    pub async fn insert(&self, record: &CollectionRecord) -> Result<(), Error> {
        ops::insert_many(&self.coll(), vec![to_doc(record)]).await?;
        Ok(())
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<CollectionRecord>, Error> {
        let found = ops::find_one(&self.coll(), doc! { "_id": fields::uuid_bson(id) }).await?;
        found.as_ref().map(from_doc).transpose()
    }

    /// Load a collection only when `owner` owns it; foreign and missing
    /// collections are indistinguishable to the caller.
    pub async fn find_owned(
        &self,
        id: Uuid,
        owner: Did,
    ) -> Result<Option<CollectionRecord>, Error> {
        let filter = doc! { "_id": fields::uuid_bson(id), "owner": owner.to_string() };
        let found = ops::find_one(&self.coll(), filter).await?;
        found.as_ref().map(from_doc).transpose()
    }

    pub async fn list_by_owner(&self, owner: Did) -> Result<Vec<CollectionRecord>, Error> {
        let docs = ops::find_page(
            &self.coll(),
            doc! { "owner": owner.to_string() },
            Some(doc! { "_created": 1 }),
            0,
            0,
        )
        .await?;
        docs.iter().map(from_doc).collect()
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), Error> {
        ops::delete_many(&self.coll(), doc! { "_id": fields::uuid_bson(id) }).await?;
        Ok(())
    }
}

fn to_doc(record: &CollectionRecord) -> Document {
    let type_name = match record.collection_type {
        CollectionType::Standard => "standard",
        CollectionType::Owned => "owned",
    };
    doc! {
        "_id": fields::uuid_bson(record.id),
        "owner": record.owner.to_string(),
        "name": &record.name,
        "type": type_name,
        "schema": json::json_to_bson(record.schema.clone()),
        "_created": fields::datetime_bson(record.created_at),
        "_updated": fields::datetime_bson(record.updated_at),
    }
}

fn from_doc(doc: &Document) -> Result<CollectionRecord, Error> {
    let collection_type = match fields::req_string(doc, "type")?.as_str() {
        "standard" => CollectionType::Standard,
        "owned" => CollectionType::Owned,
        other => {
            return Err(Error::Database(format!(
                "unknown collection type '{other}' in catalog"
            )))
        }
    };
    let schema = doc
        .get("schema")
        .map(json::bson_to_json)
        .unwrap_or(serde_json::Value::Null);
    Ok(CollectionRecord {
        id: fields::req_uuid(doc, "_id")?,
        owner: fields::req_did(doc, "owner")?,
        name: fields::req_string(doc, "name")?,
        collection_type,
        schema,
        created_at: fields::req_datetime(doc, "_created")?,
        updated_at: fields::req_datetime(doc, "_updated")?,
    })
}
