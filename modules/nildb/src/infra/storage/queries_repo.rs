use std::collections::BTreeMap;

use bson::{doc, Bson, Document};
use uuid::Uuid;

use nildb_db::{catalog, ops, DbGateway};
use nildb_nuc::Did;

use crate::domain::error::Error;
use crate::domain::model::{QueryRecord, VariableSpec};
use crate::infra::storage::fields;

/// Catalog of query definitions.
#[derive(Debug, Clone)]
pub struct QueriesRepo {
    gateway: DbGateway,
}

impl QueriesRepo {
    pub fn new(gateway: DbGateway) -> Self {
        Self { gateway }
    }

    fn coll(&self) -> mongodb::Collection<Document> {
        self.gateway.primary_collection(catalog::QUERIES)
    }

    pub async fn insert(&self, record: &QueryRecord) -> Result<(), Error> {
        ops::insert_many(&self.coll(), vec![to_doc(record)]).await?;
        Ok(())
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<QueryRecord>, Error> {
        let found = ops::find_one(&self.coll(), doc! { "_id": fields::uuid_bson(id) }).await?;
        found.as_ref().map(from_doc).transpose()
    }

    pub async fn list_by_owner(&self, owner: Did) -> Result<Vec<QueryRecord>, Error> {
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

    /// Cascade support: drop every query owned by a deleted builder.
    pub async fn delete_by_owner(&self, owner: Did) -> Result<u64, Error> {
        Ok(ops::delete_many(&self.coll(), doc! { "owner": owner.to_string() }).await?)
    }
}

fn to_doc(record: &QueryRecord) -> Document {
    let mut variables = Document::new();
    for (name, spec) in &record.variables {
        variables.insert(
            name.clone(),
            doc! { "path": &spec.path, "optional": spec.optional },
        );
    }
    let pipeline: Vec<Bson> = record
        .pipeline
        .iter()
        .map(|stage| Bson::Document(stage.clone()))
        .collect();
    doc! {
        "_id": fields::uuid_bson(record.id),
        "owner": record.owner.to_string(),
        "name": &record.name,
        "collection": fields::uuid_bson(record.collection),
        "variables": variables,
        "pipeline": pipeline,
        "_created": fields::datetime_bson(record.created_at),
        "_updated": fields::datetime_bson(record.updated_at),
    }
}

fn from_doc(doc: &Document) -> Result<QueryRecord, Error> {
    let mut variables = BTreeMap::new();
    if let Some(Bson::Document(raw)) = doc.get("variables") {
        for (name, value) in raw {
            let Bson::Document(spec) = value else {
                return Err(Error::Database("malformed variable spec in catalog".into()));
            };
            variables.insert(
                name.clone(),
                VariableSpec {
                    path: fields::req_string(spec, "path")?,
                    optional: fields::req_bool(spec, "optional")?,
                },
            );
        }
    }
    let pipeline = match doc.get("pipeline") {
        Some(Bson::Array(stages)) => stages
            .iter()
            .map(|stage| match stage {
                Bson::Document(d) => Ok(d.clone()),
                _ => Err(Error::Database("malformed pipeline stage in catalog".into())),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(Error::Database("missing pipeline in catalog".into())),
    };
    Ok(QueryRecord {
        id: fields::req_uuid(doc, "_id")?,
        owner: fields::req_did(doc, "owner")?,
        name: fields::req_string(doc, "name")?,
        collection: fields::req_uuid(doc, "collection")?,
        variables,
        pipeline,
        created_at: fields::req_datetime(doc, "_created")?,
        updated_at: fields::req_datetime(doc, "_updated")?,
    })
}
