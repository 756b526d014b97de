use bson::{doc, Document};
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use nildb_db::{json, ops};
use nildb_nuc::Did;

use crate::domain::acl;
use crate::domain::error::Error;
use crate::domain::model::{
    AclAction, AclEntry, Builder, CollectionRecord, CollectionType, UserDataRef,
};
use crate::domain::service::Service;
use crate::infra::storage::fields;

/// Upper bound on one ingest batch.
pub const MAX_RECORDS_LENGTH: usize = 10_000;

const PROTECTED_FIELDS: &[&str] = &["_id", "_created", "_updated", "_owner", "_acl"];
const ALLOWED_UPDATE_OPERATORS: &[&str] = &["$set", "$unset", "$push", "$pull", "$inc"];

/// A page of documents plus the unpaginated total.
#[derive(Debug, Clone)]
pub struct DataPage {
    pub documents: Vec<Document>,
    pub total: u64,
}

/// Matched/modified counts of an update.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// Ingest request for user-owned documents.
#[derive(Debug, Clone)]
pub struct CreateOwnedRequest {
    pub collection: Uuid,
    pub owner: Did,
    pub data: Vec<Map<String, Value>>,
    pub acl: AclEntry,
}

impl Service {
    /// Ingest builder-owned documents after schema validation.
    ///
    /// All documents validate before any is written; a failing batch writes
    /// nothing.
    ///
    /// # Errors
    /// `DataValidation` on bounds, schema or `_id` violations.
    pub async fn create_standard_data(
        &self,
        caller: &Builder,
        collection_id: Uuid,
        data: Vec<Map<String, Value>>,
    ) -> Result<usize, Error> {
        let collection = self.data_collection_record(collection_id).await?;
        if collection.owner != caller.did {
            return Err(Error::ResourceAccessDenied);
        }
        if collection.collection_type != CollectionType::Standard {
            return Err(Error::data_validation(
                "collection holds user-owned documents",
            ));
        }

        let documents: Vec<Document> = prepare_documents(&collection.schema, data)?
            .into_iter()
            .map(|(_, document)| document)
            .collect();
        let inserted =
            ops::insert_many(&self.gateway.data_collection(&collection_id), documents).await?;
        tracing::debug!(collection = %collection_id, count = inserted, "ingested standard data");
        Ok(inserted)
    }

    /// Ingest user-owned documents and record the owner's references.
    ///
    /// The caller must own the collection; the supplied ACL entry must name
    /// the caller and may not be all-false. The stored entry is the owner's
    /// full-rights entry, which later grants can never remove.
    ///
    /// # Errors
    /// `AuthenticationError` for an all-false or foreign ACL entry.
    pub async fn create_owned_data(
        &self,
        caller: &Builder,
        request: CreateOwnedRequest,
    ) -> Result<usize, Error> {
        let collection = self.data_collection_record(request.collection).await?;
        if collection.owner != caller.did {
            return Err(Error::ResourceAccessDenied);
        }
        if collection.collection_type != CollectionType::Owned {
            return Err(Error::data_validation(
                "collection holds builder-owned documents",
            ));
        }
        if request.acl.grantee != caller.did {
            return Err(Error::authentication(
                "acl entry must name the collection owner",
            ));
        }
        if request.acl.is_all_false() {
            return Err(Error::authentication(
                "acl entry cannot revoke all owner access",
            ));
        }

        let prepared = prepare_documents(&collection.schema, request.data)?;
        let owner_entry = acl::entry_bson(&AclEntry::full(caller.did));
        let mut documents = Vec::with_capacity(prepared.len());
        let mut refs = Vec::with_capacity(prepared.len());
        for (id, mut document) in prepared {
            document.insert("_owner", request.owner.to_string());
            document.insert("_acl", vec![owner_entry.clone()]);
            documents.push(document);
            refs.push(UserDataRef {
                collection: request.collection,
                document: id,
            });
        }

        let inserted =
            ops::insert_many(&self.gateway.data_collection(&request.collection), documents)
                .await?;
        self.users
            .add_refs(request.owner, &refs, Utc::now())
            .await?;
        tracing::debug!(
            collection = %request.collection,
            owner = %request.owner,
            count = inserted,
            "ingested owned data"
        );
        Ok(inserted)
    }

    /// Access-controlled find with pagination.
    ///
    /// # Errors
    /// `ResourceAccessDenied` per the resolver; coercion failures.
    pub async fn find_data(
        &self,
        caller: Did,
        collection_id: Uuid,
        filter: Map<String, Value>,
        limit: Option<i64>,
        offset: Option<u64>,
    ) -> Result<DataPage, Error> {
        let collection = self.data_collection_record(collection_id).await?;
        let user_filter = filter_document(filter);
        let effective =
            acl::effective_filter(caller, &collection, AclAction::Read, user_filter)?;

        let limit = limit
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);
        let offset = offset.unwrap_or(0);

        let coll = self.gateway.data_collection(&collection_id);
        let total = ops::count(&coll, effective.clone()).await?;
        let documents = ops::find_page(&coll, effective, None, offset, limit).await?;
        Ok(DataPage { documents, total })
    }

    /// Access-controlled update restricted to a safe operator subset.
    ///
    /// # Errors
    /// `DataValidation` for forbidden operators or system fields.
    pub async fn update_data(
        &self,
        caller: Did,
        collection_id: Uuid,
        filter: Map<String, Value>,
        update: Map<String, Value>,
    ) -> Result<UpdateOutcome, Error> {
        let collection = self.data_collection_record(collection_id).await?;
        let user_filter = filter_document(filter);
        if is_selective_empty(&user_filter) {
            return Err(Error::data_validation("update filter cannot be empty"));
        }
        let effective =
            acl::effective_filter(caller, &collection, AclAction::Write, user_filter)?;

        let mut update = filter_document(update);
        validate_update_operators(&update)?;
        stamp_updated(&mut update);

        let summary = ops::update_many(
            &self.gateway.data_collection(&collection_id),
            effective,
            update,
        )
        .await?;
        Ok(UpdateOutcome {
            matched: summary.matched,
            modified: summary.modified,
        })
    }

    /// Access-controlled delete; empty filters are rejected.
    ///
    /// Owned documents reduce their owner's reference set; users whose last
    /// reference disappears are removed.
    ///
    /// # Errors
    /// `DataValidation` on an empty filter; resolver denials.
    pub async fn delete_data(
        &self,
        caller: Did,
        collection_id: Uuid,
        filter: Map<String, Value>,
    ) -> Result<u64, Error> {
        let collection = self.data_collection_record(collection_id).await?;
        let user_filter = filter_document(filter);
        if is_selective_empty(&user_filter) {
            return Err(Error::data_validation("delete filter cannot be empty"));
        }
        let effective =
            acl::effective_filter(caller, &collection, AclAction::Write, user_filter)?;
        let coll = self.gateway.data_collection(&collection_id);

        if collection.collection_type == CollectionType::Standard {
            return Ok(ops::delete_many(&coll, effective).await?);
        }

        // Owned: capture the victims first so references can be reduced.
        let victims = ops::find_page(&coll, effective, None, 0, 0).await?;
        let mut removed = 0;
        for victim in &victims {
            let Some(id) = fields::bson_uuid(victim.get("_id")) else {
                continue;
            };
            removed += ops::delete_many(&coll, doc! { "_id": fields::uuid_bson(id) }).await?;
            if let Ok(owner) = fields::req_did(victim, "_owner") {
                self.users
                    .remove_ref(
                        owner,
                        UserDataRef {
                            collection: collection_id,
                            document: id,
                        },
                        Utc::now(),
                    )
                    .await?;
            }
        }
        Ok(removed)
    }

    /// Drop every document in a collection (owner only).
    ///
    /// # Errors
    /// `ResourceAccessDenied` when the caller does not own the collection.
    pub async fn flush_data(&self, caller: &Builder, collection_id: Uuid) -> Result<u64, Error> {
        let collection = self.data_collection_record(collection_id).await?;
        if collection.owner != caller.did {
            return Err(Error::ResourceAccessDenied);
        }
        let removed =
            ops::delete_many(&self.gateway.data_collection(&collection_id), doc! {}).await?;
        if collection.collection_type == CollectionType::Owned {
            self.users.purge_collection(collection_id).await?;
        }
        tracing::info!(collection = %collection_id, count = removed, "flushed collection");
        Ok(removed)
    }

    /// The most recent documents the caller may read.
    ///
    /// # Errors
    /// Resolver denials.
    pub async fn tail_data(
        &self,
        caller: Did,
        collection_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Document>, Error> {
        let collection = self.data_collection_record(collection_id).await?;
        let effective =
            acl::effective_filter(caller, &collection, AclAction::Read, Document::new())?;
        let limit = limit
            .unwrap_or(self.config.default_tail_limit)
            .clamp(1, self.config.max_tail_limit);
        Ok(ops::find_page(
            &self.gateway.data_collection(&collection_id),
            effective,
            Some(doc! { "_created": -1 }),
            0,
            limit,
        )
        .await?)
    }

    /// Resolver entry: a missing collection is indistinguishable from a
    /// denied one.
    pub(crate) async fn data_collection_record(
        &self,
        id: Uuid,
    ) -> Result<CollectionRecord, Error> {
        self.collections
            .find(id)
            .await?
            .ok_or(Error::ResourceAccessDenied)
    }
}

/// Schema-validate a batch and prepare storage documents.
///
/// Returns each document paired with its `_id`. Validation is all-or-nothing.
fn prepare_documents(
    schema: &Value,
    data: Vec<Map<String, Value>>,
) -> Result<Vec<(Uuid, Document)>, Error> {
    if data.is_empty() {
        return Err(Error::data_validation("data batch cannot be empty"));
    }
    if data.len() > MAX_RECORDS_LENGTH {
        return Err(Error::data_validation(format!(
            "data batch exceeds {MAX_RECORDS_LENGTH} documents"
        )));
    }

    let validator = jsonschema::validator_for(schema)
        .map_err(|e| Error::Database(format!("stored schema failed to compile: {e}")))?;

    let now = fields::datetime_bson(Utc::now());
    let mut seen = std::collections::HashSet::with_capacity(data.len());
    let mut prepared = Vec::with_capacity(data.len());

    for (position, entry) in data.into_iter().enumerate() {
        let instance = Value::Object(entry);
        let issues: Vec<String> = validator
            .iter_errors(&instance)
            .map(|error| format!("document {position}: {error}"))
            .collect();
        if !issues.is_empty() {
            return Err(Error::data_validation_with_issues(
                "document does not match the collection schema",
                issues,
            ));
        }
        let Value::Object(entry) = instance else {
            return Err(Error::data_validation("document must be an object"));
        };

        let id = entry
            .get("_id")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| {
                Error::data_validation(format!("document {position}: _id must be a UUID"))
            })?;
        if !seen.insert(id) {
            return Err(Error::data_validation(format!(
                "document {position}: duplicate _id {id}"
            )));
        }

        let mut document = json::json_object_to_document(entry);
        document.insert("_id", fields::uuid_bson(id));
        document.insert("_created", now.clone());
        document.insert("_updated", now.clone());
        prepared.push((id, document));
    }
    Ok(prepared)
}

/// Reject update operators outside the safe subset and any touch of a
/// system-reserved field.
fn validate_update_operators(update: &Document) -> Result<(), Error> {
    if update.is_empty() {
        return Err(Error::data_validation("update document cannot be empty"));
    }
    for (operator, operand) in update {
        if !ALLOWED_UPDATE_OPERATORS.contains(&operator.as_str()) {
            return Err(Error::data_validation(format!(
                "update operator '{operator}' is not allowed"
            )));
        }
        let bson::Bson::Document(targets) = operand else {
            return Err(Error::data_validation(format!(
                "operand of '{operator}' must be a document"
            )));
        };
        for field in targets.keys() {
            let head = field.split('.').next().unwrap_or(field);
            if PROTECTED_FIELDS.contains(&head) {
                return Err(Error::data_validation(format!(
                    "field '{field}' cannot be modified"
                )));
            }
        }
    }
    Ok(())
}

/// Stamp `_updated` into the update's `$set`.
fn stamp_updated(update: &mut Document) {
    let now = fields::datetime_bson(Utc::now());
    match update.get_mut("$set") {
        Some(bson::Bson::Document(set)) => {
            set.insert("_updated", now);
        }
        _ => {
            update.insert("$set", doc! { "_updated": now });
        }
    }
}

fn filter_document(map: Map<String, Value>) -> Document {
    json::json_object_to_document(map)
}

/// Empty after ignoring the coercion directive.
fn is_selective_empty(filter: &Document) -> bool {
    filter.keys().all(|key| key == nildb_db::coerce::COERCE_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "_id": { "type": "string", "format": "uuid" },
                "name": { "type": "string" },
            },
            "required": ["_id", "name"],
        })
    }

    fn record(id: &str, name: &str) -> Map<String, Value> {
        match json!({"_id": id, "name": name}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn prepare_stamps_and_rewrites_ids() {
        let id = "3f5c0a1b-9b7e-4d3a-8a46-0d9a2f1b6c5e";
        let prepared = prepare_documents(&schema(), vec![record(id, "a")]).unwrap();
        assert_eq!(prepared.len(), 1);
        let (parsed, document) = &prepared[0];
        assert_eq!(parsed.to_string(), id);
        assert!(matches!(document.get("_id"), Some(bson::Bson::Binary(_))));
        assert!(matches!(
            document.get("_created"),
            Some(bson::Bson::DateTime(_))
        ));
        assert!(matches!(
            document.get("_updated"),
            Some(bson::Bson::DateTime(_))
        ));
    }

    #[test]
    fn schema_violations_reject_the_whole_batch() {
        let good = record("3f5c0a1b-9b7e-4d3a-8a46-0d9a2f1b6c5e", "a");
        let bad = match json!({"_id": "4a1b2c3d-4e5f-4071-8293-a4b5c6d7e8f9"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let err = prepare_documents(&schema(), vec![good, bad]).unwrap_err();
        assert_eq!(err.tag(), "DataValidationError");
        assert!(!err.issues().is_empty());
    }

    #[test]
    fn duplicate_ids_within_the_batch_are_rejected() {
        let id = "3f5c0a1b-9b7e-4d3a-8a46-0d9a2f1b6c5e";
        let err =
            prepare_documents(&schema(), vec![record(id, "a"), record(id, "b")]).unwrap_err();
        assert_eq!(err.tag(), "DataValidationError");
    }

    #[test]
    fn empty_batches_are_rejected() {
        let err = prepare_documents(&schema(), vec![]).unwrap_err();
        assert_eq!(err.tag(), "DataValidationError");
    }

    #[test]
    fn update_operator_subset_is_enforced() {
        validate_update_operators(&doc! { "$set": { "name": "x" } }).unwrap();
        validate_update_operators(&doc! { "$inc": { "count": 1 } }).unwrap();

        let err =
            validate_update_operators(&doc! { "$rename": { "a": "b" } }).unwrap_err();
        assert_eq!(err.tag(), "DataValidationError");
    }

    #[test]
    fn system_fields_cannot_be_touched() {
        for field in ["_id", "_created", "_updated", "_owner", "_acl", "_acl.0.read"] {
            let mut targets = Document::new();
            targets.insert(field, 1);
            let mut update = Document::new();
            update.insert("$set", targets);
            let err = validate_update_operators(&update).unwrap_err();
            assert_eq!(err.tag(), "DataValidationError", "field {field}");
        }
    }

    #[test]
    fn updated_stamp_merges_into_existing_set() {
        let mut update = doc! { "$set": { "name": "x" } };
        stamp_updated(&mut update);
        let set = update.get_document("$set").unwrap();
        assert!(set.contains_key("name"));
        assert!(set.contains_key("_updated"));

        let mut update = doc! { "$inc": { "n": 1 } };
        stamp_updated(&mut update);
        assert!(update.get_document("$set").unwrap().contains_key("_updated"));
    }

    #[test]
    fn coerce_only_filters_count_as_empty() {
        assert!(is_selective_empty(&doc! {}));
        assert!(is_selective_empty(&doc! { "$coerce": { "_id": "uuid" } }));
        assert!(!is_selective_empty(
            &doc! { "_id": "x", "$coerce": { "_id": "uuid" } }
        ));
    }
}
