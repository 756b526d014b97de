use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use nildb_db::json;
use nildb_nuc::Did;

use crate::domain::model::{
    AclEntry, Builder, CollectionType, IndexSpec, QueryRecord, QueryRun, UserDataRef,
    VariableSpec,
};
use crate::domain::service::CollectionMetadata;
use crate::state::Maintenance;

/// The uniform success envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ApiSuccess<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pagination {
    pub limit: i64,
    pub offset: u64,
    pub total: u64,
}

impl<T> ApiSuccess<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            pagination: None,
        }
    }

    #[must_use]
    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            data,
            pagination: Some(pagination),
        }
    }
}

// ---- Requests ----

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterBuilderRequest {
    pub did: Did,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateBuilderRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCollectionRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    pub schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStandardDataRequest {
    pub collection: Uuid,
    pub data: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOwnedDataRequest {
    pub collection: Uuid,
    pub owner: Did,
    pub data: Vec<Map<String, Value>>,
    pub acl: AclEntry,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindDataRequest {
    pub collection: Uuid,
    #[serde(default)]
    pub filter: Map<String, Value>,
    #[serde(default)]
    pub pagination: Option<PageRequest>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageRequest {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateDataRequest {
    pub collection: Uuid,
    pub filter: Map<String, Value>,
    pub update: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteDataRequest {
    pub collection: Uuid,
    pub filter: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TailQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateQueryRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub collection: Uuid,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableSpec>,
    pub pipeline: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunQueryRequest {
    pub id: Uuid,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub background: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantAccessRequest {
    pub collection: Uuid,
    pub document: Uuid,
    pub acl: AclEntry,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevokeAccessRequest {
    pub collection: Uuid,
    pub document: Uuid,
    pub grantee: Did,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogLevelRequest {
    pub level: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevokeTokenRequest {
    pub token_id: String,
}

// ---- Responses ----

#[derive(Debug, Clone, Serialize)]
pub struct BuilderDto {
    pub did: Did,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub collections: Vec<Uuid>,
}

impl From<Builder> for BuilderDto {
    fn from(builder: Builder) -> Self {
        Self {
            did: builder.did,
            name: builder.name,
            created_at: builder.created_at,
            updated_at: builder.updated_at,
            collections: builder.collections,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionDto {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<crate::domain::model::CollectionRecord> for CollectionDto {
    fn from(record: crate::domain::model::CollectionRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            collection_type: record.collection_type,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionMetadataDto {
    #[serde(flatten)]
    pub collection: CollectionDto,
    pub count: u64,
    pub size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_write: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_write: Option<DateTime<Utc>>,
    pub indexes: Vec<String>,
    pub schema: Value,
}

impl From<CollectionMetadata> for CollectionMetadataDto {
    fn from(meta: CollectionMetadata) -> Self {
        let schema = meta.record.schema.clone();
        Self {
            collection: meta.record.into(),
            count: meta.count,
            size_bytes: meta.size_bytes,
            first_write: meta.first_write,
            last_write: meta.last_write,
            indexes: meta.indexes,
            schema,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryDto {
    pub id: Uuid,
    pub name: String,
    pub collection: Uuid,
    pub variables: BTreeMap<String, VariableSpec>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<QueryRecord> for QueryDto {
    fn from(record: QueryRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            collection: record.collection,
            variables: record.variables,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunDto {
    pub id: Uuid,
    pub query: Uuid,
    pub status: crate::domain::model::RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl From<QueryRun> for RunDto {
    fn from(run: QueryRun) -> Self {
        Self {
            id: run.id,
            query: run.query,
            status: run.status,
            started_at: run.started_at,
            finished_at: run.finished_at,
            result: run.result.map(|docs| {
                docs.iter()
                    .map(|d| Value::Object(json::document_to_json_object(d)))
                    .collect()
            }),
            errors: run.errors,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceDto {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

impl From<&Maintenance> for MaintenanceDto {
    fn from(maintenance: &Maintenance) -> Self {
        Self {
            active: maintenance.active,
            since: maintenance.since,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AboutDto {
    pub version: &'static str,
    pub did: Did,
    pub started_at: DateTime<Utc>,
    pub maintenance: MaintenanceDto,
}

/// Index creation body is the index spec itself.
pub type CreateIndexRequest = IndexSpec;

/// User data references serialize as-is.
pub type UserDataRefDto = UserDataRef;

/// Render stored documents for the wire.
#[must_use]
pub fn documents_to_values(documents: &[bson::Document]) -> Vec<Value> {
    documents
        .iter()
        .map(|d| Value::Object(json::document_to_json_object(d)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_omits_absent_pagination() {
        let body = serde_json::to_value(ApiSuccess::new(json!([]))).unwrap();
        assert_eq!(body, json!({"data": []}));

        let body = serde_json::to_value(ApiSuccess::paginated(
            json!([]),
            Pagination {
                limit: 100,
                offset: 0,
                total: 0,
            },
        ))
        .unwrap();
        assert_eq!(
            body,
            json!({"data": [], "pagination": {"limit": 100, "offset": 0, "total": 0}})
        );
    }

    #[test]
    fn unknown_request_fields_are_rejected() {
        let raw = json!({"collection": Uuid::nil(), "filter": {}, "surprise": 1});
        assert!(serde_json::from_value::<FindDataRequest>(raw).is_err());
    }

    #[test]
    fn collection_type_uses_lowercase_wire_names() {
        let raw = json!({
            "name": "books",
            "type": "owned",
            "schema": {"type": "object"},
        });
        let parsed: CreateCollectionRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.collection_type, CollectionType::Owned);
    }
}
