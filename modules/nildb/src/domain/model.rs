use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use nildb_nuc::Did;

/// A registered principal that defines collections and queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Builder {
    pub did: Did,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Back-reference to owned collections, rebuilt by filter on cascade.
    pub collections: Vec<Uuid>,
}

/// Whether documents belong to the builder or to end-users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Standard,
    Owned,
}

/// A defined collection: the unit of schema validation.
#[derive(Debug, Clone)]
pub struct CollectionRecord {
    pub id: Uuid,
    pub owner: Did,
    pub name: String,
    pub collection_type: CollectionType,
    pub schema: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One ordered key of an index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    /// `1` ascending, `-1` descending.
    pub direction: i32,
}

/// A requested index over a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<IndexKey>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

/// One grantee's rights on an owned document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub grantee: Did,
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl AclEntry {
    /// Full rights, as the collection owner always holds.
    #[must_use]
    pub fn full(grantee: Did) -> Self {
        Self {
            grantee,
            read: true,
            write: true,
            execute: true,
        }
    }

    #[must_use]
    pub fn is_all_false(&self) -> bool {
        !self.read && !self.write && !self.execute
    }
}

/// The access dimension a request needs on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclAction {
    Read,
    Write,
    Execute,
}

impl AclAction {
    /// The ACL entry field this action checks.
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
        }
    }
}

/// A user's back-reference to one owned document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataRef {
    pub collection: Uuid,
    pub document: Uuid,
}

/// A user exists exactly as long as it owns documents.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub did: Did,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: Vec<UserDataRef>,
}

/// Position of a runtime variable inside a query pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSpec {
    pub path: String,
    #[serde(default)]
    pub optional: bool,
}

/// An immutable, parameterised aggregation over one collection.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub id: Uuid,
    pub owner: Did,
    pub name: String,
    pub collection: Uuid,
    pub variables: BTreeMap<String, VariableSpec>,
    pub pipeline: Vec<bson::Document>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a query execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Complete,
    Error,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

/// A materialised query execution.
#[derive(Debug, Clone)]
pub struct QueryRun {
    pub id: Uuid,
    pub query: Uuid,
    pub requester: Did,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// The injected pipeline the worker executes; not exposed to clients.
    pub pipeline: Vec<bson::Document>,
    pub result: Option<Vec<bson::Document>>,
    pub errors: Option<Vec<String>>,
}

/// The caller identity the authorisation middleware resolves.
#[derive(Debug, Clone)]
pub enum Caller {
    Builder(Builder),
    User(UserRecord),
}

impl Caller {
    #[must_use]
    pub fn did(&self) -> Did {
        match self {
            Self::Builder(builder) => builder.did,
            Self::User(user) => user.did,
        }
    }
}
