use std::collections::BTreeMap;

use bson::{doc, Document};
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use nildb_db::json;
use nildb_nuc::Did;

use crate::domain::error::Error;
use crate::domain::model::{
    Builder, CollectionType, QueryRecord, QueryRun, RunStatus, VariableSpec,
};
use crate::domain::query;
use crate::domain::service::Service;

/// A request to execute a stored query.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: Uuid,
    pub variables: Map<String, Value>,
    /// `false` blocks until the terminal state; `true` returns immediately.
    pub background: bool,
}

impl Service {
    /// Create an immutable query definition, validated against its own
    /// pipeline.
    ///
    /// # Errors
    /// `CollectionNotFound` for foreign collections; definition validation
    /// failures with their own tags.
    pub async fn create_query(
        &self,
        caller: &Builder,
        id: Option<Uuid>,
        name: String,
        collection: Uuid,
        variables: BTreeMap<String, VariableSpec>,
        pipeline: Vec<Value>,
    ) -> Result<QueryRecord, Error> {
        if name.trim().is_empty() {
            return Err(Error::data_validation("query name cannot be empty"));
        }
        self.owned_collection(caller, collection).await?;

        let pipeline = pipeline_documents(pipeline)?;
        let id = id.unwrap_or_else(Uuid::new_v4);
        if self.queries.find(id).await?.is_some() {
            return Err(Error::data_validation("query id already exists"));
        }

        let now = Utc::now();
        let record = QueryRecord {
            id,
            owner: caller.did,
            name,
            collection,
            variables,
            pipeline,
            created_at: now,
            updated_at: now,
        };
        query::validate_query(&record)?;
        self.queries.insert(&record).await?;
        tracing::info!(query = %id, owner = %caller.did, "created query");
        Ok(record)
    }

    /// List the caller's query definitions.
    ///
    /// # Errors
    /// Catalog failures.
    pub async fn list_queries(&self, caller: &Builder) -> Result<Vec<QueryRecord>, Error> {
        self.queries.list_by_owner(caller.did).await
    }

    /// Read one definition; absent and foreign are indistinguishable.
    ///
    /// # Errors
    /// `DocumentNotFound`.
    pub async fn get_query(&self, caller: &Builder, id: Uuid) -> Result<QueryRecord, Error> {
        match self.queries.find(id).await? {
            Some(record) if record.owner == caller.did => Ok(record),
            _ => Err(Error::DocumentNotFound),
        }
    }

    /// Delete one definition (owner only).
    ///
    /// # Errors
    /// `DocumentNotFound`.
    pub async fn delete_query(&self, caller: &Builder, id: Uuid) -> Result<(), Error> {
        self.get_query(caller, id).await?;
        self.queries.delete(id).await?;
        tracing::info!(query = %id, "deleted query");
        Ok(())
    }

    /// Execute a stored query with runtime variables.
    ///
    /// The run is journalled as `pending` first; synchronous requests then
    /// drive the same state machine inline, background requests hand the id
    /// to the worker.
    ///
    /// # Errors
    /// Variable mismatches (`DataValidation`), access denials, and ledger
    /// failures.
    pub async fn run_query(&self, caller: Did, request: RunRequest) -> Result<QueryRun, Error> {
        let Some(record) = self.queries.find(request.query).await? else {
            return Err(Error::ResourceAccessDenied);
        };
        if record.owner != caller {
            // Not-found-equivalent; existence is not disclosed.
            return Err(Error::ResourceAccessDenied);
        }

        query::validate_variables(&record.variables, &request.variables)?;
        let types = query::validate_query(&record)?;
        let mut pipeline =
            query::inject_variables(&record.pipeline, &record.variables, &types, &request.variables)?;

        // For user-owned collections the store itself enforces execute
        // rights, by prefixing the pipeline with the ACL predicate.
        let collection = self.data_collection_record(record.collection).await?;
        if collection.collection_type == CollectionType::Owned {
            let acl_stage = doc! { "$match": {
                "_acl": { "$elemMatch": { "grantee": caller.to_string(), "execute": true } }
            } };
            pipeline.insert(0, acl_stage);
        }

        let run = QueryRun {
            id: Uuid::new_v4(),
            query: record.id,
            requester: caller,
            status: RunStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            pipeline,
            result: None,
            errors: None,
        };
        self.runs.insert(&run).await?;

        if request.background {
            self.enqueue_run(run.id)?;
            tracing::debug!(run = %run.id, query = %record.id, "queued background run");
            return Ok(run);
        }

        self.executor.execute(run.id).await?;
        self.runs
            .find(run.id)
            .await?
            .ok_or_else(|| Error::Database("run vanished during execution".into()))
    }

    /// Poll a run by id (requester only).
    ///
    /// # Errors
    /// `DocumentNotFound` for unknown or foreign runs.
    pub async fn get_run(&self, caller: Did, id: Uuid) -> Result<QueryRun, Error> {
        match self.runs.find(id).await? {
            Some(run) if run.requester == caller => Ok(run),
            _ => Err(Error::DocumentNotFound),
        }
    }
}

fn pipeline_documents(pipeline: Vec<Value>) -> Result<Vec<Document>, Error> {
    if pipeline.is_empty() {
        return Err(Error::data_validation("pipeline cannot be empty"));
    }
    pipeline
        .into_iter()
        .map(|stage| match stage {
            Value::Object(map) => Ok(json::json_object_to_document(map)),
            _ => Err(Error::data_validation("pipeline stages must be objects")),
        })
        .collect()
}
