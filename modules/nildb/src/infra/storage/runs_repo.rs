use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use nildb_db::{catalog, ops, DbGateway};
use nildb_nuc::Did;

use crate::domain::error::Error;
use crate::domain::model::{QueryRun, RunStatus};
use crate::infra::storage::fields;

/// Ledger of query runs.
///
/// Status transitions are guarded by filters so they can only move forward:
/// a lost race leaves the ledger untouched instead of rewinding a state.
#[derive(Debug, Clone)]
pub struct RunsRepo {
    gateway: DbGateway,
}

impl RunsRepo {
    pub fn new(gateway: DbGateway) -> Self {
        Self { gateway }
    }

    fn coll(&self) -> mongodb::Collection<Document> {
        self.gateway.primary_collection(catalog::QUERY_RUNS)
    }

    pub async fn insert(&self, run: &QueryRun) -> Result<(), Error> {
        ops::insert_many(&self.coll(), vec![to_doc(run)]).await?;
        Ok(())
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<QueryRun>, Error> {
        let found = ops::find_one(&self.coll(), doc! { "_id": fields::uuid_bson(id) }).await?;
        found.as_ref().map(from_doc).transpose()
    }

    /// `pending → running`. Returns false when the run was not pending.
    pub async fn mark_running(&self, id: Uuid) -> Result<bool, Error> {
        let summary = ops::update_many(
            &self.coll(),
            doc! { "_id": fields::uuid_bson(id), "status": RunStatus::Pending.as_str() },
            doc! { "$set": { "status": RunStatus::Running.as_str() } },
        )
        .await?;
        Ok(summary.matched == 1)
    }

    /// `running → complete` with the result set.
    pub async fn complete(
        &self,
        id: Uuid,
        result: Vec<Document>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let result: Vec<Bson> = result.into_iter().map(Bson::Document).collect();
        ops::update_many(
            &self.coll(),
            doc! { "_id": fields::uuid_bson(id), "status": RunStatus::Running.as_str() },
            doc! { "$set": {
                "status": RunStatus::Complete.as_str(),
                "finished_at": fields::datetime_bson(finished_at),
                "result": result,
            } },
        )
        .await?;
        Ok(())
    }

    /// `running → error` with human-readable reasons.
    pub async fn fail(
        &self,
        id: Uuid,
        errors: Vec<String>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        ops::update_many(
            &self.coll(),
            doc! { "_id": fields::uuid_bson(id), "status": RunStatus::Running.as_str() },
            doc! { "$set": {
                "status": RunStatus::Error.as_str(),
                "finished_at": fields::datetime_bson(finished_at),
                "errors": errors,
            } },
        )
        .await?;
        Ok(())
    }

    /// Startup recovery: anything still `running` did not survive the
    /// previous process and is failed so the ledger stays truthful.
    pub async fn fail_all_running(&self, reason: &str) -> Result<u64, Error> {
        let summary = ops::update_many(
            &self.coll(),
            doc! { "status": RunStatus::Running.as_str() },
            doc! { "$set": {
                "status": RunStatus::Error.as_str(),
                "finished_at": fields::datetime_bson(Utc::now()),
                "errors": [reason],
            } },
        )
        .await?;
        Ok(summary.modified)
    }
}

fn to_doc(run: &QueryRun) -> Document {
    let pipeline: Vec<Bson> = run
        .pipeline
        .iter()
        .cloned()
        .map(Bson::Document)
        .collect();
    let mut doc = doc! {
        "_id": fields::uuid_bson(run.id),
        "query": fields::uuid_bson(run.query),
        "requester": run.requester.to_string(),
        "status": run.status.as_str(),
        "started_at": fields::datetime_bson(run.started_at),
        "pipeline": pipeline,
    };
    if let Some(finished_at) = run.finished_at {
        doc.insert("finished_at", fields::datetime_bson(finished_at));
    }
    if let Some(result) = &run.result {
        let result: Vec<Bson> = result.iter().cloned().map(Bson::Document).collect();
        doc.insert("result", result);
    }
    if let Some(errors) = &run.errors {
        doc.insert("errors", errors.clone());
    }
    doc
}

fn from_doc(doc: &Document) -> Result<QueryRun, Error> {
    let status = match fields::req_string(doc, "status")?.as_str() {
        "pending" => RunStatus::Pending,
        "running" => RunStatus::Running,
        "complete" => RunStatus::Complete,
        "error" => RunStatus::Error,
        other => {
            return Err(Error::Database(format!(
                "unknown run status '{other}' in ledger"
            )))
        }
    };
    let result = match doc.get("result") {
        Some(Bson::Array(items)) => Some(
            items
                .iter()
                .map(|item| match item {
                    Bson::Document(d) => Ok(d.clone()),
                    _ => Err(Error::Database("malformed run result in ledger".into())),
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        _ => None,
    };
    let errors = match doc.get("errors") {
        Some(Bson::Array(items)) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Bson::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    };
    let pipeline = match doc.get("pipeline") {
        Some(Bson::Array(stages)) => stages
            .iter()
            .filter_map(|stage| match stage {
                Bson::Document(d) => Some(d.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(QueryRun {
        id: fields::req_uuid(doc, "_id")?,
        query: fields::req_uuid(doc, "query")?,
        requester: fields::req_did(doc, "requester")?,
        status,
        started_at: fields::req_datetime(doc, "started_at")?,
        finished_at: fields::opt_datetime(doc, "finished_at"),
        pipeline,
        result,
        errors,
    })
}
