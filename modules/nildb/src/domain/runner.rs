use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use nildb_db::{ops, DbGateway};

use crate::domain::error::Error;
use crate::infra::storage::{QueriesRepo, RunsRepo};

/// Executes one query run through its state machine.
///
/// Shared by the synchronous path (the handler awaits the terminal state)
/// and the background worker; both observe identical transitions.
#[derive(Debug, Clone)]
pub struct RunExecutor {
    gateway: DbGateway,
    queries: QueriesRepo,
    runs: RunsRepo,
    timeout: Duration,
}

impl RunExecutor {
    pub fn new(
        gateway: DbGateway,
        queries: QueriesRepo,
        runs: RunsRepo,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            queries,
            runs,
            timeout,
        }
    }

    /// Drive a pending run to a terminal state.
    ///
    /// A run that is no longer `pending` is left untouched, which makes
    /// duplicate deliveries harmless.
    ///
    /// # Errors
    /// Ledger access failures only; execution failures land in the run's
    /// `errors` instead.
    pub async fn execute(&self, run_id: Uuid) -> Result<(), Error> {
        if !self.runs.mark_running(run_id).await? {
            tracing::debug!(run_id = %run_id, "run is not pending, skipping");
            return Ok(());
        }

        let Some(run) = self.runs.find(run_id).await? else {
            tracing::warn!(run_id = %run_id, "run vanished after transition");
            return Ok(());
        };

        let Some(query) = self.queries.find(run.query).await? else {
            self.runs
                .fail(run_id, vec!["query definition no longer exists".into()], Utc::now())
                .await?;
            return Ok(());
        };

        let coll = self.gateway.data_collection(&query.collection);
        let outcome =
            tokio::time::timeout(self.timeout, ops::aggregate(&coll, run.pipeline.clone())).await;

        match outcome {
            Ok(Ok(result)) => {
                tracing::debug!(run_id = %run_id, documents = result.len(), "run complete");
                self.runs.complete(run_id, result, Utc::now()).await?;
            }
            Ok(Err(db_err)) => {
                tracing::warn!(run_id = %run_id, error = %db_err, "run failed");
                self.runs
                    .fail(run_id, vec![db_err.to_string()], Utc::now())
                    .await?;
            }
            Err(_) => {
                tracing::warn!(run_id = %run_id, "run timed out");
                self.runs
                    .fail(run_id, vec!["query execution timed out".into()], Utc::now())
                    .await?;
            }
        }
        Ok(())
    }

    /// Startup recovery: fail every run the previous process left in
    /// `running`. Must complete before the worker accepts new work.
    ///
    /// # Errors
    /// Ledger access failures.
    pub async fn recover_interrupted(&self) -> Result<u64, Error> {
        let recovered = self
            .runs
            .fail_all_running("node restarted during execution")
            .await?;
        if recovered > 0 {
            tracing::info!(count = recovered, "failed runs interrupted by restart");
        }
        Ok(recovered)
    }
}

/// The single logical background worker draining pending runs.
pub struct QueryRunner {
    rx: mpsc::UnboundedReceiver<Uuid>,
    executor: RunExecutor,
}

impl QueryRunner {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Uuid>, executor: RunExecutor) -> Self {
        Self { rx, executor }
    }

    /// Recover interrupted runs, then serve the queue until cancellation.
    pub async fn run(mut self, cancel: CancellationToken) {
        if let Err(e) = self.executor.recover_interrupted().await {
            tracing::error!(error = %e, "run recovery failed");
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("query runner shutting down");
                    return;
                }
                received = self.rx.recv() => {
                    let Some(run_id) = received else {
                        tracing::info!("run queue closed, runner exiting");
                        return;
                    };
                    if let Err(e) = self.executor.execute(run_id).await {
                        tracing::error!(run_id = %run_id, error = %e, "run execution errored");
                    }
                }
            }
        }
    }
}
