//! Domain services: business rules per entity family.
//!
//! Handlers call methods here with business parameters only; every method
//! returns the closed [`Error`](crate::domain::error::Error) taxonomy.
//! Submodules split the surface by family, the same way the catalog is
//! split by repo.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use nildb_db::DbGateway;
use nildb_nuc::Did;

use crate::domain::error::Error;
use crate::domain::model::{Builder, UserRecord};
use crate::domain::runner::{QueryRunner, RunExecutor};
use crate::infra::cache::{BuilderCache, RevocationCache};
use crate::infra::storage::{
    BuildersRepo, CollectionsRepo, QueriesRepo, RevocationsRepo, RunsRepo, UsersRepo,
};

mod builders;
mod collections;
mod data;
mod queries;
mod users;

pub use collections::CollectionMetadata;
pub use data::{CreateOwnedRequest, DataPage, UpdateOutcome};
pub use queries::RunRequest;

/// Tunables for the document and query engines.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub default_page_size: i64,
    pub max_page_size: i64,
    pub default_tail_limit: i64,
    pub max_tail_limit: i64,
    pub run_timeout: Duration,
    pub revocation_cache_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 1_000,
            default_tail_limit: 10,
            max_tail_limit: 100,
            run_timeout: Duration::from_secs(60),
            revocation_cache_ttl: Duration::from_secs(30),
        }
    }
}

/// The service facade the REST layer talks to.
pub struct Service {
    pub(crate) gateway: DbGateway,
    pub(crate) builders: BuildersRepo,
    pub(crate) collections: CollectionsRepo,
    pub(crate) queries: QueriesRepo,
    pub(crate) runs: RunsRepo,
    pub(crate) revocations: RevocationsRepo,
    pub(crate) users: UsersRepo,
    pub(crate) builder_cache: BuilderCache,
    pub(crate) revocation_cache: RevocationCache,
    pub(crate) executor: RunExecutor,
    pub(crate) config: ServiceConfig,
    run_tx: mpsc::UnboundedSender<Uuid>,
}

impl Service {
    /// Wire the service and its background runner around one gateway.
    #[must_use]
    pub fn new(gateway: DbGateway, config: ServiceConfig) -> (Arc<Self>, QueryRunner) {
        let builders = BuildersRepo::new(gateway.clone());
        let collections = CollectionsRepo::new(gateway.clone());
        let queries = QueriesRepo::new(gateway.clone());
        let runs = RunsRepo::new(gateway.clone());
        let revocations = RevocationsRepo::new(gateway.clone());
        let users = UsersRepo::new(gateway.clone());
        let executor = RunExecutor::new(
            gateway.clone(),
            queries.clone(),
            runs.clone(),
            config.run_timeout,
        );

        let (run_tx, run_rx) = mpsc::unbounded_channel();
        let runner = QueryRunner::new(run_rx, executor.clone());

        let service = Arc::new(Self {
            gateway,
            builders,
            collections,
            queries,
            runs,
            revocations,
            users,
            builder_cache: BuilderCache::new(),
            revocation_cache: RevocationCache::new(config.revocation_cache_ttl),
            executor,
            config,
            run_tx,
        });
        (service, runner)
    }

    /// Cache-through builder lookup used by the authorisation middleware.
    ///
    /// # Errors
    /// Catalog failures.
    pub async fn load_builder(&self, did: Did) -> Result<Option<Builder>, Error> {
        if let Some(cached) = self.builder_cache.get(did) {
            return Ok(Some(cached));
        }
        let loaded = self.builders.find(did).await?;
        if let Some(builder) = &loaded {
            self.builder_cache.store(builder.clone());
        }
        Ok(loaded)
    }

    /// User lookup for user-family routes.
    ///
    /// # Errors
    /// Catalog failures.
    pub async fn load_user(&self, did: Did) -> Result<Option<UserRecord>, Error> {
        self.users.find(did).await
    }

    /// Revocation check with the short-TTL cache in front of the journal.
    ///
    /// # Errors
    /// Journal failures; a cache miss re-reads the journal.
    pub async fn is_revoked(&self, token_id: &str) -> Result<bool, Error> {
        if let Some(cached) = self.revocation_cache.get(token_id) {
            return Ok(cached);
        }
        let revoked = self.revocations.contains(token_id).await?;
        self.revocation_cache.store(token_id.to_owned(), revoked);
        Ok(revoked)
    }

    /// Journal a root-token revocation, effective immediately.
    ///
    /// # Errors
    /// Journal failures.
    pub async fn revoke_token(&self, token_id: &str) -> Result<(), Error> {
        self.revocations.insert(token_id, Utc::now()).await?;
        self.revocation_cache.store(token_id.to_owned(), true);
        tracing::info!(token_id = %token_id, "token revoked");
        Ok(())
    }

    pub(crate) fn enqueue_run(&self, run_id: Uuid) -> Result<(), Error> {
        self.run_tx
            .send(run_id)
            .map_err(|_| Error::Database("background runner is not available".into()))
    }
}
