use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::Router;
use chrono::Utc;
use secrecy::ExposeSecret;

use nildb_db::DbGateway;
use nildb_nuc::Keypair;

use crate::api::routes;
use crate::config::NodeConfig;
use crate::domain::error::Error;
use crate::domain::runner::QueryRunner;
use crate::domain::service::Service;
use crate::state::{AppState, LogLevelControl, Maintenance, NodeIdentity};

/// A wired module: the router to serve and the runner to spawn.
pub struct Module {
    pub state: AppState,
    pub router: Router,
    pub runner: QueryRunner,
}

/// Wire the module from its configuration.
///
/// Derives the node identity from the configured secret key, connects the
/// gateway and assembles the middleware stack. The caller spawns
/// [`Module::runner`] under its own cancellation token; run recovery happens
/// inside the runner before it accepts work.
///
/// # Errors
/// Invalid key material or an unreachable store.
pub async fn build(
    config: &NodeConfig,
    log_control: Arc<dyn LogLevelControl>,
) -> Result<Module, Error> {
    let keypair = Keypair::from_hex(config.identity.secret_key.expose_secret())
        .map_err(|_| Error::authentication("invalid node secret key"))?;
    let node = NodeIdentity {
        did: keypair.did(),
        authority: config.identity.authority_did,
    };
    tracing::info!(did = %node.did, "node identity derived");

    let gateway = DbGateway::connect(&config.database).await?;
    let (service, runner) = Service::new(gateway, (&config.limits).into());

    let state = AppState {
        service,
        node,
        policy: Arc::new(routes::command_policy()),
        maintenance: Arc::new(ArcSwap::from_pointee(Maintenance::default())),
        log_control,
        started_at: Utc::now(),
    };
    let router = routes::build_router(state.clone());

    Ok(Module {
        state,
        router,
        runner,
    })
}
