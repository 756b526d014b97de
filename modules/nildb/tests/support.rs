#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

//! Test support: an app wired to a lazy gateway plus token minting helpers.
//!
//! The MongoDB client connects lazily, so everything that terminates before
//! a store read (the whole middleware surface) is testable without a
//! database.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::Router;
use chrono::Utc;

use nildb::api::routes;
use nildb::domain::service::{Service, ServiceConfig};
use nildb::state::{AppState, Maintenance, NodeIdentity, StaticLogControl};
use nildb_db::{DbGateway, DbOptions};
use nildb_nuc::{Keypair, NucEnvelope, NucTokenBuilder};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub node: Keypair,
    pub authority: Keypair,
}

pub async fn test_app() -> TestApp {
    let gateway = DbGateway::connect(&DbOptions {
        url: "mongodb://127.0.0.1:27017".into(),
        base_name: "nildb_test".into(),
    })
    .await
    .expect("lazy client construction");

    let node = Keypair::generate();
    let authority = Keypair::generate();
    let (service, _runner) = Service::new(gateway, ServiceConfig::default());
    let state = AppState {
        service,
        node: NodeIdentity {
            did: node.did(),
            authority: Some(authority.did()),
        },
        policy: Arc::new(routes::command_policy()),
        maintenance: Arc::new(ArcSwap::from_pointee(Maintenance::default())),
        log_control: Arc::new(StaticLogControl::default()),
        started_at: Utc::now(),
    };
    TestApp {
        router: routes::build_router(state.clone()),
        state,
        node,
        authority,
    }
}

/// A self-signed invocation envelope for `caller` against the app's node.
pub fn self_invocation(app: &TestApp, caller: &Keypair, command: &str) -> String {
    let token = NucTokenBuilder::invocation(serde_json::Map::new())
        .command(command)
        .subject(caller.did())
        .audience(app.node.did())
        .sign(caller)
        .unwrap();
    NucEnvelope::from_tokens(vec![token]).unwrap().encode()
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// First element of the error envelope: the stable tag.
pub fn error_tag(body: &serde_json::Value) -> String {
    body["errors"][0].as_str().unwrap_or_default().to_owned()
}
