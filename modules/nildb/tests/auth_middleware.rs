#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Middleware behavior that must hold before any handler or store logic
//! runs: bearer extraction, chain validation, command-namespace
//! enforcement, admin gating and the maintenance gate.

mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{Duration, Utc};
use tower::ServiceExt;

use nildb::state::Maintenance;
use nildb_nuc::{NucEnvelope, NucTokenBuilder};
use support::{body_json, error_tag, self_invocation, test_app};

fn request(method: Method, path: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(bearer) = bearer {
        builder = builder.header("authorization", format!("Bearer {bearer}"));
    }
    builder
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap()
}

#[tokio::test]
async fn about_is_public() {
    let app = test_app().await;
    let response = app
        .router
        .oneshot(request(Method::GET, "/about", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["did"], app.node.did().to_string());
}

#[tokio::test]
async fn missing_bearer_is_unauthorized() {
    let app = test_app().await;
    let response = app
        .router
        .oneshot(request(Method::POST, "/v1/data/find", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_tag(&body_json(response).await), "AuthenticationError");
}

#[tokio::test]
async fn garbage_bearer_is_unauthorized() {
    let app = test_app().await;
    let response = app
        .router
        .oneshot(request(Method::POST, "/v1/data/find", Some("not-a-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_audience_is_unauthorized() {
    let app = test_app().await;
    let caller = nildb_nuc::Keypair::generate();
    let other_node = nildb_nuc::Keypair::generate();

    let token = NucTokenBuilder::invocation(serde_json::Map::new())
        .command("nil/db/data/read")
        .subject(caller.did())
        .audience(other_node.did())
        .sign(&caller)
        .unwrap();
    let bearer = NucEnvelope::from_tokens(vec![token]).unwrap().encode();

    let response = app
        .router
        .oneshot(request(Method::POST, "/v1/data/find", Some(&bearer)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let app = test_app().await;
    let caller = nildb_nuc::Keypair::generate();
    let token = NucTokenBuilder::invocation(serde_json::Map::new())
        .command("nil/db/data/read")
        .subject(caller.did())
        .audience(app.node.did())
        .expires_at(Utc::now() - Duration::minutes(5))
        .sign(&caller)
        .unwrap();
    let bearer = NucEnvelope::from_tokens(vec![token]).unwrap().encode();

    let response = app
        .router
        .oneshot(request(Method::POST, "/v1/data/find", Some(&bearer)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn command_namespace_jump_is_rejected_before_handler_logic() {
    let app = test_app().await;
    let caller = nildb_nuc::Keypair::generate();
    // Token grants queries; the route demands nil/db/data/read.
    let bearer = self_invocation(&app, &caller, "nil/db/queries");

    let response = app
        .router
        .oneshot(request(Method::GET, "/v1/data/00000000-0000-0000-0000-000000000000/tail", Some(&bearer)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_tag(&body_json(response).await), "AuthenticationError");
}

#[tokio::test]
async fn broader_grant_does_not_cover_a_narrower_route() {
    let app = test_app().await;
    let caller = nildb_nuc::Keypair::generate();
    // nil/db/data does not cover nil/db/queries/execute.
    let bearer = self_invocation(&app, &caller, "nil/db/data");

    let response = app
        .router
        .oneshot(request(Method::POST, "/v1/queries/run", Some(&bearer)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_require_authority_rooted_chains() {
    let app = test_app().await;
    let caller = nildb_nuc::Keypair::generate();
    // Self-rooted chain with the right command is still not admin.
    let bearer = self_invocation(&app, &caller, "nil/db/system");

    let response = app
        .router
        .oneshot(request(
            Method::POST,
            "/v1/system/maintenance/start",
            Some(&bearer),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn policy_violation_is_unauthorized() {
    let app = test_app().await;
    let caller = nildb_nuc::Keypair::generate();

    let root = NucTokenBuilder::delegation(vec![nildb_nuc::Policy::Eq {
        path: "$.req.headers.origin".into(),
        value: serde_json::json!("good.com"),
    }])
    .command("nil/db")
    .subject(caller.did())
    .audience(caller.did())
    .sign(&caller)
    .unwrap();
    let leaf = NucTokenBuilder::invocation(serde_json::Map::new())
        .command("nil/db/data/read")
        .subject(caller.did())
        .audience(app.node.did())
        .proof_of(&root)
        .sign(&caller)
        .unwrap();
    let bearer = NucEnvelope::from_tokens(vec![root, leaf]).unwrap().encode();

    // No origin header: the delegation predicate fails.
    let response = app
        .router
        .oneshot(request(Method::POST, "/v1/data/find", Some(&bearer)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // With the right origin the request passes the token layer (and then
    // hits caller loading, which is beyond this suite's scope).
}

#[tokio::test]
async fn maintenance_mode_turns_non_admin_routes_into_503() {
    let app = test_app().await;
    app.state.maintenance.store(Arc::new(Maintenance {
        active: true,
        since: Some(Utc::now()),
    }));

    // Auth result is irrelevant: the gate runs first.
    let response = app
        .router
        .clone()
        .oneshot(request(Method::POST, "/v1/data/find", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/builders/me", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // System surface stays reachable and reports the state.
    let response = app
        .router
        .oneshot(request(Method::GET, "/about", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["maintenance"]["active"], true);
}
