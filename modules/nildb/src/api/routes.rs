use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;
use http::Method;

use crate::api::auth::{capability_middleware, maintenance_gate, CallerKind, CommandPolicy, RouteRule};
use crate::api::handlers;
use crate::state::AppState;

/// The route→command table (§ the HTTP surface).
///
/// Kept adjacent to [`build_router`] so the two stay in lockstep: every
/// authenticated route here must have a rule, and the middleware treats
/// unlisted routes as public.
pub fn command_policy() -> CommandPolicy {
    let mut policy = CommandPolicy::new();

    policy.require(
        Method::POST,
        "/v1/builders/register",
        RouteRule::token_only(),
    );
    policy.require(
        Method::GET,
        "/v1/builders/me",
        RouteRule::command("nil/db/builders/read", CallerKind::Builder),
    );
    policy.require(
        Method::POST,
        "/v1/builders/me",
        RouteRule::command("nil/db/builders/update", CallerKind::Builder),
    );
    policy.require(
        Method::DELETE,
        "/v1/builders/me",
        RouteRule::command("nil/db/builders/delete", CallerKind::Builder),
    );

    policy.require(
        Method::GET,
        "/v1/collections",
        RouteRule::command("nil/db/collections/read", CallerKind::Builder),
    );
    policy.require(
        Method::POST,
        "/v1/collections",
        RouteRule::command("nil/db/collections/create", CallerKind::Builder),
    );
    policy.require(
        Method::GET,
        "/v1/collections/{id}",
        RouteRule::command("nil/db/collections/read", CallerKind::Builder),
    );
    policy.require(
        Method::DELETE,
        "/v1/collections/{id}",
        RouteRule::command("nil/db/collections/delete", CallerKind::Builder),
    );
    policy.require(
        Method::POST,
        "/v1/collections/{id}/indexes",
        RouteRule::command("nil/db/collections/update", CallerKind::Builder),
    );
    policy.require(
        Method::DELETE,
        "/v1/collections/{id}/indexes/{name}",
        RouteRule::command("nil/db/collections/update", CallerKind::Builder),
    );

    policy.require(
        Method::POST,
        "/v1/data/standard",
        RouteRule::command("nil/db/data/create", CallerKind::Builder),
    );
    policy.require(
        Method::POST,
        "/v1/data/owned",
        RouteRule::command("nil/db/data/create", CallerKind::Builder),
    );
    policy.require(
        Method::POST,
        "/v1/data/find",
        RouteRule::command("nil/db/data/read", CallerKind::Builder),
    );
    policy.require(
        Method::POST,
        "/v1/data/update",
        RouteRule::command("nil/db/data/update", CallerKind::Builder),
    );
    policy.require(
        Method::POST,
        "/v1/data/delete",
        RouteRule::command("nil/db/data/delete", CallerKind::Builder),
    );
    policy.require(
        Method::DELETE,
        "/v1/data/{id}/flush",
        RouteRule::command("nil/db/data/delete", CallerKind::Builder),
    );
    policy.require(
        Method::GET,
        "/v1/data/{id}/tail",
        RouteRule::command("nil/db/data/read", CallerKind::Builder),
    );

    policy.require(
        Method::GET,
        "/v1/queries",
        RouteRule::command("nil/db/queries/read", CallerKind::Builder),
    );
    policy.require(
        Method::POST,
        "/v1/queries",
        RouteRule::command("nil/db/queries/create", CallerKind::Builder),
    );
    policy.require(
        Method::GET,
        "/v1/queries/{id}",
        RouteRule::command("nil/db/queries/read", CallerKind::Builder),
    );
    policy.require(
        Method::DELETE,
        "/v1/queries/{id}",
        RouteRule::command("nil/db/queries/delete", CallerKind::Builder),
    );
    policy.require(
        Method::POST,
        "/v1/queries/run",
        RouteRule::command("nil/db/queries/execute", CallerKind::Builder),
    );
    policy.require(
        Method::GET,
        "/v1/queries/runs/{id}",
        RouteRule::command("nil/db/queries/read", CallerKind::Builder),
    );

    policy.require(
        Method::GET,
        "/v1/users/me/data",
        RouteRule::command("nil/db/users/read", CallerKind::User),
    );
    policy.require(
        Method::GET,
        "/v1/users/data/{collection}/{document}",
        RouteRule::command("nil/db/users/read", CallerKind::User),
    );
    policy.require(
        Method::DELETE,
        "/v1/users/data/{collection}/{document}",
        RouteRule::command("nil/db/users/delete", CallerKind::User),
    );
    policy.require(
        Method::POST,
        "/v1/users/data/acl/grant",
        RouteRule::command("nil/db/users/update", CallerKind::User),
    );
    policy.require(
        Method::POST,
        "/v1/users/data/acl/revoke",
        RouteRule::command("nil/db/users/update", CallerKind::User),
    );

    policy.require(
        Method::POST,
        "/v1/system/log-level",
        RouteRule::admin("nil/db/system"),
    );
    policy.require(
        Method::POST,
        "/v1/system/maintenance/start",
        RouteRule::admin("nil/db/system"),
    );
    policy.require(
        Method::POST,
        "/v1/system/maintenance/stop",
        RouteRule::admin("nil/db/system"),
    );
    policy.require(
        Method::POST,
        "/v1/system/revoke",
        RouteRule::admin("nil/db/system"),
    );

    policy
}

/// Assemble the `/v1` surface with the middleware stack.
///
/// Layer order (outermost first): maintenance gate, then capability
/// middleware, then the handlers - token validation happens only for
/// requests that survive the gate.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/about", get(handlers::system::about))
        .route("/v1/system/about", get(handlers::system::about))
        .route("/v1/system/log-level", post(handlers::system::set_log_level))
        .route(
            "/v1/system/maintenance/start",
            post(handlers::system::maintenance_start),
        )
        .route(
            "/v1/system/maintenance/stop",
            post(handlers::system::maintenance_stop),
        )
        .route("/v1/system/revoke", post(handlers::system::revoke_token))
        .route("/v1/builders/register", post(handlers::builders::register))
        .route(
            "/v1/builders/me",
            get(handlers::builders::me)
                .post(handlers::builders::update)
                .delete(handlers::builders::delete),
        )
        .route(
            "/v1/collections",
            get(handlers::collections::list).post(handlers::collections::create),
        )
        .route(
            "/v1/collections/{id}",
            get(handlers::collections::metadata).delete(handlers::collections::delete),
        )
        .route(
            "/v1/collections/{id}/indexes",
            post(handlers::collections::create_index),
        )
        .route(
            "/v1/collections/{id}/indexes/{name}",
            delete(handlers::collections::drop_index),
        )
        .route("/v1/data/standard", post(handlers::data::create_standard))
        .route("/v1/data/owned", post(handlers::data::create_owned))
        .route("/v1/data/find", post(handlers::data::find))
        .route("/v1/data/update", post(handlers::data::update))
        .route("/v1/data/delete", post(handlers::data::delete))
        .route("/v1/data/{id}/flush", delete(handlers::data::flush))
        .route("/v1/data/{id}/tail", get(handlers::data::tail))
        .route(
            "/v1/queries",
            get(handlers::queries::list).post(handlers::queries::create),
        )
        .route(
            "/v1/queries/{id}",
            get(handlers::queries::get).delete(handlers::queries::delete),
        )
        .route("/v1/queries/run", post(handlers::queries::run))
        .route("/v1/queries/runs/{id}", get(handlers::queries::get_run))
        .route("/v1/users/me/data", get(handlers::users::list_data))
        .route(
            "/v1/users/data/{collection}/{document}",
            get(handlers::users::read_document).delete(handlers::users::delete_document),
        )
        .route("/v1/users/data/acl/grant", post(handlers::users::grant))
        .route("/v1/users/data/acl/revoke", post(handlers::users::revoke));

    router
        .layer(from_fn_with_state(state.clone(), capability_middleware))
        .layer(from_fn_with_state(state.clone(), maintenance_gate))
        .layer(tower_http::timeout::TimeoutLayer::new(REQUEST_DEADLINE))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Request deadline; store calls are dropped with the handler future.
const REQUEST_DEADLINE: std::time::Duration = std::time::Duration::from_secs(30);

/// Ingest batches dominate body size; 16 MiB bounds a full batch.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
