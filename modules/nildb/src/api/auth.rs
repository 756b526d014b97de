use std::collections::HashMap;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::Method;
use serde_json::{json, Value};

use nildb_nuc::{validate_chain, Command, NucEnvelope};

use crate::domain::error::Error;
use crate::domain::model::Caller;
use crate::state::AppState;

/// Which record the route needs in its request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerKind {
    /// Token-only route (registration): no record is loaded.
    None,
    Builder,
    User,
}

/// Per-route authorisation requirements.
#[derive(Debug, Clone)]
pub struct RouteRule {
    /// The command the chain must cover; `None` skips the namespace check.
    pub command: Option<Command>,
    pub caller: CallerKind,
    /// Admin routes additionally require an authority-rooted chain.
    pub admin: bool,
}

impl RouteRule {
    /// # Panics
    /// Panics on an invalid command literal; the table is static.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn command(command: &str, caller: CallerKind) -> Self {
        Self {
            command: Some(command.parse().expect("route table command literal")),
            caller,
            admin: false,
        }
    }

    #[must_use]
    pub fn token_only() -> Self {
        Self {
            command: None,
            caller: CallerKind::None,
            admin: false,
        }
    }

    /// # Panics
    /// Panics on an invalid command literal; the table is static.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn admin(command: &str) -> Self {
        Self {
            command: Some(command.parse().expect("route table command literal")),
            caller: CallerKind::None,
            admin: true,
        }
    }
}

/// Route→rule resolution over per-method matchers.
///
/// Routes absent from every matcher are public: the middleware passes them
/// through untouched.
#[derive(Default)]
pub struct CommandPolicy {
    matchers: HashMap<Method, matchit::Router<RouteRule>>,
}

impl CommandPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for `(method, path)`; paths use `{param}` captures.
    ///
    /// # Panics
    /// Panics on conflicting patterns; the table is static and built once.
    #[allow(clippy::expect_used)]
    pub fn require(&mut self, method: Method, path: &str, rule: RouteRule) {
        self.matchers
            .entry(method)
            .or_default()
            .insert(path, rule)
            .expect("route table pattern");
    }

    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Option<&RouteRule> {
        self.matchers
            .get(method)
            .and_then(|router| router.at(path).ok())
            .map(|matched| matched.value)
    }
}

/// The validated token context attached to every authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject: nildb_nuc::Did,
    pub invoked_by: nildb_nuc::Did,
    pub command: Command,
    pub root_token_id: String,
}

/// Capability middleware: token validation, command enforcement,
/// revocation and caller loading, in that order.
///
/// The ordering is a contract: nothing else runs until the chain has been
/// proven, matched against the route's command requirement, and checked
/// against the revocation journal.
pub async fn capability_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(rule) = state.policy.resolve(req.method(), req.uri().path()) else {
        return next.run(req).await;
    };
    let rule = rule.clone();
    let Some(bearer) = extract_bearer_token(req.headers()) else {
        return Error::authentication("missing bearer token").into_response();
    };

    let envelope = match NucEnvelope::parse(bearer) {
        Ok(envelope) => envelope,
        Err(e) => return Error::from(e).into_response(),
    };

    let context = request_context(&req);
    let chain = match validate_chain(
        &envelope,
        &state.node.did,
        state.node.authority.as_ref(),
        &context,
    ) {
        Ok(chain) => chain,
        Err(e) => {
            tracing::debug!(error = %e, "token chain rejected");
            return Error::from(e).into_response();
        }
    };

    if let Some(required) = &rule.command {
        if !required.is_prefix_of(&chain.command) {
            tracing::debug!(
                required = %required,
                granted = %chain.command,
                "command namespace rejected"
            );
            return Error::authentication("token does not grant this command").into_response();
        }
    }

    if rule.admin {
        let root_issuer = envelope.root().token().issuer;
        let authorised = state.node.authority.is_some_and(|a| a == root_issuer);
        if !authorised {
            return Error::authentication("admin routes require an authority-rooted token")
                .into_response();
        }
    }

    match state.service.is_revoked(&chain.root_token_id).await {
        Ok(false) => {}
        Ok(true) => {
            tracing::debug!(token_id = %chain.root_token_id, "revoked token presented");
            return Error::authentication("token has been revoked").into_response();
        }
        Err(e) => return e.into_response(),
    }

    // Missing records yield AuthenticationError, never a 404, so the error
    // cannot be used as an existence oracle.
    let caller = match rule.caller {
        CallerKind::None => None,
        CallerKind::Builder => match state.service.load_builder(chain.subject).await {
            Ok(Some(builder)) => Some(Caller::Builder(builder)),
            Ok(None) => {
                return Error::authentication("unknown builder").into_response();
            }
            Err(e) => return e.into_response(),
        },
        CallerKind::User => match state.service.load_user(chain.subject).await {
            Ok(Some(user)) => Some(Caller::User(user)),
            Ok(None) => {
                return Error::authentication("unknown user").into_response();
            }
            Err(e) => return e.into_response(),
        },
    };

    req.extensions_mut().insert(AuthContext {
        subject: chain.subject,
        invoked_by: chain.invoked_by,
        command: chain.command,
        root_token_id: chain.root_token_id,
    });
    if let Some(caller) = caller {
        req.extensions_mut().insert(caller);
    }
    next.run(req).await
}

/// Maintenance gate, outermost: active maintenance turns every non-system
/// route into a 503 before any other logic runs.
pub async fn maintenance_gate(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let maintenance = state.maintenance.load();
    if maintenance.active && !is_maintenance_exempt(req.uri().path()) {
        let body = axum::Json(json!({
            "errors": ["ServiceUnavailable", "node is under maintenance"]
        }));
        return (http::StatusCode::SERVICE_UNAVAILABLE, body).into_response();
    }
    drop(maintenance);
    next.run(req).await
}

fn is_maintenance_exempt(path: &str) -> bool {
    path == "/about" || path.starts_with("/v1/system/")
}

fn extract_bearer_token(headers: &http::HeaderMap) -> Option<&str> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer ").map(str::trim))
}

/// The request attributes policy predicates evaluate against.
fn request_context(req: &Request) -> Value {
    let headers: serde_json::Map<String, Value> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), Value::String(v.to_owned())))
        })
        .collect();
    json!({
        "req": {
            "method": req.method().as_str(),
            "path": req.uri().path(),
            "headers": headers,
        }
    })
}
