use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;

use crate::api::dto::{AboutDto, ApiSuccess, LogLevelRequest, MaintenanceDto, RevokeTokenRequest};
use crate::domain::error::Error;
use crate::state::{AppState, Maintenance};

/// `GET /about` and `GET /v1/system/about` - node identity and state.
pub async fn about(State(state): State<AppState>) -> Json<ApiSuccess<AboutDto>> {
    let maintenance = state.maintenance.load();
    Json(ApiSuccess::new(AboutDto {
        version: env!("CARGO_PKG_VERSION"),
        did: state.node.did,
        started_at: state.started_at,
        maintenance: MaintenanceDto::from(maintenance.as_ref()),
    }))
}

/// `POST /v1/system/log-level` - adjust the runtime filter.
pub async fn set_log_level(
    State(state): State<AppState>,
    Json(body): Json<LogLevelRequest>,
) -> Result<impl IntoResponse, Error> {
    state
        .log_control
        .set(&body.level)
        .map_err(Error::data_validation)?;
    tracing::info!(level = %body.level, "log level changed");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/system/maintenance/start`
pub async fn maintenance_start(State(state): State<AppState>) -> StatusCode {
    state.maintenance.store(Arc::new(Maintenance {
        active: true,
        since: Some(Utc::now()),
    }));
    tracing::warn!("maintenance mode started");
    StatusCode::NO_CONTENT
}

/// `POST /v1/system/maintenance/stop`
pub async fn maintenance_stop(State(state): State<AppState>) -> StatusCode {
    state.maintenance.store(Arc::new(Maintenance::default()));
    tracing::info!("maintenance mode stopped");
    StatusCode::NO_CONTENT
}

/// `POST /v1/system/revoke` - journal a root-token revocation.
pub async fn revoke_token(
    State(state): State<AppState>,
    Json(body): Json<RevokeTokenRequest>,
) -> Result<impl IntoResponse, Error> {
    if body.token_id.is_empty() {
        return Err(Error::data_validation("token_id cannot be empty"));
    }
    state.service.revoke_token(&body.token_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
