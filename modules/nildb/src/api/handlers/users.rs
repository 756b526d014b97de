use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde_json::Value;
use uuid::Uuid;

use nildb_db::json;

use crate::api::dto::{ApiSuccess, GrantAccessRequest, RevokeAccessRequest, UserDataRefDto};
use crate::api::handlers::as_user;
use crate::domain::error::Error;
use crate::domain::model::Caller;
use crate::state::AppState;

/// `GET /v1/users/me/data` - the caller's data references.
pub async fn list_data(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiSuccess<Vec<UserDataRefDto>>>, Error> {
    let user = as_user(&caller)?;
    Ok(Json(ApiSuccess::new(state.service.list_user_data(user))))
}

/// `GET /v1/users/data/{collection}/{document}` - one owned document.
pub async fn read_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((collection, document)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiSuccess<Value>>, Error> {
    let user = as_user(&caller)?;
    let stored = state
        .service
        .read_user_document(user, collection, document)
        .await?;
    Ok(Json(ApiSuccess::new(Value::Object(
        json::document_to_json_object(&stored),
    ))))
}

/// `DELETE /v1/users/data/{collection}/{document}` - delete an owned
/// document and its back-reference.
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((collection, document)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, Error> {
    let user = as_user(&caller)?;
    state
        .service
        .delete_user_document(user, collection, document)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/users/data/acl/grant` - owner-only grant.
pub async fn grant(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<GrantAccessRequest>,
) -> Result<impl IntoResponse, Error> {
    let user = as_user(&caller)?;
    state
        .service
        .grant_access(user, body.collection, body.document, body.acl)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/users/data/acl/revoke` - owner-only revoke.
pub async fn revoke(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<RevokeAccessRequest>,
) -> Result<impl IntoResponse, Error> {
    let user = as_user(&caller)?;
    state
        .service
        .revoke_access(user, body.collection, body.document, body.grantee)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
