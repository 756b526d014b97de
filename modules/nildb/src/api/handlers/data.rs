use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde_json::json;
use uuid::Uuid;

use crate::api::dto::{
    documents_to_values, ApiSuccess, CreateOwnedDataRequest, CreateStandardDataRequest,
    DeleteDataRequest, FindDataRequest, Pagination, TailQuery, UpdateDataRequest,
};
use crate::api::handlers::as_builder;
use crate::domain::error::Error;
use crate::domain::model::Caller;
use crate::domain::service::CreateOwnedRequest;
use crate::state::AppState;

/// `POST /v1/data/standard` - ingest builder-owned documents.
pub async fn create_standard(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CreateStandardDataRequest>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, Error> {
    let builder = as_builder(&caller)?;
    let created = state
        .service
        .create_standard_data(builder, body.collection, body.data)
        .await?;
    Ok(Json(ApiSuccess::new(json!({ "created": created }))))
}

/// `POST /v1/data/owned` - ingest user-owned documents.
pub async fn create_owned(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CreateOwnedDataRequest>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, Error> {
    let builder = as_builder(&caller)?;
    let created = state
        .service
        .create_owned_data(
            builder,
            CreateOwnedRequest {
                collection: body.collection,
                owner: body.owner,
                data: body.data,
                acl: body.acl,
            },
        )
        .await?;
    Ok(Json(ApiSuccess::new(json!({ "created": created }))))
}

/// `POST /v1/data/find` - access-controlled filter + paginate.
pub async fn find(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<FindDataRequest>,
) -> Result<Json<ApiSuccess<Vec<serde_json::Value>>>, Error> {
    let page_request = body.pagination.unwrap_or(crate::api::dto::PageRequest {
        limit: None,
        offset: None,
    });
    let limit = page_request
        .limit
        .unwrap_or(state.service.config.default_page_size)
        .clamp(1, state.service.config.max_page_size);
    let offset = page_request.offset.unwrap_or(0);

    let page = state
        .service
        .find_data(
            caller.did(),
            body.collection,
            body.filter,
            Some(limit),
            Some(offset),
        )
        .await?;
    Ok(Json(ApiSuccess::paginated(
        documents_to_values(&page.documents),
        Pagination {
            limit,
            offset,
            total: page.total,
        },
    )))
}

/// `POST /v1/data/update` - ACL-aware update with the safe operator subset.
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<UpdateDataRequest>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, Error> {
    let outcome = state
        .service
        .update_data(caller.did(), body.collection, body.filter, body.update)
        .await?;
    Ok(Json(ApiSuccess::new(json!({
        "matched": outcome.matched,
        "modified": outcome.modified,
    }))))
}

/// `POST /v1/data/delete` - targeted delete; empty filters are rejected.
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<DeleteDataRequest>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, Error> {
    let deleted = state
        .service
        .delete_data(caller.did(), body.collection, body.filter)
        .await?;
    Ok(Json(ApiSuccess::new(json!({ "deleted": deleted }))))
}

/// `DELETE /v1/data/{id}/flush` - drop all documents in a collection.
pub async fn flush(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, Error> {
    let builder = as_builder(&caller)?;
    let flushed = state.service.flush_data(builder, id).await?;
    Ok(Json(ApiSuccess::new(json!({ "flushed": flushed }))))
}

/// `GET /v1/data/{id}/tail?limit=` - most recent documents.
pub async fn tail(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Query(query): Query<TailQuery>,
) -> Result<Json<ApiSuccess<Vec<serde_json::Value>>>, Error> {
    let documents = state
        .service
        .tail_data(caller.did(), id, query.limit)
        .await?;
    Ok(Json(ApiSuccess::new(documents_to_values(&documents))))
}
