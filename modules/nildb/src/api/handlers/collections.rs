use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use uuid::Uuid;

use crate::api::dto::{
    ApiSuccess, CollectionDto, CollectionMetadataDto, CreateCollectionRequest,
    CreateIndexRequest,
};
use crate::api::handlers::as_builder;
use crate::domain::error::Error;
use crate::domain::model::Caller;
use crate::state::AppState;

/// `GET /v1/collections` - the caller's collections.
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiSuccess<Vec<CollectionDto>>>, Error> {
    let builder = as_builder(&caller)?;
    let collections = state.service.list_collections(builder).await?;
    Ok(Json(ApiSuccess::new(
        collections.into_iter().map(CollectionDto::from).collect(),
    )))
}

/// `POST /v1/collections` - define a collection.
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CreateCollectionRequest>,
) -> Result<impl IntoResponse, Error> {
    let builder = as_builder(&caller)?;
    state
        .service
        .create_collection(builder, body.id, body.name, body.collection_type, body.schema)
        .await?;
    Ok(StatusCode::CREATED)
}

/// `GET /v1/collections/{id}` - metadata: counts, sizes, write bounds,
/// indexes.
pub async fn metadata(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiSuccess<CollectionMetadataDto>>, Error> {
    let builder = as_builder(&caller)?;
    let meta = state.service.collection_metadata(builder, id).await?;
    Ok(Json(ApiSuccess::new(meta.into())))
}

/// `DELETE /v1/collections/{id}` - cascade delete.
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let builder = as_builder(&caller)?;
    state.service.delete_collection(builder, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/collections/{id}/indexes` - create an index.
pub async fn create_index(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(body): Json<CreateIndexRequest>,
) -> Result<impl IntoResponse, Error> {
    let builder = as_builder(&caller)?;
    state.service.create_index(builder, id, body).await?;
    Ok(StatusCode::CREATED)
}

/// `DELETE /v1/collections/{id}/indexes/{name}` - drop an index.
pub async fn drop_index(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((id, name)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, Error> {
    let builder = as_builder(&caller)?;
    state.service.drop_index(builder, id, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}
