use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use uuid::Uuid;

use crate::api::dto::{ApiSuccess, CreateQueryRequest, QueryDto, RunDto, RunQueryRequest};
use crate::api::handlers::as_builder;
use crate::domain::error::Error;
use crate::domain::model::Caller;
use crate::domain::service::RunRequest;
use crate::state::AppState;

/// `GET /v1/queries` - the caller's query definitions.
pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiSuccess<Vec<QueryDto>>>, Error> {
    let builder = as_builder(&caller)?;
    let queries = state.service.list_queries(builder).await?;
    Ok(Json(ApiSuccess::new(
        queries.into_iter().map(QueryDto::from).collect(),
    )))
}

/// `POST /v1/queries` - create a definition, validated at creation.
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CreateQueryRequest>,
) -> Result<impl IntoResponse, Error> {
    let builder = as_builder(&caller)?;
    state
        .service
        .create_query(
            builder,
            body.id,
            body.name,
            body.collection,
            body.variables,
            body.pipeline,
        )
        .await?;
    Ok(StatusCode::CREATED)
}

/// `GET /v1/queries/{id}` - one definition.
pub async fn get(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiSuccess<QueryDto>>, Error> {
    let builder = as_builder(&caller)?;
    let record = state.service.get_query(builder, id).await?;
    Ok(Json(ApiSuccess::new(record.into())))
}

/// `DELETE /v1/queries/{id}` - remove a definition.
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let builder = as_builder(&caller)?;
    state.service.delete_query(builder, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/queries/run` - execute with variables, sync or background.
pub async fn run(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<RunQueryRequest>,
) -> Result<Json<ApiSuccess<RunDto>>, Error> {
    let run = state
        .service
        .run_query(
            caller.did(),
            RunRequest {
                query: body.id,
                variables: body.variables,
                background: body.background,
            },
        )
        .await?;
    Ok(Json(ApiSuccess::new(run.into())))
}

/// `GET /v1/queries/runs/{id}` - poll a run.
pub async fn get_run(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiSuccess<RunDto>>, Error> {
    let run = state.service.get_run(caller.did(), id).await?;
    Ok(Json(ApiSuccess::new(run.into())))
}
