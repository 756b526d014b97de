use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use crate::api::auth::AuthContext;
use crate::api::dto::{ApiSuccess, BuilderDto, RegisterBuilderRequest, UpdateBuilderRequest};
use crate::api::handlers::as_builder;
use crate::domain::error::Error;
use crate::domain::model::Caller;
use crate::state::AppState;

/// `POST /v1/builders/register` - self-signed registration.
pub async fn register(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<RegisterBuilderRequest>,
) -> Result<impl IntoResponse, Error> {
    if body.did != ctx.subject {
        return Err(Error::data_validation(
            "registration DID must match the token subject",
        ));
    }
    state.service.register_builder(body.did, body.name).await?;
    Ok(StatusCode::CREATED)
}

/// `GET /v1/builders/me` - the caller's own record.
pub async fn me(
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiSuccess<BuilderDto>>, Error> {
    let builder = as_builder(&caller)?;
    Ok(Json(ApiSuccess::new(BuilderDto::from(builder.clone()))))
}

/// `POST /v1/builders/me` - update the profile name.
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<UpdateBuilderRequest>,
) -> Result<impl IntoResponse, Error> {
    let builder = as_builder(&caller)?;
    state.service.update_builder_name(builder, body.name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /v1/builders/me` - delete the builder and cascade.
pub async fn delete(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, Error> {
    let builder = as_builder(&caller)?;
    state.service.delete_builder(builder).await?;
    Ok(StatusCode::NO_CONTENT)
}
