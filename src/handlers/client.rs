use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::Result,
    handlers::auth::CurrentUser,
    models::{client::ClientInput, user::Action},
    state::AppState,
};

pub async fn list_clients(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageClients)?;
    Ok(Json(state.clients.list().await?))
}

pub async fn get_client(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageClients)?;
    Ok(Json(state.clients.get(id).await?))
}

pub async fn create_client(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<ClientInput>,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageClients)?;
    input.validate()?;

    let client = state.clients.create(&input).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<ClientInput>,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageClients)?;
    input.validate()?;

    Ok(Json(state.clients.update(id, &input).await?))
}

pub async fn delete_client(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    current.require(Action::DeleteRecords)?;

    state.clients.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
