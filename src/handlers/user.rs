use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    error::{AppError, Result},
    handlers::auth::CurrentUser,
    models::user::{Action, CreateUser, CreatedUser, UpdateUser, UserDto, UserStatus},
    state::AppState,
};

/// Get all users handler
pub async fn get_all_users(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageUsers)?;

    let users = state.users.get_all_users().await?;
    let user_dtos: Vec<UserDto> = users.into_iter().map(UserDto::from).collect();
    Ok((StatusCode::OK, Json(user_dtos)))
}

/// Get user by ID handler
pub async fn get_user_by_id(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageUsers)?;

    let user = state.users.get_user_by_id(id).await?;
    Ok((StatusCode::OK, Json(UserDto::from(user))))
}

pub async fn create_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<CreateUser>,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageUsers)?;
    request.validate()?;

    let created = state.users.create_user(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
pub struct BulkCreateUsers {
    pub users: Vec<CreateUser>,
}

/// Create several system users; each gets a generated password unless one is given
pub async fn create_users_bulk(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<BulkCreateUsers>,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageUsers)?;
    if request.users.is_empty() {
        return Err(AppError::BadRequest("no users given".to_string()));
    }
    for user in &request.users {
        user.validate()?;
    }

    let mut created: Vec<CreatedUser> = Vec::with_capacity(request.users.len());
    for user in request.users {
        created.push(state.users.create_user(user).await?);
    }

    tracing::info!("{} created {} users in bulk", current.0.email, created.len());
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUser>,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageUsers)?;
    request.validate()?;
    if id == current.0.id && request.status == Some(UserStatus::Inactive) {
        return Err(AppError::BadRequest("you cannot deactivate yourself".to_string()));
    }
    if id == current.0.id && request.role.is_some_and(|role| role != current.0.role) {
        return Err(AppError::BadRequest("you cannot change your own role".to_string()));
    }

    let user = state.users.update_user(id, request).await?;
    Ok((StatusCode::OK, Json(UserDto::from(user))))
}

/// Delete user handler
pub async fn delete_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageUsers)?;
    if id == current.0.id {
        return Err(AppError::BadRequest("you cannot delete yourself".to_string()));
    }

    state.users.delete_user(id).await?;
    tracing::info!("{} deleted user {}", current.0.email, id);
    Ok(StatusCode::NO_CONTENT)
}
