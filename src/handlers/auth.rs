use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::{AppError, Result},
    models::user::{Action, ChangePassword, LoginRequest, LoginResponse, User, UserDto},
    services::auth_service::verify_password,
    state::AppState,
};

/// The active user behind the request's bearer token
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn require(&self, action: Action) -> Result<()> {
        if self.0.role.can(action) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "role {} may not perform this action",
                self.0.role.as_str()
            )))
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Auth("Expected a bearer token".to_string()))?;

        let claims = state.auth.verify_token(token.trim())?;
        // Deleted accounts leave valid tokens behind
        let user = state
            .users
            .get_user_by_id(claims.sub)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::Auth("Account no longer exists".to_string()),
                other => other,
            })?;

        if !user.is_active() {
            return Err(AppError::Auth("Account is inactive".to_string()));
        }
        Ok(CurrentUser(user))
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let user = state.users.authenticate(&request.email, &request.password).await?;
    let (token, expires_at) = state.auth.issue_token(&user)?;

    tracing::info!("User {} logged in", user.email);
    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            token,
            expires_at,
            user: UserDto::from(user),
        }),
    ))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserDto> {
    Json(UserDto::from(user))
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<ChangePassword>,
) -> Result<impl IntoResponse> {
    request.validate()?;
    if !verify_password(&request.current_password, &user.password_hash) {
        return Err(AppError::Auth("Current password is incorrect".to_string()));
    }

    state.users.set_password(user.id, &request.new_password).await?;
    tracing::info!("User {} changed their password", user.email);
    Ok(StatusCode::NO_CONTENT)
}
