use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::Result,
    handlers::auth::CurrentUser,
    models::notification::NotificationFilter,
    state::AppState,
};

pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<NotificationFilter>,
) -> Result<impl IntoResponse> {
    let notifications = state
        .notifications
        .list_for(user.id, user.role, filter.unread_only)
        .await?;
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.notifications.mark_read(id, user.id, user.role).await?))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse> {
    let updated = state.notifications.mark_all_read(user.id, user.role).await?;
    Ok(Json(json!({ "updated": updated })))
}
