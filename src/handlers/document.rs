use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};

use crate::{
    error::{AppError, Result},
    handlers::auth::CurrentUser,
    models::{
        document::{Document, DocumentFilter, DocumentScope, UploadParams},
        user::Action,
    },
    state::AppState,
};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Documents inherit the visibility of the quotation and invoice they are attached to
async fn check_links(
    state: &AppState,
    current: &CurrentUser,
    quotation_id: Option<i64>,
    invoice_id: Option<i64>,
) -> Result<()> {
    let user = &current.0;
    if let Some(id) = quotation_id {
        if !state.quotations.get(id).await?.visible_to(user.id, user.role) {
            return Err(AppError::Forbidden("document belongs to another salesperson's quotation".to_string()));
        }
    }
    if let Some(id) = invoice_id {
        if !state.invoices.get(id).await?.visible_to(user.id, user.role) {
            return Err(AppError::Forbidden("document belongs to an invoice you cannot view".to_string()));
        }
    }
    Ok(())
}

async fn visible_document(state: &AppState, current: &CurrentUser, id: i64) -> Result<Document> {
    let document = state.documents.get(id).await?;
    check_links(state, current, document.quotation_id, document.invoice_id).await?;
    Ok(document)
}

pub async fn list_documents(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(filter): Query<DocumentFilter>,
) -> Result<impl IntoResponse> {
    let scope = DocumentScope::for_viewer(current.0.id, current.0.role);
    Ok(Json(state.documents.list(&filter, scope).await?))
}

pub async fn get_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(visible_document(&state, &current, id).await?))
}

/// The request body is the file itself
pub async fn upload_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let file_name = params.file_name.trim();
    if file_name.is_empty() {
        return Err(AppError::Validation("file_name must not be empty".to_string()));
    }
    if body.is_empty() {
        return Err(AppError::BadRequest("document body is empty".to_string()));
    }
    if body.len() > state.config.max_document_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "documents are limited to {} bytes",
            state.config.max_document_bytes
        )));
    }
    check_links(&state, &current, params.quotation_id, params.invoice_id).await?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE);

    let document = state
        .documents
        .create(
            file_name,
            content_type,
            params.quotation_id,
            params.invoice_id,
            &body,
            &current.0,
        )
        .await?;

    tracing::info!(
        "{} uploaded {} ({} bytes)",
        current.0.email,
        document.file_name,
        document.size_bytes
    );
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn download_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    visible_document(&state, &current, id).await?;
    let (document, content) = state.documents.content(id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        document.file_name.replace(['"', '\\', '\r', '\n'], "_")
    );

    Ok((
        [
            (header::CONTENT_TYPE, document.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    ))
}

pub async fn delete_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let document = visible_document(&state, &current, id).await?;
    if document.uploaded_by != current.0.id && !current.0.role.can(Action::DeleteRecords) {
        return Err(AppError::Forbidden("only the uploader or an admin can delete".to_string()));
    }

    state.documents.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
