use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use chrono::{Duration, Utc};
use validator::Validate;

use crate::{
    error::{AppError, Result},
    handlers::auth::CurrentUser,
    models::{
        invoice::{Invoice, InvoiceFilter, InvoiceInput, NewInvoice, UpdateInvoiceStatus},
        user::Action,
    },
    services::export_service::printable_invoice,
    state::AppState,
};

async fn visible_invoice(state: &AppState, current: &CurrentUser, id: i64) -> Result<Invoice> {
    current.require(Action::ViewInvoices)?;

    let invoice = state.invoices.get(id).await?;
    if !invoice.visible_to(current.0.id, current.0.role) {
        return Err(AppError::Forbidden("invoice belongs to another salesperson".to_string()));
    }
    Ok(invoice)
}

async fn publish(state: &AppState, invoice: &Invoice) {
    if let Err(e) = state.connection_manager.broadcast_invoice_update(invoice).await {
        tracing::warn!("Failed to broadcast invoice {}: {}", invoice.id, e);
    }
}

pub async fn list_invoices(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(filter): Query<InvoiceFilter>,
) -> Result<impl IntoResponse> {
    current.require(Action::ViewInvoices)?;

    let salesperson = (!current.0.role.can(Action::ViewAllInvoices)).then_some(current.0.id);
    Ok(Json(state.invoices.list(&filter, salesperson).await?))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(visible_invoice(&state, &current, id).await?))
}

/// Invoice not backed by a quotation
pub async fn create_invoice(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<InvoiceInput>,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageInvoices)?;
    input.validate()?;

    let client = match input.client_id {
        Some(id) => Some(state.clients.get(id).await?),
        None => None,
    };
    let client_name = input
        .client_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| client.as_ref().map(|c| c.name.clone()))
        .ok_or_else(|| AppError::Validation("client_id or client_name is required".to_string()))?;

    let salesperson = match input.salesperson_id {
        Some(id) => state.users.get_user_by_id(id).await?,
        None => current.0.clone(),
    };

    let issue_date = input.issue_date.unwrap_or_else(|| Utc::now().date_naive());
    let due_date = input
        .due_date
        .unwrap_or(issue_date + Duration::days(state.config.invoice_due_days));
    if due_date < issue_date {
        return Err(AppError::Validation("due_date is before issue_date".to_string()));
    }

    let new = NewInvoice {
        quotation_id: None,
        client_id: input.client_id,
        client_name,
        client_address: input
            .client_address
            .or_else(|| client.as_ref().and_then(|c| c.address.clone())),
        client_contact: input
            .client_contact
            .or_else(|| client.as_ref().and_then(|c| c.contact_person.clone())),
        client_tin: input
            .client_tin
            .or_else(|| client.as_ref().and_then(|c| c.tin.clone())),
        salesperson_id: salesperson.id,
        salesperson_name: salesperson.name,
        currency: input
            .currency
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| state.config.default_currency.clone()),
        items: input.items,
        issue_date,
        due_date,
        validity_date: input.validity_date,
        remarks: input.remarks,
    };

    let invoice = state.invoices.create(&new, state.config.vat_rate).await?;
    publish(&state, &invoice).await;

    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn update_invoice_status(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateInvoiceStatus>,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageInvoices)?;

    let invoice = state.invoices.update_status(id, request.status).await?;
    publish(&state, &invoice).await;
    Ok(Json(invoice))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    current.require(Action::DeleteRecords)?;

    state.invoices.delete(id).await?;
    tracing::info!("{} deleted invoice {}", current.0.email, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn printable(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let invoice = visible_invoice(&state, &current, id).await?;
    Ok(Html(printable_invoice(&invoice, state.config.vat_rate)?))
}
