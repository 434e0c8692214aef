use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use validator::Validate;

use crate::{
    db::quotation_store::ResolvedParty,
    error::{AppError, Result},
    handlers::auth::CurrentUser,
    models::{
        invoice::{ChargeInput, ConvertQuotation, InvoiceItemInput, NewInvoice},
        quotation::{Quotation, QuotationFilter, QuotationInput, QuotationStatus, RejectQuotation},
        user::Action,
    },
    services::notification_service::{quotation_decided, quotation_submitted},
    state::AppState,
};

const FREIGHT_CHARGE: &str = "Freight charge";

async fn resolve_party(state: &AppState, input: &QuotationInput) -> Result<ResolvedParty> {
    let directory_name = match input.client_id {
        Some(id) => Some(state.clients.get(id).await?.name),
        None => None,
    };

    let client_name = input
        .client_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or(directory_name)
        .ok_or_else(|| AppError::Validation("client_id or client_name is required".to_string()))?;

    let currency = input
        .currency
        .as_deref()
        .map(str::to_uppercase)
        .unwrap_or_else(|| state.config.default_currency.clone());

    Ok(ResolvedParty {
        client_id: input.client_id,
        client_name,
        currency,
    })
}

async fn visible_quotation(state: &AppState, current: &CurrentUser, id: i64) -> Result<Quotation> {
    let quotation = state.quotations.get(id).await?;
    if !quotation.visible_to(current.0.id, current.0.role) {
        return Err(AppError::Forbidden("quotation belongs to another salesperson".to_string()));
    }
    Ok(quotation)
}

async fn publish(state: &AppState, quotation: &Quotation) {
    if let Err(e) = state.connection_manager.broadcast_quotation_update(quotation).await {
        tracing::warn!("Failed to broadcast quotation {}: {}", quotation.id, e);
    }
}

pub async fn list_quotations(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(filter): Query<QuotationFilter>,
) -> Result<impl IntoResponse> {
    let owner = (!current.0.role.can(Action::ViewAllQuotations)).then_some(current.0.id);
    Ok(Json(state.quotations.list(&filter, owner).await?))
}

pub async fn get_quotation(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(visible_quotation(&state, &current, id).await?))
}

pub async fn create_quotation(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<QuotationInput>,
) -> Result<impl IntoResponse> {
    current.require(Action::CreateQuotation)?;
    input.validate()?;

    let party = resolve_party(&state, &input).await?;
    let quotation = state.quotations.create(&input, &party, &current.0).await?;

    publish(&state, &quotation).await;
    state.notifier.notify_quietly(quotation_submitted(&quotation)).await;

    Ok((StatusCode::CREATED, Json(quotation)))
}

pub async fn update_quotation(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<QuotationInput>,
) -> Result<impl IntoResponse> {
    input.validate()?;

    let existing = state.quotations.get(id).await?;
    if !existing.editable_by(current.0.id, current.0.role) {
        return Err(AppError::Forbidden("only the author or a director can edit".to_string()));
    }

    let party = resolve_party(&state, &input).await?;
    let quotation = state.quotations.update(id, &input, &party).await?;

    publish(&state, &quotation).await;
    Ok(Json(quotation))
}

pub async fn delete_quotation(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    current.require(Action::DeleteRecords)?;

    let existing = state.quotations.get(id).await?;
    state.quotations.delete(id).await?;

    if let Err(e) = state
        .connection_manager
        .broadcast_quotation_deletion(id, existing.quote_sent_by)
        .await
    {
        tracing::warn!("Failed to broadcast deletion of quotation {}: {}", id, e);
    }
    tracing::info!("{} deleted quotation {}", current.0.email, existing.reference);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn approve_quotation(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    current.require(Action::DecideQuotation)?;

    let quotation = state
        .quotations
        .decide(id, QuotationStatus::Won, &current.0, None)
        .await?;

    publish(&state, &quotation).await;
    state.notifier.notify_quietly(quotation_decided(&quotation)).await;
    Ok(Json(quotation))
}

pub async fn reject_quotation(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<RejectQuotation>,
) -> Result<impl IntoResponse> {
    current.require(Action::DecideQuotation)?;
    let reason = request.reason()?;

    let quotation = state
        .quotations
        .decide(id, QuotationStatus::Lost, &current.0, Some(reason))
        .await?;

    publish(&state, &quotation).await;
    state.notifier.notify_quietly(quotation_decided(&quotation)).await;
    Ok(Json(quotation))
}

/// One item per commodity, charged at the client rate
fn items_from_commodities(quotation: &Quotation) -> Vec<InvoiceItemInput> {
    quotation
        .commodities
        .iter()
        .map(|commodity| InvoiceItemInput {
            commodity: commodity.name.clone(),
            quantity: commodity.quantity_kg,
            charges: vec![ChargeInput {
                description: FREIGHT_CHARGE.to_string(),
                rate: commodity.client_rate,
            }],
        })
        .collect()
}

/// Turn a won quotation into its invoice
pub async fn convert_to_invoice(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    body: Option<Json<ConvertQuotation>>,
) -> Result<impl IntoResponse> {
    current.require(Action::ManageInvoices)?;
    let request = body.map(|Json(request)| request).unwrap_or_default();
    request.validate()?;

    let quotation = state.quotations.get(id).await?;
    if quotation.status != QuotationStatus::Won {
        return Err(AppError::Conflict(format!(
            "quotation {} is {}, only won quotations can be invoiced",
            quotation.reference,
            quotation.status.as_str()
        )));
    }
    if let Some(existing) = state.invoices.find_by_quotation(id).await? {
        return Err(AppError::Conflict(format!(
            "quotation {} is already invoiced as {}",
            quotation.reference, existing.invoice_number
        )));
    }

    let client = match quotation.client_id {
        Some(client_id) => match state.clients.get(client_id).await {
            Ok(client) => Some(client),
            Err(AppError::NotFound(_)) => None,
            Err(e) => return Err(e),
        },
        None => None,
    };

    let issue_date = request.issue_date.unwrap_or_else(|| Utc::now().date_naive());
    let due_date = request
        .due_date
        .unwrap_or(issue_date + Duration::days(state.config.invoice_due_days));
    if due_date < issue_date {
        return Err(AppError::Validation("due_date is before issue_date".to_string()));
    }

    let items = match request.items {
        Some(items) => items,
        None => items_from_commodities(&quotation),
    };

    let new = NewInvoice {
        quotation_id: Some(quotation.id),
        client_id: quotation.client_id,
        client_name: quotation.client_name.clone(),
        client_address: request
            .client_address
            .or_else(|| client.as_ref().and_then(|c| c.address.clone())),
        client_contact: request
            .client_contact
            .or_else(|| client.as_ref().and_then(|c| c.contact_person.clone())),
        client_tin: request
            .client_tin
            .or_else(|| client.as_ref().and_then(|c| c.tin.clone())),
        salesperson_id: quotation.quote_sent_by,
        salesperson_name: quotation.quote_sent_by_name.clone(),
        currency: quotation.currency.clone(),
        items,
        issue_date,
        due_date,
        validity_date: request.validity_date,
        remarks: request.remarks.or_else(|| quotation.remarks.clone()),
    };

    let invoice = state.invoices.create(&new, state.config.vat_rate).await?;
    if let Err(e) = state.connection_manager.broadcast_invoice_update(&invoice).await {
        tracing::warn!("Failed to broadcast invoice {}: {}", invoice.id, e);
    }

    tracing::info!(
        "{} converted {} into {}",
        current.0.email,
        quotation.reference,
        invoice.invoice_number
    );
    Ok((StatusCode::CREATED, Json(invoice)))
}
