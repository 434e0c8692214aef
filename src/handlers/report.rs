use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};

use crate::{
    error::{AppError, Result},
    handlers::auth::CurrentUser,
    models::{report::ReportPeriod, user::Action},
    services::export_service::{invoices_csv, quotations_csv},
    state::AppState,
};

fn check_period(period: &ReportPeriod) -> Result<()> {
    match (period.from, period.to) {
        (Some(from), Some(to)) if to < from => {
            Err(AppError::BadRequest("`to` is before `from`".to_string()))
        }
        _ => Ok(()),
    }
}

fn csv_response(file_name: &str, body: String) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
}

pub async fn financial_report(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(period): Query<ReportPeriod>,
) -> Result<impl IntoResponse> {
    current.require(Action::ViewReports)?;
    check_period(&period)?;

    Ok(Json(state.reports.financial(&period).await?))
}

pub async fn export_quotations(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(period): Query<ReportPeriod>,
) -> Result<impl IntoResponse> {
    current.require(Action::ViewReports)?;
    check_period(&period)?;

    let quotations = state.reports.quotations_in(&period).await?;
    Ok(csv_response("quotations.csv", quotations_csv(&quotations)))
}

pub async fn export_invoices(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(period): Query<ReportPeriod>,
) -> Result<impl IntoResponse> {
    current.require(Action::ViewReports)?;
    check_period(&period)?;

    let invoices = state.reports.invoices_in(&period).await?;
    Ok(csv_response("invoices.csv", invoices_csv(&invoices)))
}
