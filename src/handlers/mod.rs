pub mod auth;
pub mod client;
pub mod document;
pub mod invoice;
pub mod notification;
pub mod quotation;
pub mod report;
pub mod user;
pub mod ws;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    routing::{get, post, put},
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.connection_manager.connection_count().await,
    }))
}

/// All HTTP and WebSocket routes
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_document_bytes;

    let api = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", put(auth::change_password))
        .route("/users", get(user::get_all_users).post(user::create_user))
        .route("/users/bulk", post(user::create_users_bulk))
        .route(
            "/users/{id}",
            get(user::get_user_by_id)
                .put(user::update_user)
                .delete(user::delete_user),
        )
        .route("/clients", get(client::list_clients).post(client::create_client))
        .route(
            "/clients/{id}",
            get(client::get_client)
                .put(client::update_client)
                .delete(client::delete_client),
        )
        .route(
            "/quotations",
            get(quotation::list_quotations).post(quotation::create_quotation),
        )
        .route(
            "/quotations/{id}",
            get(quotation::get_quotation)
                .put(quotation::update_quotation)
                .delete(quotation::delete_quotation),
        )
        .route("/quotations/{id}/approve", post(quotation::approve_quotation))
        .route("/quotations/{id}/reject", post(quotation::reject_quotation))
        .route("/quotations/{id}/invoice", post(quotation::convert_to_invoice))
        .route(
            "/invoices",
            get(invoice::list_invoices).post(invoice::create_invoice),
        )
        .route(
            "/invoices/{id}",
            get(invoice::get_invoice).delete(invoice::delete_invoice),
        )
        .route("/invoices/{id}/status", put(invoice::update_invoice_status))
        .route("/invoices/{id}/printable", get(invoice::printable))
        .route(
            "/documents",
            get(document::list_documents).post(document::upload_document),
        )
        .route(
            "/documents/{id}",
            get(document::get_document).delete(document::delete_document),
        )
        .route("/documents/{id}/content", get(document::download_document))
        .route("/reports/financial", get(report::financial_report))
        .route("/reports/quotations.csv", get(report::export_quotations))
        .route("/reports/invoices.csv", get(report::export_invoices))
        .route("/notifications", get(notification::list_notifications))
        .route("/notifications/read-all", post(notification::mark_all_read))
        .route("/notifications/{id}/read", post(notification::mark_read));

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
