use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::user::{Action, Role};

/// Metadata of an uploaded document, the blob itself is loaded on demand
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub quotation_id: Option<i64>,
    pub invoice_id: Option<i64>,
    pub uploaded_by: i64,
    pub uploaded_by_name: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadParams {
    pub file_name: String,
    pub quotation_id: Option<i64>,
    pub invoice_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentFilter {
    pub quotation_id: Option<i64>,
    pub invoice_id: Option<i64>,
}

/// Invoices whose documents a viewer may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceAccess {
    All,
    Salesperson(i64),
    Nothing,
}

/// Row restriction for document listings, mirroring quotation and invoice visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentScope {
    /// Only documents of quotations sent by this user
    pub quotation_owner: Option<i64>,
    pub invoices: InvoiceAccess,
}

impl DocumentScope {
    pub fn for_viewer(user_id: i64, role: Role) -> Self {
        let quotation_owner = (!role.can(Action::ViewAllQuotations)).then_some(user_id);
        let invoices = if role.can(Action::ViewAllInvoices) {
            InvoiceAccess::All
        } else if role.can(Action::ViewInvoices) {
            InvoiceAccess::Salesperson(user_id)
        } else {
            InvoiceAccess::Nothing
        };

        Self {
            quotation_owner,
            invoices,
        }
    }
}
