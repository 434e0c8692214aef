use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, sqlite::SqliteRow};
use validator::Validate;

use crate::{
    db::decimal_column,
    error::{AppError, Result},
    models::{
        currency_code, non_negative_decimal, positive_decimal,
        user::{Action, Role},
    },
    pricing::line_amount,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    /// Status as shown to users: an unpaid invoice past its due date is overdue.
    pub fn effective(self, due_date: NaiveDate, today: NaiveDate) -> InvoiceStatus {
        match self {
            InvoiceStatus::Pending if due_date < today => InvoiceStatus::Overdue,
            status => status,
        }
    }

    pub fn transition_to(self, next: InvoiceStatus) -> Result<InvoiceStatus> {
        match (self, next) {
            (InvoiceStatus::Paid, _) => Err(AppError::Conflict(
                "a paid invoice cannot change status".to_string(),
            )),
            (current, next) if current == next => Err(AppError::Conflict(format!(
                "invoice is already {}",
                current.as_str()
            ))),
            (_, next) => Ok(next),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceCharge {
    pub id: i64,
    pub item_id: i64,
    pub description: String,
    pub rate: Decimal,
}

impl<'r> FromRow<'r, SqliteRow> for InvoiceCharge {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            item_id: row.try_get("item_id")?,
            description: row.try_get("description")?,
            rate: decimal_column(row, "rate")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: i64,
    pub invoice_id: i64,
    pub commodity: String,
    pub quantity: Decimal,
    pub position: i64,
    pub charges: Vec<InvoiceCharge>,
}

impl InvoiceItem {
    pub fn amount(&self) -> Result<Decimal> {
        line_amount(self.quantity, self.charges.iter().map(|charge| charge.rate))
    }
}

impl<'r> FromRow<'r, SqliteRow> for InvoiceItem {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            invoice_id: row.try_get("invoice_id")?,
            commodity: row.try_get("commodity")?,
            quantity: decimal_column(row, "quantity")?,
            position: row.try_get("position")?,
            charges: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub quotation_id: Option<i64>,
    pub client_id: Option<i64>,
    pub client_name: String,
    pub client_address: Option<String>,
    pub client_contact: Option<String>,
    pub client_tin: Option<String>,
    pub salesperson_id: i64,
    pub salesperson_name: String,
    pub currency: String,
    pub subtotal: Decimal,
    pub tva: Decimal,
    pub total: Decimal,
    pub status: InvoiceStatus,
    pub effective_status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub validity_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<InvoiceItem>,
}

impl Invoice {
    pub fn visible_to(&self, user_id: i64, role: Role) -> bool {
        role.can(Action::ViewAllInvoices)
            || (role.can(Action::ViewInvoices) && self.salesperson_id == user_id)
    }

    /// Recompute the render-time status against `today`.
    pub fn refresh_status(&mut self, today: NaiveDate) {
        self.effective_status = self.status.effective(self.due_date, today);
    }
}

impl<'r> FromRow<'r, SqliteRow> for Invoice {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        let status: InvoiceStatus = row.try_get("status")?;
        let due_date: NaiveDate = row.try_get("due_date")?;

        Ok(Self {
            id: row.try_get("id")?,
            invoice_number: row.try_get("invoice_number")?,
            quotation_id: row.try_get("quotation_id")?,
            client_id: row.try_get("client_id")?,
            client_name: row.try_get("client_name")?,
            client_address: row.try_get("client_address")?,
            client_contact: row.try_get("client_contact")?,
            client_tin: row.try_get("client_tin")?,
            salesperson_id: row.try_get("salesperson_id")?,
            salesperson_name: row.try_get("salesperson_name")?,
            currency: row.try_get("currency")?,
            subtotal: decimal_column(row, "subtotal")?,
            tva: decimal_column(row, "tva")?,
            total: decimal_column(row, "total")?,
            status,
            effective_status: status.effective(due_date, Utc::now().date_naive()),
            issue_date: row.try_get("issue_date")?,
            due_date,
            validity_date: row.try_get("validity_date")?,
            remarks: row.try_get("remarks")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            items: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChargeInput {
    #[validate(length(min = 1, max = 200))]
    pub description: String,
    #[validate(custom(function = "non_negative_decimal"))]
    pub rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InvoiceItemInput {
    #[validate(length(min = 1, max = 200))]
    pub commodity: String,
    #[validate(custom(function = "positive_decimal"))]
    pub quantity: Decimal,
    #[validate(length(min = 1), nested)]
    pub charges: Vec<ChargeInput>,
}

/// Body for a standalone invoice
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InvoiceInput {
    pub client_id: Option<i64>,
    #[validate(length(min = 1, max = 200))]
    pub client_name: Option<String>,
    pub client_address: Option<String>,
    pub client_contact: Option<String>,
    pub client_tin: Option<String>,
    pub salesperson_id: Option<i64>,
    #[validate(custom(function = "currency_code"))]
    pub currency: Option<String>,
    #[validate(length(min = 1), nested)]
    pub items: Vec<InvoiceItemInput>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub validity_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

/// Body for converting a won quotation; every field is optional
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ConvertQuotation {
    pub client_address: Option<String>,
    pub client_contact: Option<String>,
    pub client_tin: Option<String>,
    #[validate(length(min = 1), nested)]
    pub items: Option<Vec<InvoiceItemInput>>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub validity_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

/// Fully resolved invoice ready to be written
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub quotation_id: Option<i64>,
    pub client_id: Option<i64>,
    pub client_name: String,
    pub client_address: Option<String>,
    pub client_contact: Option<String>,
    pub client_tin: Option<String>,
    pub salesperson_id: i64,
    pub salesperson_name: String,
    pub currency: String,
    pub items: Vec<InvoiceItemInput>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub validity_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateInvoiceStatus {
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub client_id: Option<i64>,
}
