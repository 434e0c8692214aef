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
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FreightMode {
    Air,
    Sea,
    Road,
    Rail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RequestType {
    Import,
    Export,
    Transit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum QuotationStatus {
    Pending,
    Won,
    Lost,
}

impl QuotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotationStatus::Pending => "pending",
            QuotationStatus::Won => "won",
            QuotationStatus::Lost => "lost",
        }
    }

    /// Only pending quotations can be decided, and won/lost are final.
    pub fn transition_to(self, next: QuotationStatus) -> Result<QuotationStatus> {
        match (self, next) {
            (QuotationStatus::Pending, QuotationStatus::Won | QuotationStatus::Lost) => Ok(next),
            _ => Err(AppError::Conflict(format!(
                "quotation cannot move from {} to {}",
                self.as_str(),
                next.as_str()
            ))),
        }
    }
}

/// Cargo line of a quotation, rates are per kg in the quotation currency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commodity {
    pub id: i64,
    pub quotation_id: i64,
    pub name: String,
    pub quantity_kg: Decimal,
    pub buy_rate: Decimal,
    pub client_rate: Decimal,
    pub position: i64,
}

impl<'r> FromRow<'r, SqliteRow> for Commodity {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            quotation_id: row.try_get("quotation_id")?,
            name: row.try_get("name")?,
            quantity_kg: decimal_column(row, "quantity_kg")?,
            buy_rate: decimal_column(row, "buy_rate")?,
            client_rate: decimal_column(row, "client_rate")?,
            position: row.try_get("position")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quotation {
    pub id: i64,
    pub reference: String,
    pub client_id: Option<i64>,
    pub client_name: String,
    pub freight_mode: FreightMode,
    pub request_type: RequestType,
    pub origin: String,
    pub destination: String,
    pub currency: String,
    pub buy_rate: Decimal,
    pub client_quote: Decimal,
    pub profit: Decimal,
    pub profit_percentage: Decimal,
    pub status: QuotationStatus,
    pub quote_sent_by: i64,
    pub quote_sent_by_name: String,
    pub approved_by: Option<i64>,
    pub approved_by_name: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub commodities: Vec<Commodity>,
}

impl Quotation {
    /// Agents and partners only see the quotations they sent
    pub fn visible_to(&self, user_id: i64, role: Role) -> bool {
        role.can(Action::ViewAllQuotations) || self.quote_sent_by == user_id
    }

    pub fn editable_by(&self, user_id: i64, role: Role) -> bool {
        role.can(Action::EditAnyQuotation) || self.quote_sent_by == user_id
    }
}

impl<'r> FromRow<'r, SqliteRow> for Quotation {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            reference: row.try_get("reference")?,
            client_id: row.try_get("client_id")?,
            client_name: row.try_get("client_name")?,
            freight_mode: row.try_get("freight_mode")?,
            request_type: row.try_get("request_type")?,
            origin: row.try_get("origin")?,
            destination: row.try_get("destination")?,
            currency: row.try_get("currency")?,
            buy_rate: decimal_column(row, "buy_rate")?,
            client_quote: decimal_column(row, "client_quote")?,
            profit: decimal_column(row, "profit")?,
            profit_percentage: decimal_column(row, "profit_percentage")?,
            status: row.try_get("status")?,
            quote_sent_by: row.try_get("quote_sent_by")?,
            quote_sent_by_name: row.try_get("quote_sent_by_name")?,
            approved_by: row.try_get("approved_by")?,
            approved_by_name: row.try_get("approved_by_name")?,
            approved_at: row.try_get("approved_at")?,
            rejection_reason: row.try_get("rejection_reason")?,
            follow_up_date: row.try_get("follow_up_date")?,
            remarks: row.try_get("remarks")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            commodities: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CommodityInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(custom(function = "positive_decimal"))]
    pub quantity_kg: Decimal,
    #[validate(custom(function = "non_negative_decimal"))]
    pub buy_rate: Decimal,
    #[validate(custom(function = "non_negative_decimal"))]
    pub client_rate: Decimal,
}

/// Body for creating or editing a quotation
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuotationInput {
    pub client_id: Option<i64>,
    #[validate(length(min = 1, max = 200))]
    pub client_name: Option<String>,
    pub freight_mode: FreightMode,
    pub request_type: RequestType,
    #[validate(length(min = 1, max = 200))]
    pub origin: String,
    #[validate(length(min = 1, max = 200))]
    pub destination: String,
    #[validate(custom(function = "currency_code"))]
    pub currency: Option<String>,
    #[validate(length(min = 1), nested)]
    pub commodities: Vec<CommodityInput>,
    pub follow_up_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectQuotation {
    pub reason: String,
}

impl RejectQuotation {
    pub const MIN_REASON_CHARS: usize = 10;

    pub fn reason(&self) -> Result<&str> {
        let reason = self.reason.trim();
        if reason.chars().count() < Self::MIN_REASON_CHARS {
            return Err(AppError::Validation(format!(
                "rejection reason must be at least {} characters",
                Self::MIN_REASON_CHARS
            )));
        }
        Ok(reason)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotationFilter {
    pub status: Option<QuotationStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub salesperson: Option<i64>,
    pub client_id: Option<i64>,
}
