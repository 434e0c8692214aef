use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportPeriod {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinancialReport {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub generated_at: DateTime<Utc>,
    pub currencies: Vec<CurrencyReport>,
}

/// Figures for one currency; amounts in different currencies are never added up
#[derive(Debug, Clone, Serialize)]
pub struct CurrencyReport {
    pub currency: String,
    pub quotations: QuotationSummary,
    pub invoices: InvoiceSummary,
    pub salespeople: Vec<SalespersonSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuotationSummary {
    pub count: u64,
    pub pending: u64,
    pub won: u64,
    pub lost: u64,
    pub win_rate: Decimal,
    pub total_buy_rate: Decimal,
    pub total_client_quote: Decimal,
    pub total_profit: Decimal,
    pub profit_percentage: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvoiceSummary {
    pub count: u64,
    pub pending: u64,
    pub paid: u64,
    pub overdue: u64,
    pub subtotal: Decimal,
    pub tva: Decimal,
    pub total: Decimal,
    pub paid_total: Decimal,
    pub outstanding_total: Decimal,
    pub overdue_total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalespersonSummary {
    pub user_id: i64,
    pub name: String,
    pub quotations: u64,
    pub won: u64,
    pub profit: Decimal,
}
