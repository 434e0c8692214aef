//! Derived money fields for quotations and invoices.
//!
//! Nothing here rounds: stored values keep full precision and only exports
//! format them for display.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    error::{AppError, Result},
    models::{invoice::InvoiceItemInput, quotation::CommodityInput},
};

/// 18% TVA.
pub const DEFAULT_VAT_RATE: Decimal = Decimal::from_parts(18, 0, 0, false, 2);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotationTotals {
    pub buy_rate: Decimal,
    pub client_quote: Decimal,
    pub profit: Decimal,
    pub profit_percentage: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tva: Decimal,
    pub total: Decimal,
}

fn overflow() -> AppError {
    AppError::Validation("amounts are too large to total".to_string())
}

fn add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b).ok_or_else(overflow)
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b).ok_or_else(overflow)
}

/// Sum that fails instead of overflowing.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal> {
    values.into_iter().try_fold(Decimal::ZERO, add)
}

/// `part / whole * 100`, defined as zero for an empty whole.
pub fn percentage(part: Decimal, whole: Decimal) -> Result<Decimal> {
    if whole.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let ratio = part.checked_div(whole).ok_or_else(overflow)?;
    mul(ratio, HUNDRED)
}

pub fn quotation_totals(commodities: &[CommodityInput]) -> Result<QuotationTotals> {
    let mut buy_rate = Decimal::ZERO;
    let mut client_quote = Decimal::ZERO;
    for commodity in commodities {
        buy_rate = add(buy_rate, mul(commodity.quantity_kg, commodity.buy_rate)?)?;
        client_quote = add(client_quote, mul(commodity.quantity_kg, commodity.client_rate)?)?;
    }

    totals_from_sums(buy_rate, client_quote)
}

/// Profit figures for already summed buy and quote amounts.
pub fn totals_from_sums(buy_rate: Decimal, client_quote: Decimal) -> Result<QuotationTotals> {
    let profit = client_quote.checked_sub(buy_rate).ok_or_else(overflow)?;

    Ok(QuotationTotals {
        buy_rate,
        client_quote,
        profit,
        profit_percentage: percentage(profit, buy_rate)?,
    })
}

/// Quantity times the sum of the charge rates.
pub fn line_amount(quantity: Decimal, rates: impl IntoIterator<Item = Decimal>) -> Result<Decimal> {
    mul(quantity, checked_sum(rates)?)
}

pub fn item_amount(item: &InvoiceItemInput) -> Result<Decimal> {
    line_amount(item.quantity, item.charges.iter().map(|charge| charge.rate))
}

pub fn invoice_totals(items: &[InvoiceItemInput], vat_rate: Decimal) -> Result<InvoiceTotals> {
    let mut subtotal = Decimal::ZERO;
    for item in items {
        subtotal = add(subtotal, item_amount(item)?)?;
    }
    let tva = mul(subtotal, vat_rate)?;

    Ok(InvoiceTotals {
        subtotal,
        tva,
        total: add(subtotal, tva)?,
    })
}

/// Two decimal places, as shown on exports and printed invoices.
pub fn format_money(value: Decimal) -> String {
    format!(
        "{:.2}",
        value.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
    )
}
