use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    db::{InvoiceStore, QuotationStore},
    error::{AppError, Result},
    models::{
        invoice::{Invoice, InvoiceFilter, InvoiceStatus},
        quotation::{Quotation, QuotationFilter, QuotationStatus},
        report::{
            CurrencyReport, FinancialReport, InvoiceSummary, QuotationSummary, ReportPeriod,
            SalespersonSummary,
        },
    },
    pricing::{checked_sum, percentage, totals_from_sums},
};

/// Aggregate quotations and invoices per currency.
///
/// Inputs are expected to be already restricted to the period.
pub fn build_report(
    period: &ReportPeriod,
    quotations: &[Quotation],
    invoices: &[Invoice],
    generated_at: DateTime<Utc>,
) -> Result<FinancialReport> {
    let mut by_currency: BTreeMap<&str, (Vec<&Quotation>, Vec<&Invoice>)> = BTreeMap::new();
    for quotation in quotations {
        by_currency.entry(quotation.currency.as_str()).or_default().0.push(quotation);
    }
    for invoice in invoices {
        by_currency.entry(invoice.currency.as_str()).or_default().1.push(invoice);
    }

    let currencies = by_currency
        .into_iter()
        .map(|(currency, (quotations, invoices))| {
            Ok(CurrencyReport {
                currency: currency.to_string(),
                quotations: summarize_quotations(&quotations)?,
                invoices: summarize_invoices(&invoices)?,
                salespeople: summarize_salespeople(&quotations)?,
            })
        })
        .collect::<Result<Vec<_>>>()
        .map_err(|_| {
            AppError::BadRequest("report totals are too large, narrow the period".to_string())
        })?;

    Ok(FinancialReport {
        from: period.from,
        to: period.to,
        generated_at,
        currencies,
    })
}

fn summarize_quotations(quotations: &[&Quotation]) -> Result<QuotationSummary> {
    let mut summary = QuotationSummary::default();
    let mut buy = Decimal::ZERO;
    let mut quote = Decimal::ZERO;

    for quotation in quotations {
        summary.count += 1;
        match quotation.status {
            QuotationStatus::Pending => summary.pending += 1,
            QuotationStatus::Won => summary.won += 1,
            QuotationStatus::Lost => summary.lost += 1,
        }
        buy = checked_sum([buy, quotation.buy_rate])?;
        quote = checked_sum([quote, quotation.client_quote])?;
    }

    let totals = totals_from_sums(buy, quote)?;
    summary.total_buy_rate = totals.buy_rate;
    summary.total_client_quote = totals.client_quote;
    summary.total_profit = totals.profit;
    summary.profit_percentage = totals.profit_percentage;
    summary.win_rate = percentage(
        Decimal::from(summary.won),
        Decimal::from(summary.won + summary.lost),
    )?;
    Ok(summary)
}

fn summarize_invoices(invoices: &[&Invoice]) -> Result<InvoiceSummary> {
    let mut summary = InvoiceSummary::default();

    for invoice in invoices {
        summary.count += 1;
        summary.subtotal = checked_sum([summary.subtotal, invoice.subtotal])?;
        summary.tva = checked_sum([summary.tva, invoice.tva])?;
        summary.total = checked_sum([summary.total, invoice.total])?;

        match invoice.effective_status {
            InvoiceStatus::Paid => {
                summary.paid += 1;
                summary.paid_total = checked_sum([summary.paid_total, invoice.total])?;
            }
            InvoiceStatus::Pending => {
                summary.pending += 1;
                summary.outstanding_total =
                    checked_sum([summary.outstanding_total, invoice.total])?;
            }
            InvoiceStatus::Overdue => {
                summary.overdue += 1;
                summary.outstanding_total =
                    checked_sum([summary.outstanding_total, invoice.total])?;
                summary.overdue_total = checked_sum([summary.overdue_total, invoice.total])?;
            }
        }
    }

    Ok(summary)
}

/// Ordered by profit, highest first
fn summarize_salespeople(quotations: &[&Quotation]) -> Result<Vec<SalespersonSummary>> {
    let mut by_user: BTreeMap<i64, SalespersonSummary> = BTreeMap::new();

    for quotation in quotations {
        let entry = by_user
            .entry(quotation.quote_sent_by)
            .or_insert_with(|| SalespersonSummary {
                user_id: quotation.quote_sent_by,
                name: quotation.quote_sent_by_name.clone(),
                ..Default::default()
            });
        entry.quotations += 1;
        if quotation.status == QuotationStatus::Won {
            entry.won += 1;
            entry.profit = checked_sum([entry.profit, quotation.profit])?;
        }
    }

    let mut salespeople: Vec<_> = by_user.into_values().collect();
    salespeople.sort_by(|a, b| b.profit.cmp(&a.profit).then_with(|| a.name.cmp(&b.name)));
    Ok(salespeople)
}

/// Loads the period's records and builds the report
#[derive(Clone)]
pub struct ReportService {
    quotations: QuotationStore,
    invoices: InvoiceStore,
}

impl ReportService {
    pub fn new(quotations: QuotationStore, invoices: InvoiceStore) -> Self {
        Self {
            quotations,
            invoices,
        }
    }

    pub async fn quotations_in(&self, period: &ReportPeriod) -> Result<Vec<Quotation>> {
        self.quotations
            .list(
                &QuotationFilter {
                    from: period.from,
                    to: period.to,
                    ..Default::default()
                },
                None,
            )
            .await
    }

    pub async fn invoices_in(&self, period: &ReportPeriod) -> Result<Vec<Invoice>> {
        self.invoices
            .list(
                &InvoiceFilter {
                    from: period.from,
                    to: period.to,
                    ..Default::default()
                },
                None,
            )
            .await
    }

    pub async fn financial(&self, period: &ReportPeriod) -> Result<FinancialReport> {
        let quotations = self.quotations_in(period).await?;
        let invoices = self.invoices_in(period).await?;

        tracing::debug!(
            "Building report over {} quotation(s) and {} invoice(s)",
            quotations.len(),
            invoices.len()
        );
        build_report(period, &quotations, &invoices, Utc::now())
    }
}
