use askama::Template;
use rust_decimal::Decimal;

use crate::{
    error::Result,
    models::{invoice::Invoice, quotation::Quotation},
    pricing::format_money,
};

const QUOTATION_HEADERS: &[&str] = &[
    "reference",
    "created_at",
    "client",
    "freight_mode",
    "request_type",
    "origin",
    "destination",
    "currency",
    "buy_rate",
    "client_quote",
    "profit",
    "profit_percentage",
    "status",
    "sent_by",
    "approved_by",
    "rejection_reason",
];

const INVOICE_HEADERS: &[&str] = &[
    "invoice_number",
    "issue_date",
    "due_date",
    "client",
    "salesperson",
    "currency",
    "subtotal",
    "tva",
    "total",
    "status",
];

pub fn quotations_csv(quotations: &[Quotation]) -> String {
    let rows = quotations.iter().map(|q| {
        vec![
            q.reference.clone(),
            q.created_at.date_naive().to_string(),
            q.client_name.clone(),
            serde_label(&q.freight_mode),
            serde_label(&q.request_type),
            q.origin.clone(),
            q.destination.clone(),
            q.currency.clone(),
            format_money(q.buy_rate),
            format_money(q.client_quote),
            format_money(q.profit),
            format_money(q.profit_percentage),
            q.status.as_str().to_string(),
            q.quote_sent_by_name.clone(),
            q.approved_by_name.clone().unwrap_or_default(),
            q.rejection_reason.clone().unwrap_or_default(),
        ]
    });

    build_delimited(QUOTATION_HEADERS, rows)
}

/// Status column holds the effective status
pub fn invoices_csv(invoices: &[Invoice]) -> String {
    let rows = invoices.iter().map(|i| {
        vec![
            i.invoice_number.clone(),
            i.issue_date.to_string(),
            i.due_date.to_string(),
            i.client_name.clone(),
            i.salesperson_name.clone(),
            i.currency.clone(),
            format_money(i.subtotal),
            format_money(i.tva),
            format_money(i.total),
            i.effective_status.as_str().to_string(),
        ]
    });

    build_delimited(INVOICE_HEADERS, rows)
}

fn build_delimited(headers: &[&str], rows: impl Iterator<Item = Vec<String>>) -> String {
    let mut lines = vec![headers.join(",")];
    for row in rows {
        let fields: Vec<String> = row.iter().map(|field| escape_field(field)).collect();
        lines.push(fields.join(","));
    }

    let mut payload = lines.join("\r\n");
    payload.push_str("\r\n");
    payload
}

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn serde_label<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(label)) => label,
        _ => String::new(),
    }
}

struct PrintableRow<'a> {
    commodity: &'a str,
    quantity: String,
    charges: Vec<String>,
    amount: String,
}

#[derive(Template)]
#[template(path = "printable_invoice.html")]
struct PrintableInvoice<'a> {
    number: &'a str,
    status: &'static str,
    issue_date: String,
    due_date: String,
    client: &'a str,
    details: Vec<(&'static str, String)>,
    salesperson: &'a str,
    currency: &'a str,
    rows: Vec<PrintableRow<'a>>,
    subtotal: String,
    vat_percent: String,
    tva: String,
    total: String,
    remarks: Option<&'a str>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Self-contained HTML page meant for the browser's print-to-PDF
pub fn printable_invoice(invoice: &Invoice, vat_rate: Decimal) -> Result<String> {
    let rows = invoice
        .items
        .iter()
        .map(|item| {
            Ok(PrintableRow {
                commodity: &item.commodity,
                quantity: item.quantity.normalize().to_string(),
                charges: item
                    .charges
                    .iter()
                    .map(|c| format!("{} ({})", c.description, format_money(c.rate)))
                    .collect(),
                amount: format_money(item.amount()?),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut details = Vec::new();
    if let Some(validity) = invoice.validity_date {
        details.push(("Valid until", validity.to_string()));
    }
    for (label, value) in [
        ("Address", &invoice.client_address),
        ("Contact", &invoice.client_contact),
        ("TIN", &invoice.client_tin),
    ] {
        if let Some(value) = non_blank(value) {
            details.push((label, value.to_string()));
        }
    }

    let page = PrintableInvoice {
        number: &invoice.invoice_number,
        status: invoice.effective_status.as_str(),
        issue_date: invoice.issue_date.to_string(),
        due_date: invoice.due_date.to_string(),
        client: &invoice.client_name,
        details,
        salesperson: &invoice.salesperson_name,
        currency: &invoice.currency,
        rows,
        subtotal: format_money(invoice.subtotal),
        vat_percent: (vat_rate * Decimal::ONE_HUNDRED).normalize().to_string(),
        tva: format_money(invoice.tva),
        total: format_money(invoice.total),
        remarks: non_blank(&invoice.remarks),
    };

    Ok(page.render()?)
}
