use std::collections::HashMap;

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::{
    db::{DbPool, fetch_by_ids},
    error::{AppError, Result, conflict_on_constraint},
    models::invoice::{
        Invoice, InvoiceCharge, InvoiceFilter, InvoiceItem, InvoiceItemInput, InvoiceStatus,
        NewInvoice,
    },
    pricing::invoice_totals,
};

/// Invoices with their items and charges
#[derive(Clone)]
pub struct InvoiceStore {
    pool: DbPool,
}

impl InvoiceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Write the invoice, its items and charges atomically.
    ///
    /// A quotation can back at most one invoice; the unique index on
    /// `quotation_id` rejects a second one even under concurrent requests.
    pub async fn create(&self, new: &NewInvoice, vat_rate: Decimal) -> Result<Invoice> {
        let totals = invoice_totals(&new.items, vat_rate)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        if let Some(quotation_id) = new.quotation_id {
            let existing: Option<(String,)> =
                sqlx::query_as("SELECT invoice_number FROM invoices WHERE quotation_id = ?")
                    .bind(quotation_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some((number,)) = existing {
                return Err(AppError::Conflict(format!(
                    "quotation already invoiced as {}",
                    number
                )));
            }
        }

        let result = sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_number, quotation_id, client_id, client_name, client_address, client_contact,
                client_tin, salesperson_id, salesperson_name, currency, subtotal, tva, total, status,
                issue_date, due_date, validity_date, remarks, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(new.quotation_id)
        .bind(new.client_id)
        .bind(&new.client_name)
        .bind(&new.client_address)
        .bind(&new.client_contact)
        .bind(&new.client_tin)
        .bind(new.salesperson_id)
        .bind(&new.salesperson_name)
        .bind(&new.currency)
        .bind(totals.subtotal.to_string())
        .bind(totals.tva.to_string())
        .bind(totals.total.to_string())
        .bind(InvoiceStatus::Pending)
        .bind(new.issue_date)
        .bind(new.due_date)
        .bind(new.validity_date)
        .bind(&new.remarks)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_constraint(e, "quotation already has an invoice"))?;

        let id = result.last_insert_rowid();
        sqlx::query("UPDATE invoices SET invoice_number = ? WHERE id = ?")
            .bind(format!("INV-{}-{:05}", now.year(), id))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        insert_items(&mut tx, id, &new.items).await?;
        tx.commit().await?;

        tracing::info!("Invoice {} created for {}", id, new.client_name);
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<Invoice> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Invoice", id))?;

        let mut invoices = vec![invoice];
        self.attach_items(&mut invoices).await?;
        Ok(invoices.remove(0))
    }

    pub async fn find_by_quotation(&self, quotation_id: i64) -> Result<Option<Invoice>> {
        let id: Option<(i64,)> = sqlx::query_as("SELECT id FROM invoices WHERE quotation_id = ?")
            .bind(quotation_id)
            .fetch_optional(&self.pool)
            .await?;

        match id {
            Some((id,)) => Ok(Some(self.get(id).await?)),
            None => Ok(None),
        }
    }

    /// List invoices, newest first. The status filter matches the effective status.
    pub async fn list(&self, filter: &InvoiceFilter, salesperson: Option<i64>) -> Result<Vec<Invoice>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM invoices WHERE 1 = 1");

        if let Some(from) = filter.from {
            query.push(" AND issue_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND issue_date <= ").push_bind(to);
        }
        if let Some(client_id) = filter.client_id {
            query.push(" AND client_id = ").push_bind(client_id);
        }
        if let Some(salesperson) = salesperson {
            query.push(" AND salesperson_id = ").push_bind(salesperson);
        }
        query.push(" ORDER BY issue_date DESC, id DESC");

        let mut invoices: Vec<Invoice> = query
            .build_query_as::<Invoice>()
            .fetch_all(&self.pool)
            .await?;
        if let Some(status) = filter.status {
            invoices.retain(|invoice| invoice.effective_status == status);
        }
        self.attach_items(&mut invoices).await?;

        Ok(invoices)
    }

    /// Invoices that still await payment
    pub async fn list_unpaid(&self) -> Result<Vec<Invoice>> {
        let invoices = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE status != ? ORDER BY due_date",
        )
        .bind(InvoiceStatus::Paid)
        .fetch_all(&self.pool)
        .await?;

        Ok(invoices)
    }

    pub async fn update_status(&self, id: i64, next: InvoiceStatus) -> Result<Invoice> {
        let current = self.get(id).await?;
        current.status.transition_to(next)?;

        let now = Utc::now();
        let paid_at = (next == InvoiceStatus::Paid).then_some(now);

        let result = sqlx::query(
            "UPDATE invoices SET status = ?, paid_at = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(next)
        .bind(paid_at)
        .bind(now)
        .bind(id)
        .bind(current.status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "invoice {} changed concurrently",
                current.invoice_number
            )));
        }

        tracing::info!(
            "Invoice {} moved from {} to {}",
            current.invoice_number,
            current.status.as_str(),
            next.as_str()
        );
        self.get(id).await
    }

    /// Items and charges go with the invoice through cascading deletes
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Invoice", id));
        }
        Ok(())
    }

    async fn attach_items(&self, invoices: &mut [Invoice]) -> Result<()> {
        if invoices.is_empty() {
            return Ok(());
        }

        let invoice_ids: Vec<i64> = invoices.iter().map(|invoice| invoice.id).collect();
        let mut items: Vec<InvoiceItem> = fetch_by_ids(
            &self.pool,
            "SELECT * FROM invoice_items WHERE invoice_id IN (",
            &invoice_ids,
            "invoice_id, position",
        )
        .await?;

        if !items.is_empty() {
            let item_ids: Vec<i64> = items.iter().map(|item| item.id).collect();
            let charges: Vec<InvoiceCharge> = fetch_by_ids(
                &self.pool,
                "SELECT * FROM invoice_charges WHERE item_id IN (",
                &item_ids,
                "item_id, id",
            )
            .await?;

            let mut by_item: HashMap<i64, Vec<InvoiceCharge>> = HashMap::new();
            for charge in charges {
                by_item.entry(charge.item_id).or_default().push(charge);
            }
            for item in items.iter_mut() {
                item.charges = by_item.remove(&item.id).unwrap_or_default();
            }
        }

        let mut by_invoice: HashMap<i64, Vec<InvoiceItem>> = HashMap::new();
        for item in items {
            by_invoice.entry(item.invoice_id).or_default().push(item);
        }
        for invoice in invoices.iter_mut() {
            invoice.items = by_invoice.remove(&invoice.id).unwrap_or_default();
        }

        Ok(())
    }
}

async fn insert_items(
    conn: &mut SqliteConnection,
    invoice_id: i64,
    items: &[InvoiceItemInput],
) -> Result<()> {
    for (position, item) in items.iter().enumerate() {
        let result = sqlx::query(
            "INSERT INTO invoice_items (invoice_id, commodity, quantity, position) VALUES (?, ?, ?, ?)",
        )
        .bind(invoice_id)
        .bind(item.commodity.trim())
        .bind(item.quantity.to_string())
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;

        let item_id = result.last_insert_rowid();
        for charge in &item.charges {
            sqlx::query("INSERT INTO invoice_charges (item_id, description, rate) VALUES (?, ?, ?)")
                .bind(item_id)
                .bind(charge.description.trim())
                .bind(charge.rate.to_string())
                .execute(&mut *conn)
                .await?;
        }
    }

    Ok(())
}
