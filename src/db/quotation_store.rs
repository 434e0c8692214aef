use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::{
    db::{DbPool, fetch_by_ids},
    error::{AppError, Result, conflict_on_constraint},
    models::{
        quotation::{
            Commodity, CommodityInput, Quotation, QuotationFilter, QuotationInput, QuotationStatus,
        },
        user::User,
    },
    pricing::quotation_totals,
};

/// Client and currency after defaults and the client directory were applied
#[derive(Debug, Clone)]
pub struct ResolvedParty {
    pub client_id: Option<i64>,
    pub client_name: String,
    pub currency: String,
}

/// Quotations and their commodity lines
#[derive(Clone)]
pub struct QuotationStore {
    pool: DbPool,
}

impl QuotationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a pending quotation with its commodities in one transaction
    pub async fn create(
        &self,
        input: &QuotationInput,
        party: &ResolvedParty,
        author: &User,
    ) -> Result<Quotation> {
        let totals = quotation_totals(&input.commodities)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO quotations (
                reference, client_id, client_name, freight_mode, request_type, origin, destination,
                currency, buy_rate, client_quote, profit, profit_percentage, status,
                quote_sent_by, quote_sent_by_name, follow_up_date, remarks, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(party.client_id)
        .bind(&party.client_name)
        .bind(input.freight_mode)
        .bind(input.request_type)
        .bind(input.origin.trim())
        .bind(input.destination.trim())
        .bind(&party.currency)
        .bind(totals.buy_rate.to_string())
        .bind(totals.client_quote.to_string())
        .bind(totals.profit.to_string())
        .bind(totals.profit_percentage.to_string())
        .bind(QuotationStatus::Pending)
        .bind(author.id)
        .bind(&author.name)
        .bind(input.follow_up_date)
        .bind(&input.remarks)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();
        sqlx::query("UPDATE quotations SET reference = ? WHERE id = ?")
            .bind(format!("QT-{}-{:05}", now.year(), id))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        insert_commodities(&mut tx, id, &input.commodities).await?;
        tx.commit().await?;

        tracing::info!("Quotation {} created by {}", id, author.email);
        self.get(id).await
    }

    /// Replace the editable fields of a pending quotation and recompute its totals
    pub async fn update(
        &self,
        id: i64,
        input: &QuotationInput,
        party: &ResolvedParty,
    ) -> Result<Quotation> {
        let totals = quotation_totals(&input.commodities)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE quotations
            SET client_id = ?, client_name = ?, freight_mode = ?, request_type = ?, origin = ?,
                destination = ?, currency = ?, buy_rate = ?, client_quote = ?, profit = ?,
                profit_percentage = ?, follow_up_date = ?, remarks = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(party.client_id)
        .bind(&party.client_name)
        .bind(input.freight_mode)
        .bind(input.request_type)
        .bind(input.origin.trim())
        .bind(input.destination.trim())
        .bind(&party.currency)
        .bind(totals.buy_rate.to_string())
        .bind(totals.client_quote.to_string())
        .bind(totals.profit.to_string())
        .bind(totals.profit_percentage.to_string())
        .bind(input.follow_up_date)
        .bind(&input.remarks)
        .bind(Utc::now())
        .bind(id)
        .bind(QuotationStatus::Pending)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Either missing or already decided
            drop(tx);
            let existing = self.get(id).await?;
            return Err(AppError::Conflict(format!(
                "quotation {} is {} and can no longer be edited",
                existing.reference,
                existing.status.as_str()
            )));
        }

        sqlx::query("DELETE FROM quotation_commodities WHERE quotation_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_commodities(&mut tx, id, &input.commodities).await?;
        tx.commit().await?;

        self.get(id).await
    }

    /// Move a pending quotation to won or lost, recording who decided
    pub async fn decide(
        &self,
        id: i64,
        next: QuotationStatus,
        decided_by: &User,
        reason: Option<&str>,
    ) -> Result<Quotation> {
        let current = self.get(id).await?;
        current.status.transition_to(next)?;

        // The status guard makes concurrent decisions lose cleanly
        let result = sqlx::query(
            r#"
            UPDATE quotations
            SET status = ?, approved_by = ?, approved_by_name = ?, approved_at = ?,
                rejection_reason = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(next)
        .bind(decided_by.id)
        .bind(&decided_by.name)
        .bind(Utc::now())
        .bind(reason)
        .bind(Utc::now())
        .bind(id)
        .bind(QuotationStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "quotation {} was decided concurrently",
                current.reference
            )));
        }

        tracing::info!(
            "Quotation {} marked {} by {}",
            current.reference,
            next.as_str(),
            decided_by.email
        );
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<Quotation> {
        let mut quotation = sqlx::query_as::<_, Quotation>("SELECT * FROM quotations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Quotation", id))?;

        quotation.commodities = sqlx::query_as::<_, Commodity>(
            "SELECT * FROM quotation_commodities WHERE quotation_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(quotation)
    }

    /// List quotations, newest first; `owner` restricts to one salesperson
    pub async fn list(&self, filter: &QuotationFilter, owner: Option<i64>) -> Result<Vec<Quotation>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM quotations WHERE 1 = 1");

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        if let Some(from) = filter.from {
            query.push(" AND substr(created_at, 1, 10) >= ").push_bind(from.to_string());
        }
        if let Some(to) = filter.to {
            query.push(" AND substr(created_at, 1, 10) <= ").push_bind(to.to_string());
        }
        if let Some(salesperson) = filter.salesperson {
            query.push(" AND quote_sent_by = ").push_bind(salesperson);
        }
        if let Some(client_id) = filter.client_id {
            query.push(" AND client_id = ").push_bind(client_id);
        }
        if let Some(owner) = owner {
            query.push(" AND quote_sent_by = ").push_bind(owner);
        }
        query.push(" ORDER BY created_at DESC, id DESC");

        let mut quotations = query
            .build_query_as::<Quotation>()
            .fetch_all(&self.pool)
            .await?;
        self.attach_commodities(&mut quotations).await?;

        Ok(quotations)
    }

    /// Quotations decided on or after `from` and before `until`
    pub async fn list_decided_between(&self, from: NaiveDate, until: NaiveDate) -> Result<Vec<Quotation>> {
        let quotations = sqlx::query_as::<_, Quotation>(
            r#"
            SELECT * FROM quotations
            WHERE status != ? AND approved_at IS NOT NULL
              AND substr(approved_at, 1, 10) >= ? AND substr(approved_at, 1, 10) < ?
            ORDER BY approved_at
            "#,
        )
        .bind(QuotationStatus::Pending)
        .bind(from.to_string())
        .bind(until.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(quotations)
    }

    /// Delete a quotation; refused while an invoice references it
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM quotations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_constraint(e, "quotation has an invoice and cannot be deleted"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Quotation", id));
        }
        Ok(())
    }

    async fn attach_commodities(&self, quotations: &mut [Quotation]) -> Result<()> {
        if quotations.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = quotations.iter().map(|quotation| quotation.id).collect();
        let commodities: Vec<Commodity> = fetch_by_ids(
            &self.pool,
            "SELECT * FROM quotation_commodities WHERE quotation_id IN (",
            &ids,
            "quotation_id, position",
        )
        .await?;

        let mut by_quotation: HashMap<i64, Vec<Commodity>> = HashMap::new();
        for commodity in commodities {
            by_quotation
                .entry(commodity.quotation_id)
                .or_default()
                .push(commodity);
        }
        for quotation in quotations.iter_mut() {
            quotation.commodities = by_quotation.remove(&quotation.id).unwrap_or_default();
        }

        Ok(())
    }
}

async fn insert_commodities(
    conn: &mut SqliteConnection,
    quotation_id: i64,
    commodities: &[CommodityInput],
) -> Result<()> {
    for (position, commodity) in commodities.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO quotation_commodities (quotation_id, name, quantity_kg, buy_rate, client_rate, position)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(quotation_id)
        .bind(commodity.name.trim())
        .bind(commodity.quantity_kg.to_string())
        .bind(commodity.buy_rate.to_string())
        .bind(commodity.client_rate.to_string())
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
