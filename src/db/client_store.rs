use chrono::Utc;

use crate::{
    db::DbPool,
    error::{AppError, Result},
    models::client::{Client, ClientInput},
};

/// Client directory
#[derive(Clone)]
pub struct ClientStore {
    pool: DbPool,
}

impl ClientStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Client>> {
        let clients = sqlx::query_as::<_, Client>("SELECT * FROM clients ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(clients)
    }

    pub async fn get(&self, id: i64) -> Result<Client> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Client", id))
    }

    pub async fn create(&self, input: &ClientInput) -> Result<Client> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO clients (name, address, contact_person, email, phone, tin, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.name.trim())
        .bind(&input.address)
        .bind(&input.contact_person)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.tin)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(result.last_insert_rowid()).await
    }

    pub async fn update(&self, id: i64, input: &ClientInput) -> Result<Client> {
        let result = sqlx::query(
            r#"
            UPDATE clients
            SET name = ?, address = ?, contact_person = ?, email = ?, phone = ?, tin = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(input.name.trim())
        .bind(&input.address)
        .bind(&input.contact_person)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.tin)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Client", id));
        }
        self.get(id).await
    }

    /// Quotations and invoices keep their client snapshot fields.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Client", id));
        }
        Ok(())
    }
}
