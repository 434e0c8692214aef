use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    db::DbPool,
    error::{AppError, Result, conflict_on_constraint},
    models::{
        document::{Document, DocumentFilter, DocumentScope, InvoiceAccess},
        user::User,
    },
};

const METADATA_COLUMNS: &str = "id, file_name, content_type, size_bytes, quotation_id, invoice_id, \
                                uploaded_by, uploaded_by_name, uploaded_at";

/// Uploaded files, stored whole
#[derive(Clone)]
pub struct DocumentStore {
    pool: DbPool,
}

impl DocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        file_name: &str,
        content_type: &str,
        quotation_id: Option<i64>,
        invoice_id: Option<i64>,
        content: &[u8],
        uploader: &User,
    ) -> Result<Document> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (
                file_name, content_type, size_bytes, quotation_id, invoice_id,
                uploaded_by, uploaded_by_name, uploaded_at, content
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(file_name)
        .bind(content_type)
        .bind(content.len() as i64)
        .bind(quotation_id)
        .bind(invoice_id)
        .bind(uploader.id)
        .bind(&uploader.name)
        .bind(Utc::now())
        .bind(content)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_constraint(e, "referenced quotation or invoice does not exist"))?;

        self.get(result.last_insert_rowid()).await
    }

    pub async fn get(&self, id: i64) -> Result<Document> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            METADATA_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Document", id))
    }

    pub async fn content(&self, id: i64) -> Result<(Document, Vec<u8>)> {
        let document = self.get(id).await?;
        let (content,): (Vec<u8>,) = sqlx::query_as("SELECT content FROM documents WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok((document, content))
    }

    pub async fn list(&self, filter: &DocumentFilter, scope: DocumentScope) -> Result<Vec<Document>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM documents WHERE 1 = 1",
            METADATA_COLUMNS
        ));
        if let Some(quotation_id) = filter.quotation_id {
            query.push(" AND quotation_id = ").push_bind(quotation_id);
        }
        if let Some(invoice_id) = filter.invoice_id {
            query.push(" AND invoice_id = ").push_bind(invoice_id);
        }
        if let Some(owner) = scope.quotation_owner {
            query
                .push(" AND (quotation_id IS NULL OR quotation_id IN (SELECT id FROM quotations WHERE quote_sent_by = ")
                .push_bind(owner)
                .push("))");
        }
        match scope.invoices {
            InvoiceAccess::All => {}
            InvoiceAccess::Salesperson(user_id) => {
                query
                    .push(" AND (invoice_id IS NULL OR invoice_id IN (SELECT id FROM invoices WHERE salesperson_id = ")
                    .push_bind(user_id)
                    .push("))");
            }
            InvoiceAccess::Nothing => {
                query.push(" AND invoice_id IS NULL");
            }
        }
        query.push(" ORDER BY uploaded_at DESC, id DESC");

        let documents = query.build_query_as::<Document>().fetch_all(&self.pool).await?;
        Ok(documents)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Document", id));
        }
        Ok(())
    }
}
