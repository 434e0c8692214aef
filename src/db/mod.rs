use std::{str::FromStr, time::Duration};

use anyhow::Result;
use rust_decimal::Decimal;
use sqlx::{
    FromRow, Pool, QueryBuilder, Row, Sqlite,
    migrate::MigrateDatabase,
    sqlite::{SqlitePoolOptions, SqliteRow},
};

use crate::models::user::{CreateUser, Role};

pub mod client_store;
pub mod document_store;
pub mod invoice_store;
pub mod notification_store;
pub mod quotation_store;
pub mod user_store;

pub use client_store::ClientStore;
pub use document_store::DocumentStore;
pub use invoice_store::InvoiceStore;
pub use notification_store::NotificationStore;
pub use quotation_store::QuotationStore;
pub use user_store::UserStore;

pub type DbPool = Pool<Sqlite>;

/// Ids bound per `IN (...)` list, well under SQLite's variable limit
const IN_LIST_CHUNK: usize = 500;

/// Initialize the database connection pool
pub async fn init_db_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    // Create the database if it doesn't exist
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        Sqlite::create_database(database_url).await?;
    }

    // Create connection pool
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;

    setup_database(&pool).await?;

    Ok(pool)
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clients (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        address TEXT,
        contact_person TEXT,
        email TEXT,
        phone TEXT,
        tin TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS quotations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        reference TEXT NOT NULL UNIQUE,
        client_id INTEGER REFERENCES clients(id) ON DELETE SET NULL,
        client_name TEXT NOT NULL,
        freight_mode TEXT NOT NULL,
        request_type TEXT NOT NULL,
        origin TEXT NOT NULL,
        destination TEXT NOT NULL,
        currency TEXT NOT NULL,
        buy_rate TEXT NOT NULL,
        client_quote TEXT NOT NULL,
        profit TEXT NOT NULL,
        profit_percentage TEXT NOT NULL,
        status TEXT NOT NULL,
        quote_sent_by INTEGER NOT NULL REFERENCES profiles(id),
        quote_sent_by_name TEXT NOT NULL,
        approved_by INTEGER REFERENCES profiles(id) ON DELETE SET NULL,
        approved_by_name TEXT,
        approved_at TEXT,
        rejection_reason TEXT,
        follow_up_date TEXT,
        remarks TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    "#,
    "CREATE INDEX IF NOT EXISTS idx_quotations_status ON quotations(status);",
    "CREATE INDEX IF NOT EXISTS idx_quotations_sent_by ON quotations(quote_sent_by);",
    r#"
    CREATE TABLE IF NOT EXISTS quotation_commodities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        quotation_id INTEGER NOT NULL REFERENCES quotations(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        quantity_kg TEXT NOT NULL,
        buy_rate TEXT NOT NULL,
        client_rate TEXT NOT NULL,
        position INTEGER NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS invoices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_number TEXT NOT NULL UNIQUE,
        quotation_id INTEGER UNIQUE REFERENCES quotations(id) ON DELETE RESTRICT,
        client_id INTEGER REFERENCES clients(id) ON DELETE SET NULL,
        client_name TEXT NOT NULL,
        client_address TEXT,
        client_contact TEXT,
        client_tin TEXT,
        salesperson_id INTEGER NOT NULL REFERENCES profiles(id),
        salesperson_name TEXT NOT NULL,
        currency TEXT NOT NULL,
        subtotal TEXT NOT NULL,
        tva TEXT NOT NULL,
        total TEXT NOT NULL,
        status TEXT NOT NULL,
        issue_date TEXT NOT NULL,
        due_date TEXT NOT NULL,
        validity_date TEXT,
        remarks TEXT,
        paid_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    "#,
    "CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status);",
    r#"
    CREATE TABLE IF NOT EXISTS invoice_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id INTEGER NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
        commodity TEXT NOT NULL,
        quantity TEXT NOT NULL,
        position INTEGER NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS invoice_charges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES invoice_items(id) ON DELETE CASCADE,
        description TEXT NOT NULL,
        rate TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_name TEXT NOT NULL,
        content_type TEXT NOT NULL,
        size_bytes INTEGER NOT NULL,
        quotation_id INTEGER REFERENCES quotations(id) ON DELETE CASCADE,
        invoice_id INTEGER REFERENCES invoices(id) ON DELETE CASCADE,
        uploaded_by INTEGER NOT NULL,
        uploaded_by_name TEXT NOT NULL,
        uploaded_at TEXT NOT NULL,
        content BLOB NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dedup_key TEXT NOT NULL UNIQUE,
        kind TEXT NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        recipient_user_id INTEGER REFERENCES profiles(id) ON DELETE CASCADE,
        recipient_role TEXT,
        entity_type TEXT,
        entity_id INTEGER,
        created_at TEXT NOT NULL,
        read_at TEXT
    );
    "#,
];

/// Set up the database schema
async fn setup_database(pool: &DbPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

/// Create the first admin account when the profiles table is empty.
///
/// Returns the generated password when none was configured.
pub async fn bootstrap_admin(
    users: &UserStore,
    email: &str,
    password: Option<&str>,
) -> Result<Option<String>> {
    if users.count().await? > 0 {
        return Ok(None);
    }

    let created = users
        .create_user(CreateUser {
            name: "Administrator".to_string(),
            email: email.to_string(),
            role: Role::Admin,
            password: password.map(str::to_string),
        })
        .await?;

    tracing::info!("Created bootstrap admin {}", created.user.email);
    Ok(created.generated_password)
}

/// Money columns are stored as TEXT to keep exact decimal values.
pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Child rows for a set of parent ids, fetched in batches of `IN_LIST_CHUNK`.
/// `select` ends just before the id list, e.g. `SELECT * FROM t WHERE parent_id IN (`.
pub(crate) async fn fetch_by_ids<T>(
    pool: &DbPool,
    select: &str,
    ids: &[i64],
    order_by: &str,
) -> Result<Vec<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut rows = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(IN_LIST_CHUNK) {
        let mut query = QueryBuilder::<Sqlite>::new(select);
        let mut bound = query.separated(", ");
        for id in chunk {
            bound.push_bind(*id);
        }
        bound.push_unseparated(") ORDER BY ");
        bound.push_unseparated(order_by);

        rows.extend(query.build_query_as::<T>().fetch_all(pool).await?);
    }
    Ok(rows)
}
